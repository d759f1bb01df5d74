use std::collections::HashSet;

use chrono::NaiveTime;

use crate::ledger::Ledger;
use crate::model::*;

use super::EngineError;

// ── Conflict scan ─────────────────────────────────────────────────

/// First active booking overlapping `candidate`, skipping `exclude`.
///
/// `bookings` must be ordered by (date, start); the scan stops at the first
/// booking starting at or after `candidate.end` on the candidate's date.
pub fn first_conflict<'a, I>(
    bookings: I,
    candidate: &TimeWindow,
    exclude: Option<SurgeryId>,
) -> Option<&'a Booking>
where
    I: IntoIterator<Item = &'a Booking>,
{
    let stop = (candidate.date(), candidate.end());
    for booking in bookings {
        if booking.window.sort_key() >= stop {
            break;
        }
        if !booking.is_active() || Some(booking.surgery_id) == exclude {
            continue;
        }
        if booking.window.overlaps(candidate) {
            return Some(booking);
        }
    }
    None
}

// ── Ledger queries ───────────────────────────────────────────────

/// Is `theatre_id` free for the whole of `candidate`?
///
/// An unknown theatre is `TheatreNotFound`, never "unavailable".
pub async fn is_available<L: Ledger + ?Sized>(
    ledger: &L,
    theatre_id: TheatreId,
    candidate: &TimeWindow,
) -> Result<bool, EngineError> {
    if ledger.theatre(theatre_id).await?.is_none() {
        return Err(EngineError::TheatreNotFound(theatre_id));
    }
    let bookings = ledger.active_bookings_for_theatre(theatre_id).await?;
    Ok(first_conflict(&bookings, candidate, None).is_none())
}

/// Every theatre with no active booking overlapping `candidate`, ascending by id.
pub async fn list_available_theatres<L: Ledger + ?Sized>(
    ledger: &L,
    candidate: &TimeWindow,
) -> Result<Vec<Theatre>, EngineError> {
    let theatres = ledger.list_theatres().await?;
    let day = ledger.active_bookings_for_date(candidate.date()).await?;

    let busy: HashSet<TheatreId> = day
        .iter()
        .filter(|b| b.is_active() && b.window.overlaps(candidate))
        .map(|b| b.theatre_id)
        .collect();

    let mut free: Vec<Theatre> = theatres
        .into_iter()
        .filter(|t| !busy.contains(&t.theatre_id))
        .collect();
    free.sort_by_key(|t| t.theatre_id);
    Ok(free)
}

// ── Free slots ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Range {
    start: NaiveTime,
    end: NaiveTime,
}

/// Merge sorted overlapping/adjacent ranges into disjoint ranges.
fn merge_overlapping(sorted: &[Range]) -> Vec<Range> {
    let mut merged: Vec<Range> = Vec::new();
    for &r in sorted {
        if let Some(last) = merged.last_mut()
            && r.start <= last.end
        {
            last.end = last.end.max(r.end);
            continue;
        }
        merged.push(r);
    }
    merged
}

/// Remove sorted, disjoint `to_remove` ranges from `base`.
fn subtract(base: Range, to_remove: &[Range]) -> Vec<Range> {
    let mut result = Vec::new();
    let mut current_start = base.start;

    for r in to_remove {
        if r.end <= current_start {
            continue;
        }
        if r.start >= base.end {
            break;
        }
        if r.start > current_start {
            result.push(Range { start: current_start, end: r.start });
        }
        current_start = current_start.max(r.end);
    }

    if current_start < base.end {
        result.push(Range { start: current_start, end: base.end });
    }
    result
}

/// Free sub-windows of `range` left over by the active bookings in `bookings`.
///
/// Windows shorter than `min_minutes` are dropped.
pub fn free_slots(bookings: &[Booking], range: &TimeWindow, min_minutes: Option<i64>) -> Vec<TimeWindow> {
    let mut busy: Vec<Range> = bookings
        .iter()
        .filter(|b| b.is_active() && b.window.overlaps(range))
        .map(|b| Range {
            start: b.window.start().max(range.start()),
            end: b.window.end().min(range.end()),
        })
        .collect();
    busy.sort_by_key(|r| r.start);
    let busy = merge_overlapping(&busy);

    let whole = Range { start: range.start(), end: range.end() };
    subtract(whole, &busy)
        .into_iter()
        .filter_map(|r| TimeWindow::new(range.date(), r.start, r.end).ok())
        .filter(|w| min_minutes.is_none_or(|m| w.duration_minutes() >= m))
        .collect()
}
