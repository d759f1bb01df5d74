use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

pub type TheatreId = u32;
pub type SurgeryId = u64;
pub type SurgeonId = u64;
pub type PatientId = u64;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

/// Half-open `[start, end)` time-of-day range on a single calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
}

/// Why a window could not be built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    BadDate(String),
    BadTime(String),
    Inverted { start: NaiveTime, end: NaiveTime },
}

impl fmt::Display for WindowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowError::BadDate(s) => write!(f, "invalid date {s:?} (expected YYYY-MM-DD)"),
            WindowError::BadTime(s) => write!(f, "invalid time {s:?} (expected HH:MM)"),
            WindowError::Inverted { start, end } => write!(
                f,
                "start {} must be before end {}",
                start.format("%H:%M"),
                end.format("%H:%M")
            ),
        }
    }
}

impl std::error::Error for WindowError {}

/// Digits everywhere except `sep` at the byte offsets in `at`.
fn fixed_layout(s: &str, sep: u8, at: &[usize]) -> bool {
    s.bytes()
        .enumerate()
        .all(|(i, c)| if at.contains(&i) { c == sep } else { c.is_ascii_digit() })
}

/// Strict `YYYY-MM-DD`.
pub fn parse_date(s: &str) -> Result<NaiveDate, WindowError> {
    let d = s.trim();
    if d.len() != 10 || !fixed_layout(d, b'-', &[4, 7]) {
        return Err(WindowError::BadDate(s.to_string()));
    }
    NaiveDate::parse_from_str(d, DATE_FORMAT).map_err(|_| WindowError::BadDate(s.to_string()))
}

/// Strict 24-hour `HH:MM`. `HH:MM:00`, as SQL `TIME` columns print it, is
/// accepted too; any other seconds value is rejected so that times stay
/// whole minutes.
pub fn parse_time(s: &str) -> Result<NaiveTime, WindowError> {
    let bad = || WindowError::BadTime(s.to_string());
    let t = s.trim();
    let hhmm = match t.len() {
        5 if fixed_layout(t, b':', &[2]) => t,
        8 if fixed_layout(t, b':', &[2, 5]) && t.ends_with(":00") => &t[..5],
        _ => return Err(bad()),
    };
    NaiveTime::parse_from_str(hhmm, TIME_FORMAT).map_err(|_| bad())
}

impl TimeWindow {
    pub fn new(date: NaiveDate, start: NaiveTime, end: NaiveTime) -> Result<Self, WindowError> {
        if start >= end {
            return Err(WindowError::Inverted { start, end });
        }
        Ok(Self { date, start, end })
    }

    /// Build a window from the wire representation: `YYYY-MM-DD`, `HH:MM`, `HH:MM`.
    pub fn parse(date: &str, start: &str, end: &str) -> Result<Self, WindowError> {
        Self::new(parse_date(date)?, parse_time(start)?, parse_time(end)?)
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    /// Same date and `self.start < other.end && other.start < self.end`.
    /// Touching windows do not overlap.
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.date == other.date && self.start < other.end && other.start < self.end
    }

    /// Sort key for ledgers: date, then start.
    pub fn sort_key(&self) -> (NaiveDate, NaiveTime) {
        (self.date, self.start)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}-{}",
            self.date.format(DATE_FORMAT),
            self.start.format("%H:%M"),
            self.end.format("%H:%M")
        )
    }
}

/// Lifecycle of a booked surgery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl BookingStatus {
    /// Only scheduled and running surgeries occupy their theatre.
    pub fn is_active(self) -> bool {
        matches!(self, BookingStatus::Scheduled | BookingStatus::InProgress)
    }

    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        match (self, next) {
            (a, b) if a == b => true,
            (Scheduled, InProgress | Completed | Cancelled) => true,
            (InProgress, Completed | Cancelled) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Scheduled => "SCHEDULED",
            BookingStatus::InProgress => "IN_PROGRESS",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A theatre occupied by one surgery for one window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub surgery_id: SurgeryId,
    pub theatre_id: TheatreId,
    pub window: TimeWindow,
    pub status: BookingStatus,
    pub surgery_type: Option<String>,
    pub surgeon_id: Option<SurgeonId>,
    pub patient_id: Option<PatientId>,
}

impl Booking {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theatre {
    pub theatre_id: TheatreId,
    pub name: String,
    pub capacity: u32,
}

/// Input for a new booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub surgery_id: SurgeryId,
    pub theatre_id: TheatreId,
    pub window: TimeWindow,
    pub status: BookingStatus,
    pub surgery_type: Option<String>,
    pub surgeon_id: Option<SurgeonId>,
    pub patient_id: Option<PatientId>,
}

#[derive(Debug, Clone)]
pub struct TheatreState {
    pub id: TheatreId,
    pub name: String,
    pub capacity: u32,
    /// Every booking of this theatre regardless of status, sorted by `window.sort_key()`.
    pub bookings: Vec<Booking>,
    /// Set when the theatre's creation was rolled back. Anyone still holding
    /// this state's `Arc` must treat the theatre as missing.
    pub retired: bool,
}

impl TheatreState {
    pub fn new(id: TheatreId, name: String, capacity: u32) -> Self {
        Self {
            id,
            name,
            capacity,
            bookings: Vec::new(),
            retired: false,
        }
    }

    pub fn info(&self) -> Theatre {
        Theatre {
            theatre_id: self.id,
            name: self.name.clone(),
            capacity: self.capacity,
        }
    }

    /// Insert booking maintaining sort order by (date, start).
    pub fn insert_booking(&mut self, booking: Booking) {
        let key = booking.window.sort_key();
        let pos = self.bookings.partition_point(|b| b.window.sort_key() <= key);
        self.bookings.insert(pos, booking);
    }

    pub fn remove_booking(&mut self, surgery_id: SurgeryId) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.surgery_id == surgery_id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn booking(&self, surgery_id: SurgeryId) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.surgery_id == surgery_id)
    }

    pub fn booking_mut(&mut self, surgery_id: SurgeryId) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.surgery_id == surgery_id)
    }

    pub fn active_bookings(&self) -> impl Iterator<Item = &Booking> {
        self.bookings.iter().filter(|b| b.is_active())
    }

    /// Bookings on the candidate's date that start before it ends.
    /// Binary search skips earlier dates and everything starting at or after `candidate.end`.
    pub fn candidates(&self, candidate: &TimeWindow) -> impl Iterator<Item = &Booking> {
        let date = candidate.date();
        let left = self.bookings.partition_point(|b| b.window.date() < date);
        let right = self
            .bookings
            .partition_point(|b| b.window.sort_key() < (date, candidate.end()));
        self.bookings[left..right.max(left)]
            .iter()
            .filter(move |b| b.window.end() > candidate.start())
    }
}

/// WAL record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    TheatreCreated {
        id: TheatreId,
        name: String,
        capacity: u32,
    },
    TheatreUpdated {
        id: TheatreId,
        name: String,
        capacity: u32,
    },
    SurgeryScheduled {
        id: SurgeryId,
        theatre_id: TheatreId,
        window: TimeWindow,
        status: BookingStatus,
        surgery_type: Option<String>,
        surgeon_id: Option<SurgeonId>,
        patient_id: Option<PatientId>,
    },
    SurgeryRescheduled {
        id: SurgeryId,
        from_theatre: TheatreId,
        theatre_id: TheatreId,
        window: TimeWindow,
    },
    SurgeryStatusChanged {
        id: SurgeryId,
        theatre_id: TheatreId,
        status: BookingStatus,
    },
    SurgeryRemoved {
        id: SurgeryId,
        theatre_id: TheatreId,
    },
}
