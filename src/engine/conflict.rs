use crate::limits::*;
use crate::model::*;

use super::availability::first_conflict;
use super::EngineError;

/// Fail with `Conflict` if any active booking of `ts` overlaps `window`.
/// Caller holds the theatre write lock across this check and the insert.
pub(crate) fn check_no_conflict(
    ts: &TheatreState,
    window: &TimeWindow,
    exclude: Option<SurgeryId>,
) -> Result<(), EngineError> {
    if let Some(existing) = first_conflict(ts.candidates(window), window, exclude) {
        metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
        tracing::debug!(
            theatre_id = ts.id,
            existing = existing.surgery_id,
            %window,
            "booking conflict"
        );
        return Err(EngineError::Conflict {
            existing: existing.surgery_id,
        });
    }
    Ok(())
}

pub(crate) fn validate_theatre(name: &str, capacity: u32) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::InvalidInput("theatre name must not be empty".into()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("theatre name too long"));
    }
    if capacity == 0 {
        return Err(EngineError::InvalidInput("capacity must be at least 1".into()));
    }
    if capacity > MAX_CAPACITY {
        return Err(EngineError::LimitExceeded("capacity too large"));
    }
    Ok(())
}

pub(crate) fn validate_surgery_type(surgery_type: Option<&str>) -> Result<(), EngineError> {
    if let Some(t) = surgery_type
        && t.len() > MAX_LABEL_LEN
    {
        return Err(EngineError::LimitExceeded("surgery type too long"));
    }
    Ok(())
}

pub(crate) fn check_booking_room(ts: &TheatreState) -> Result<(), EngineError> {
    if ts.bookings.len() >= MAX_BOOKINGS_PER_THEATRE {
        return Err(EngineError::LimitExceeded("too many bookings on theatre"));
    }
    Ok(())
}
