use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::model::{Booking, Theatre, TheatreId};

/// The backing store failed to answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageError(pub String);

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "storage unavailable: {}", self.0)
    }
}

impl std::error::Error for StorageError {}

/// Read side of the booking store that availability answers are computed from.
///
/// Reads are snapshots: callers never hold a lock across them.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn theatre(&self, id: TheatreId) -> Result<Option<Theatre>, StorageError>;

    /// The full theatre catalog, in no particular order.
    async fn list_theatres(&self) -> Result<Vec<Theatre>, StorageError>;

    /// Active bookings of one theatre, ordered by date then start time.
    async fn active_bookings_for_theatre(
        &self,
        id: TheatreId,
    ) -> Result<Vec<Booking>, StorageError>;

    /// Active bookings of every theatre on `date`.
    async fn active_bookings_for_date(&self, date: NaiveDate) -> Result<Vec<Booking>, StorageError>;
}
