use crate::ledger::StorageError;
use crate::model::{BookingStatus, SurgeryId, TheatreId, WindowError};

#[derive(Debug)]
pub enum EngineError {
    InvalidWindow(String),
    InvalidInput(String),
    TheatreNotFound(TheatreId),
    SurgeryNotFound(SurgeryId),
    TheatreExists(TheatreId),
    SurgeryExists(SurgeryId),
    Conflict { existing: SurgeryId },
    InvalidTransition { from: BookingStatus, to: BookingStatus },
    LimitExceeded(&'static str),
    StorageUnavailable(String),
}

impl EngineError {
    /// Storage failures are worth retrying; everything else is the caller's fault.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::StorageUnavailable(_))
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidWindow(msg) => write!(f, "invalid window: {msg}"),
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::TheatreNotFound(id) => write!(f, "theatre not found: {id}"),
            EngineError::SurgeryNotFound(id) => write!(f, "surgery not found: {id}"),
            EngineError::TheatreExists(id) => write!(f, "theatre already exists: {id}"),
            EngineError::SurgeryExists(id) => write!(f, "surgery already exists: {id}"),
            EngineError::Conflict { existing } => {
                write!(f, "theatre already booked by surgery {existing} for an overlapping window")
            }
            EngineError::InvalidTransition { from, to } => {
                write!(f, "cannot change status from {from} to {to}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::StorageUnavailable(msg) => write!(f, "storage unavailable: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<WindowError> for EngineError {
    fn from(e: WindowError) -> Self {
        EngineError::InvalidWindow(e.to_string())
    }
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        EngineError::StorageUnavailable(e.0)
    }
}
