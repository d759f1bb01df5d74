//! REST surface of the scheduler.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  HTTP layer (axum handlers)                  │
//! │  - path / query / JSON parsing               │
//! │  - bearer-token role gating                  │
//! └──────────────────────┬───────────────────────┘
//!                        │
//! ┌──────────────────────▼───────────────────────┐
//! │  Engine                                      │
//! │  - per-theatre locking, conflict checks      │
//! │  - group-commit WAL                          │
//! └──────────────────────────────────────────────┘
//! ```

pub mod dto;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use router::create_router;
pub use state::AppState;
