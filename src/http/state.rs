//! Application state for the HTTP server.

use std::sync::Arc;

use crate::auth::TokenTable;
use crate::engine::Engine;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    /// Bearer tokens; empty disables authorization
    pub tokens: Arc<TokenTable>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, tokens: TokenTable) -> Self {
        Self {
            engine,
            tokens: Arc::new(tokens),
        }
    }
}
