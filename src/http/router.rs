//! Router configuration for the HTTP API.
//!
//! Sets up all routes and middleware (CORS, tracing, metrics, role gating,
//! concurrency limit).

use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request},
    middleware::{self, Next},
    response::Response,
    routing::{get, put},
    Router,
};
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::state::AppState;
use crate::auth;
use crate::observability;

/// Record request count and latency per matched route.
async fn track_metrics(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let start = Instant::now();

    let response = next.run(req).await;

    let status = observability::status_class(response.status().as_u16());
    metrics::counter!(observability::HTTP_REQUESTS_TOTAL, "route" => route.clone(), "status" => status)
        .increment(1);
    metrics::histogram!(observability::HTTP_REQUEST_DURATION_SECONDS, "route" => route)
        .record(start.elapsed().as_secs_f64());
    response
}

/// Create the main application router with all routes and middleware.
pub fn create_router(state: AppState, max_connections: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        // Theatres
        .route("/api/theatre", get(handlers::list_theatres).post(handlers::create_theatre))
        .route("/api/theatre/{id}", get(handlers::get_theatre).put(handlers::update_theatre))
        .route("/api/theatre/{id}/availability", get(handlers::check_availability))
        .route("/api/theatre/{id}/schedule", get(handlers::theatre_schedule))
        .route("/api/theatre/{id}/free-slots", get(handlers::free_slots))
        // Available-theatres query, under both paths clients use
        .route("/api/schedule/available-theatres", get(handlers::available_theatres))
        .route("/api/surgeries/AvailableTheatres", get(handlers::available_theatres))
        // Surgeries
        .route("/api/surgeries", get(handlers::list_surgeries).post(handlers::create_surgery))
        .route("/api/surgeries/upcoming", get(handlers::upcoming_surgeries))
        .route("/api/surgeries/by-surgeon/{surgeon_id}", get(handlers::surgeries_by_surgeon))
        .route("/api/surgeries/by-patient/{patient_id}", get(handlers::surgeries_by_patient))
        .route(
            "/api/surgeries/{id}",
            get(handlers::get_surgery).delete(handlers::remove_surgery),
        )
        .route("/api/surgeries/{id}/schedule", put(handlers::reschedule_surgery))
        .route("/api/surgeries/{id}/status", put(handlers::set_status))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::authorize));

    Router::new()
        .route("/health", get(handlers::health_check))
        .merge(api)
        .route_layer(middleware::from_fn(track_metrics))
        .layer(GlobalConcurrencyLimitLayer::new(max_connections))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenTable;
    use crate::engine::Engine;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_router_creation() {
        let path = std::env::temp_dir().join(format!("theatre_sched_router_creation_{}.wal", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let engine = Arc::new(Engine::new(path).unwrap());
        let _router = create_router(AppState::new(engine, TokenTable::default()), 8);
    }
}
