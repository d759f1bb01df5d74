//! HTTP handlers for the REST API.
//!
//! Each handler parses its inputs, calls one engine operation and wraps the
//! result in a DTO. Engine errors map to statuses in `error.rs`.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};

use super::dto::*;
use super::error::AppError;
use super::state::AppState;
use crate::model::*;

/// Result type for handlers.
pub type HandlerResult<T> = Result<Json<T>, AppError>;

// =============================================================================
// Health Check
// =============================================================================

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> HandlerResult<HealthResponse> {
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        theatres: state.engine.state.len(),
    }))
}

// =============================================================================
// Theatres
// =============================================================================

/// GET /api/theatre
pub async fn list_theatres(State(state): State<AppState>) -> HandlerResult<DataResponse<Vec<Theatre>>> {
    Ok(Json(DataResponse::new(state.engine.list_theatres().await)))
}

/// POST /api/theatre
pub async fn create_theatre(
    State(state): State<AppState>,
    body: Result<Json<CreateTheatreRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DataResponse<Theatre>>), AppError> {
    let Json(req) = body?;
    let theatre = state
        .engine
        .create_theatre(req.theatre_id, req.name, req.capacity)
        .await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(theatre))))
}

/// GET /api/theatre/{id}
pub async fn get_theatre(
    State(state): State<AppState>,
    id: Result<Path<TheatreId>, PathRejection>,
) -> HandlerResult<DataResponse<Theatre>> {
    let Path(id) = id?;
    Ok(Json(DataResponse::new(state.engine.get_theatre(id).await?)))
}

/// PUT /api/theatre/{id}
pub async fn update_theatre(
    State(state): State<AppState>,
    id: Result<Path<TheatreId>, PathRejection>,
    body: Result<Json<UpdateTheatreRequest>, JsonRejection>,
) -> HandlerResult<DataResponse<Theatre>> {
    let Path(id) = id?;
    let Json(req) = body?;
    let theatre = state.engine.update_theatre(id, req.name, req.capacity).await?;
    Ok(Json(DataResponse::new(theatre)))
}

/// GET /api/theatre/{id}/availability?surgery_date&start_time&end_time
pub async fn check_availability(
    State(state): State<AppState>,
    id: Result<Path<TheatreId>, PathRejection>,
    query: Result<Query<WindowQuery>, QueryRejection>,
) -> HandlerResult<AvailabilityResponse> {
    let Path(id) = id?;
    let Query(q) = query?;
    let window = q.window()?;
    let available = state.engine.check_availability(id, &window).await?;
    Ok(Json(AvailabilityResponse { available }))
}

/// GET /api/theatre/{id}/schedule
pub async fn theatre_schedule(
    State(state): State<AppState>,
    id: Result<Path<TheatreId>, PathRejection>,
) -> HandlerResult<DataResponse<Vec<SurgeryDto>>> {
    let Path(id) = id?;
    let bookings = state.engine.theatre_schedule(id).await?;
    Ok(Json(DataResponse::new(surgeries(bookings))))
}

/// GET /api/theatre/{id}/free-slots?surgery_date&from&to&min_minutes
pub async fn free_slots(
    State(state): State<AppState>,
    id: Result<Path<TheatreId>, PathRejection>,
    query: Result<Query<FreeSlotsQuery>, QueryRejection>,
) -> HandlerResult<DataResponse<Vec<SlotDto>>> {
    let Path(id) = id?;
    let Query(q) = query?;
    let date = parse_date(&q.surgery_date)?;
    let from = parse_time(&q.from)?;
    let to = parse_time(&q.to)?;
    let slots = state.engine.free_slots(id, date, from, to, q.min_minutes).await?;
    Ok(Json(DataResponse::new(slots.into_iter().map(SlotDto::from).collect())))
}

/// GET /api/schedule/available-theatres and /api/surgeries/AvailableTheatres
pub async fn available_theatres(
    State(state): State<AppState>,
    query: Result<Query<WindowQuery>, QueryRejection>,
) -> HandlerResult<AvailableTheatresResponse> {
    let Query(q) = query?;
    let window = q.window()?;
    let theatres = state.engine.available_theatres(&window).await?;
    Ok(Json(theatres.into()))
}

// =============================================================================
// Surgeries
// =============================================================================

/// GET /api/surgeries
pub async fn list_surgeries(State(state): State<AppState>) -> HandlerResult<DataResponse<Vec<SurgeryDto>>> {
    Ok(Json(DataResponse::new(surgeries(state.engine.list_surgeries().await))))
}

/// GET /api/surgeries/upcoming?after=YYYY-MM-DD
pub async fn upcoming_surgeries(
    State(state): State<AppState>,
    query: Result<Query<UpcomingQuery>, QueryRejection>,
) -> HandlerResult<DataResponse<Vec<SurgeryDto>>> {
    let Query(q) = query?;
    let after = match q.after.as_deref() {
        Some(s) => parse_date(s)?,
        None => chrono::Local::now().date_naive(),
    };
    Ok(Json(DataResponse::new(surgeries(
        state.engine.upcoming_surgeries(after).await,
    ))))
}

/// GET /api/surgeries/by-surgeon/{surgeon_id}
pub async fn surgeries_by_surgeon(
    State(state): State<AppState>,
    id: Result<Path<SurgeonId>, PathRejection>,
) -> HandlerResult<DataResponse<Vec<SurgeryDto>>> {
    let Path(id) = id?;
    Ok(Json(DataResponse::new(surgeries(
        state.engine.surgeries_by_surgeon(id).await,
    ))))
}

/// GET /api/surgeries/by-patient/{patient_id}
pub async fn surgeries_by_patient(
    State(state): State<AppState>,
    id: Result<Path<PatientId>, PathRejection>,
) -> HandlerResult<DataResponse<Vec<SurgeryDto>>> {
    let Path(id) = id?;
    Ok(Json(DataResponse::new(surgeries(
        state.engine.surgeries_by_patient(id).await,
    ))))
}

/// POST /api/surgeries
pub async fn create_surgery(
    State(state): State<AppState>,
    body: Result<Json<CreateSurgeryRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DataResponse<SurgeryDto>>), AppError> {
    let Json(req) = body?;
    let booking = state.engine.schedule_surgery(req.into_booking()?).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(booking.into()))))
}

/// GET /api/surgeries/{id}
pub async fn get_surgery(
    State(state): State<AppState>,
    id: Result<Path<SurgeryId>, PathRejection>,
) -> HandlerResult<DataResponse<SurgeryDto>> {
    let Path(id) = id?;
    Ok(Json(DataResponse::new(state.engine.get_surgery(id).await?.into())))
}

/// PUT /api/surgeries/{id}/schedule
pub async fn reschedule_surgery(
    State(state): State<AppState>,
    id: Result<Path<SurgeryId>, PathRejection>,
    body: Result<Json<RescheduleRequest>, JsonRejection>,
) -> HandlerResult<DataResponse<SurgeryDto>> {
    let Path(id) = id?;
    let Json(req) = body?;
    let window = TimeWindow::parse(&req.surgery_date, &req.start_time, &req.end_time)?;
    let booking = state
        .engine
        .reschedule_surgery(id, req.theatre_id, window)
        .await?;
    Ok(Json(DataResponse::new(booking.into())))
}

/// PUT /api/surgeries/{id}/status
pub async fn set_status(
    State(state): State<AppState>,
    id: Result<Path<SurgeryId>, PathRejection>,
    body: Result<Json<StatusRequest>, JsonRejection>,
) -> HandlerResult<DataResponse<SurgeryDto>> {
    let Path(id) = id?;
    let Json(req) = body?;
    let booking = state.engine.set_status(id, req.status).await?;
    Ok(Json(DataResponse::new(booking.into())))
}

/// DELETE /api/surgeries/{id}
pub async fn remove_surgery(
    State(state): State<AppState>,
    id: Result<Path<SurgeryId>, PathRejection>,
) -> HandlerResult<DataResponse<SurgeryDto>> {
    let Path(id) = id?;
    Ok(Json(DataResponse::new(state.engine.remove_surgery(id).await?.into())))
}
