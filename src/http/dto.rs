//! Request and response bodies.
//!
//! Dates travel as `YYYY-MM-DD` and times as `HH:MM`, matching the
//! `surgery_date` / `start_time` / `end_time` fields of the schedule table.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::model::*;

fn hhmm(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

/// `{ "data": ... }` envelope used by every listing and entity response.
#[derive(Debug, Serialize, Deserialize)]
pub struct DataResponse<T> {
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub theatres: usize,
}

// ── Theatres ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateTheatreRequest {
    pub theatre_id: TheatreId,
    pub name: String,
    pub capacity: u32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTheatreRequest {
    pub name: String,
    pub capacity: u32,
}

/// Candidate window as query parameters.
#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    pub surgery_date: String,
    pub start_time: String,
    pub end_time: String,
}

impl WindowQuery {
    pub fn window(&self) -> Result<TimeWindow, WindowError> {
        TimeWindow::parse(&self.surgery_date, &self.start_time, &self.end_time)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    pub available: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TheatreSummary {
    pub theatre_id: TheatreId,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AvailableTheatresResponse {
    pub theatres: Vec<TheatreSummary>,
}

impl From<Vec<Theatre>> for AvailableTheatresResponse {
    fn from(theatres: Vec<Theatre>) -> Self {
        Self {
            theatres: theatres
                .into_iter()
                .map(|t| TheatreSummary {
                    theatre_id: t.theatre_id,
                    name: t.name,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FreeSlotsQuery {
    pub surgery_date: String,
    pub from: String,
    pub to: String,
    pub min_minutes: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlotDto {
    pub start_time: String,
    pub end_time: String,
}

impl From<TimeWindow> for SlotDto {
    fn from(w: TimeWindow) -> Self {
        Self {
            start_time: hhmm(w.start()),
            end_time: hhmm(w.end()),
        }
    }
}

// ── Surgeries ────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SurgeryDto {
    pub surgery_id: SurgeryId,
    pub theatre_id: TheatreId,
    pub surgery_date: String,
    pub start_time: String,
    pub end_time: String,
    pub status: BookingStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub surgery_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub surgeon_id: Option<SurgeonId>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub patient_id: Option<PatientId>,
}

impl From<Booking> for SurgeryDto {
    fn from(b: Booking) -> Self {
        Self {
            surgery_id: b.surgery_id,
            theatre_id: b.theatre_id,
            surgery_date: b.window.date().format("%Y-%m-%d").to_string(),
            start_time: hhmm(b.window.start()),
            end_time: hhmm(b.window.end()),
            status: b.status,
            surgery_type: b.surgery_type,
            surgeon_id: b.surgeon_id,
            patient_id: b.patient_id,
        }
    }
}

pub fn surgeries(bookings: Vec<Booking>) -> Vec<SurgeryDto> {
    bookings.into_iter().map(Into::into).collect()
}

#[derive(Debug, Deserialize)]
pub struct CreateSurgeryRequest {
    pub surgery_id: SurgeryId,
    pub theatre_id: TheatreId,
    pub surgery_date: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub status: Option<BookingStatus>,
    #[serde(default)]
    pub surgery_type: Option<String>,
    #[serde(default)]
    pub surgeon_id: Option<SurgeonId>,
    #[serde(default)]
    pub patient_id: Option<PatientId>,
}

impl CreateSurgeryRequest {
    pub fn into_booking(self) -> Result<NewBooking, WindowError> {
        Ok(NewBooking {
            window: TimeWindow::parse(&self.surgery_date, &self.start_time, &self.end_time)?,
            surgery_id: self.surgery_id,
            theatre_id: self.theatre_id,
            status: self.status.unwrap_or(BookingStatus::Scheduled),
            surgery_type: self.surgery_type,
            surgeon_id: self.surgeon_id,
            patient_id: self.patient_id,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    #[serde(default)]
    pub theatre_id: Option<TheatreId>,
    pub surgery_date: String,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: BookingStatus,
}

#[derive(Debug, Deserialize)]
pub struct UpcomingQuery {
    /// Defaults to today
    pub after: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surgery_dto_uses_wire_formats() {
        let booking = Booking {
            surgery_id: 7,
            theatre_id: 2,
            window: TimeWindow::parse("2024-06-01", "09:00", "10:30").unwrap(),
            status: BookingStatus::InProgress,
            surgery_type: None,
            surgeon_id: None,
            patient_id: None,
        };
        let json = serde_json::to_value(SurgeryDto::from(booking)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "surgery_id": 7,
                "theatre_id": 2,
                "surgery_date": "2024-06-01",
                "start_time": "09:00",
                "end_time": "10:30",
                "status": "IN_PROGRESS"
            })
        );
    }

    #[test]
    fn create_request_defaults_to_scheduled() {
        let req: CreateSurgeryRequest = serde_json::from_str(
            r#"{"surgery_id":1,"theatre_id":1,"surgery_date":"2024-06-01","start_time":"09:00","end_time":"10:00"}"#,
        )
        .unwrap();
        let nb = req.into_booking().unwrap();
        assert_eq!(nb.status, BookingStatus::Scheduled);
        assert_eq!(nb.window.duration_minutes(), 60);
        assert_eq!(nb.surgeon_id, None);
    }

    #[test]
    fn create_request_carries_surgeon_and_patient() {
        let req: CreateSurgeryRequest = serde_json::from_str(
            r#"{"surgery_id":1,"theatre_id":1,"surgery_date":"2024-06-01","start_time":"09:00","end_time":"10:00","surgeon_id":12,"patient_id":340}"#,
        )
        .unwrap();
        let nb = req.into_booking().unwrap();
        assert_eq!((nb.surgeon_id, nb.patient_id), (Some(12), Some(340)));
    }
}
