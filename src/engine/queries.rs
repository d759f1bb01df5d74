use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};

use crate::ledger::{Ledger, StorageError};
use crate::model::*;

use super::availability;
use super::{ensure_live, Engine, EngineError, SharedTheatreState};

impl Engine {
    /// Snapshot of every theatre state, ascending by id.
    fn sorted_states(&self) -> Vec<SharedTheatreState> {
        let mut entries: Vec<(TheatreId, SharedTheatreState)> = self
            .state
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        entries.sort_unstable_by_key(|(id, _)| *id);
        entries.into_iter().map(|(_, rs)| rs).collect()
    }

    pub async fn list_theatres(&self) -> Vec<Theatre> {
        let mut out = Vec::with_capacity(self.state.len());
        for rs in self.sorted_states() {
            let guard = rs.read().await;
            if !guard.retired {
                out.push(guard.info());
            }
        }
        out
    }

    pub async fn get_theatre(&self, id: TheatreId) -> Result<Theatre, EngineError> {
        let rs = self.theatre_state(id)?;
        let guard = rs.read().await;
        ensure_live(&guard)?;
        Ok(guard.info())
    }

    /// Every booking of a theatre, any status, ordered by date and start.
    pub async fn theatre_schedule(&self, id: TheatreId) -> Result<Vec<Booking>, EngineError> {
        let rs = self.theatre_state(id)?;
        let guard = rs.read().await;
        ensure_live(&guard)?;
        Ok(guard.bookings.clone())
    }

    pub async fn get_surgery(&self, id: SurgeryId) -> Result<Booking, EngineError> {
        loop {
            let theatre_id = self.surgery_theatre(id)?;
            let rs = self.theatre_state(theatre_id)?;
            let guard = rs.read().await;
            if let Some(b) = guard.booking(id) {
                return Ok(b.clone());
            }
            drop(guard);
            if self.surgery_theatre(id)? == theatre_id {
                return Err(EngineError::SurgeryNotFound(id));
            }
        }
    }

    /// All bookings across theatres, ordered by date, start, then surgery id.
    pub async fn list_surgeries(&self) -> Vec<Booking> {
        self.collect_bookings(|_| true).await
    }

    /// Active bookings on dates strictly after `after`.
    pub async fn upcoming_surgeries(&self, after: NaiveDate) -> Vec<Booking> {
        self.collect_bookings(|b| b.is_active() && b.window.date() > after)
            .await
    }

    /// Every booking assigned to one surgeon, any status.
    pub async fn surgeries_by_surgeon(&self, surgeon: SurgeonId) -> Vec<Booking> {
        self.collect_bookings(|b| b.surgeon_id == Some(surgeon)).await
    }

    /// Every booking of one patient, any status.
    pub async fn surgeries_by_patient(&self, patient: PatientId) -> Vec<Booking> {
        self.collect_bookings(|b| b.patient_id == Some(patient)).await
    }

    async fn collect_bookings(&self, keep: impl Fn(&Booking) -> bool) -> Vec<Booking> {
        let mut out = Vec::new();
        for rs in self.sorted_states() {
            let guard = rs.read().await;
            out.extend(guard.bookings.iter().filter(|b| keep(b)).cloned());
        }
        out.sort_by_key(|b| (b.window.sort_key(), b.surgery_id));
        out
    }

    /// Free sub-windows of `[from, to)` on `date` in one theatre.
    pub async fn free_slots(
        &self,
        theatre_id: TheatreId,
        date: NaiveDate,
        from: NaiveTime,
        to: NaiveTime,
        min_minutes: Option<i64>,
    ) -> Result<Vec<TimeWindow>, EngineError> {
        let range = TimeWindow::new(date, from, to)?;
        if min_minutes.is_some_and(|m| m <= 0) {
            return Err(EngineError::InvalidInput("min_minutes must be positive".into()));
        }
        let rs = self.theatre_state(theatre_id)?;
        let overlapping: Vec<Booking> = {
            let guard = rs.read().await;
            ensure_live(&guard)?;
            guard.candidates(&range).cloned().collect()
        };
        Ok(availability::free_slots(&overlapping, &range, min_minutes))
    }

    /// Is the theatre free for the whole window?
    pub async fn check_availability(
        &self,
        theatre_id: TheatreId,
        window: &TimeWindow,
    ) -> Result<bool, EngineError> {
        availability::is_available(self, theatre_id, window).await
    }

    /// Theatres with no active booking overlapping the window, ascending by id.
    pub async fn available_theatres(&self, window: &TimeWindow) -> Result<Vec<Theatre>, EngineError> {
        availability::list_available_theatres(self, window).await
    }
}

#[async_trait]
impl Ledger for Engine {
    async fn theatre(&self, id: TheatreId) -> Result<Option<Theatre>, StorageError> {
        let Some(rs) = self.get_theatre_state(id) else {
            return Ok(None);
        };
        let guard = rs.read().await;
        Ok((!guard.retired).then(|| guard.info()))
    }

    async fn list_theatres(&self) -> Result<Vec<Theatre>, StorageError> {
        Ok(Engine::list_theatres(self).await)
    }

    async fn active_bookings_for_theatre(&self, id: TheatreId) -> Result<Vec<Booking>, StorageError> {
        let Some(rs) = self.get_theatre_state(id) else {
            return Ok(Vec::new());
        };
        let guard = rs.read().await;
        Ok(guard.active_bookings().cloned().collect())
    }

    async fn active_bookings_for_date(&self, date: NaiveDate) -> Result<Vec<Booking>, StorageError> {
        let mut out = Vec::new();
        for rs in self.sorted_states() {
            let guard = rs.read().await;
            let left = guard.bookings.partition_point(|b| b.window.date() < date);
            out.extend(
                guard.bookings[left..]
                    .iter()
                    .take_while(|b| b.window.date() == date)
                    .filter(|b| b.is_active())
                    .cloned(),
            );
        }
        Ok(out)
    }
}
