use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use tokio::sync::{oneshot, RwLock};

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_booking_room, check_no_conflict, validate_surgery_type, validate_theatre};
use super::{ensure_live, move_booking, Engine, EngineError, WalCommand};

impl Engine {
    pub async fn create_theatre(
        &self,
        id: TheatreId,
        name: String,
        capacity: u32,
    ) -> Result<Theatre, EngineError> {
        validate_theatre(&name, capacity)?;
        let _compaction = self.compaction.read().await;
        if self.state.len() >= MAX_THEATRES {
            return Err(EngineError::LimitExceeded("too many theatres"));
        }

        // Publish the new theatre already write-locked so nobody books into
        // it before the WAL has it.
        let rs = Arc::new(RwLock::new(TheatreState::new(id, name.clone(), capacity)));
        let mut guard = rs.clone().write_owned().await;
        match self.state.entry(id) {
            Entry::Occupied(_) => return Err(EngineError::TheatreExists(id)),
            Entry::Vacant(slot) => {
                slot.insert(rs);
            }
        }

        let event = Event::TheatreCreated { id, name, capacity };
        if let Err(e) = self.wal_append(&event).await {
            self.retire_theatre(&mut guard);
            return Err(e);
        }
        let theatre = guard.info();
        drop(guard);

        self.record_theatre_count();
        tracing::info!(theatre_id = id, name = %theatre.name, capacity, "theatre created");
        Ok(theatre)
    }

    pub async fn update_theatre(
        &self,
        id: TheatreId,
        name: String,
        capacity: u32,
    ) -> Result<Theatre, EngineError> {
        validate_theatre(&name, capacity)?;
        let _compaction = self.compaction.read().await;
        let rs = self.theatre_state(id)?;
        let mut guard = rs.write().await;
        ensure_live(&guard)?;

        let event = Event::TheatreUpdated { id, name, capacity };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::info!(theatre_id = id, "theatre updated");
        Ok(guard.info())
    }

    /// Book a theatre for a surgery. Check and insert happen under one write lock.
    pub async fn schedule_surgery(&self, new: NewBooking) -> Result<Booking, EngineError> {
        validate_surgery_type(new.surgery_type.as_deref())?;
        if !new.status.is_active() {
            return Err(EngineError::InvalidTransition {
                from: BookingStatus::Scheduled,
                to: new.status,
            });
        }
        let NewBooking {
            surgery_id: id,
            theatre_id,
            window,
            status,
            surgery_type,
            surgeon_id,
            patient_id,
        } = new;

        let _compaction = self.compaction.read().await;
        let rs = self.theatre_state(theatre_id)?;
        let mut guard = rs.write().await;
        ensure_live(&guard)?;
        check_booking_room(&guard)?;

        match self.surgery_to_theatre.entry(id) {
            Entry::Occupied(_) => return Err(EngineError::SurgeryExists(id)),
            Entry::Vacant(slot) => {
                slot.insert(theatre_id);
            }
        }

        let event = Event::SurgeryScheduled {
            id,
            theatre_id,
            window,
            status,
            surgery_type,
            surgeon_id,
            patient_id,
        };
        let result = match check_no_conflict(&guard, &window, None) {
            Ok(()) => self.persist_and_apply(&mut guard, &event).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            // Release the id while still holding the theatre lock
            self.surgery_to_theatre.remove(&id);
            return Err(e);
        }

        tracing::info!(surgery_id = id, theatre_id, %window, "surgery scheduled");
        guard
            .booking(id)
            .cloned()
            .ok_or(EngineError::SurgeryNotFound(id))
    }

    /// Move an active booking to a new window, optionally in another theatre.
    /// The booking's own current slot never conflicts with the move.
    pub async fn reschedule_surgery(
        &self,
        id: SurgeryId,
        theatre_id: Option<TheatreId>,
        window: TimeWindow,
    ) -> Result<Booking, EngineError> {
        let _compaction = self.compaction.read().await;

        loop {
            let from = self.surgery_theatre(id)?;
            let to = theatre_id.unwrap_or(from);

            if from == to {
                let mut guard = self.resolve_surgery_write(id).await?;
                if guard.id != to {
                    // Moved by someone else while we waited; re-resolve
                    continue;
                }
                let current = guard.booking(id).ok_or(EngineError::SurgeryNotFound(id))?;
                ensure_reschedulable(current)?;
                check_no_conflict(&guard, &window, Some(id))?;

                let event = Event::SurgeryRescheduled {
                    id,
                    from_theatre: from,
                    theatre_id: to,
                    window,
                };
                self.persist_and_apply(&mut guard, &event).await?;
                tracing::info!(surgery_id = id, theatre_id = to, %window, "surgery rescheduled");
                return guard.booking(id).cloned().ok_or(EngineError::SurgeryNotFound(id));
            }

            let (mut src, mut dst) = self.lock_pair(from, to).await?;
            let Some(current) = src.booking(id) else {
                if self.surgery_theatre(id)? == from {
                    return Err(EngineError::SurgeryNotFound(id));
                }
                continue;
            };
            ensure_reschedulable(current)?;
            check_booking_room(&dst)?;
            check_no_conflict(&dst, &window, Some(id))?;

            let event = Event::SurgeryRescheduled {
                id,
                from_theatre: from,
                theatre_id: to,
                window,
            };
            self.wal_append(&event).await?;
            move_booking(&mut src, &mut dst, id, window);
            self.surgery_to_theatre.insert(id, to);
            tracing::info!(surgery_id = id, from_theatre = from, theatre_id = to, %window, "surgery moved");
            return dst.booking(id).cloned().ok_or(EngineError::SurgeryNotFound(id));
        }
    }

    /// Drive the booking lifecycle. Leaving the active states frees the slot.
    pub async fn set_status(&self, id: SurgeryId, status: BookingStatus) -> Result<Booking, EngineError> {
        let _compaction = self.compaction.read().await;
        let mut guard = self.resolve_surgery_write(id).await?;
        let current = guard
            .booking(id)
            .map(|b| b.status)
            .ok_or(EngineError::SurgeryNotFound(id))?;

        if current != status {
            if !current.can_transition_to(status) {
                return Err(EngineError::InvalidTransition { from: current, to: status });
            }
            let event = Event::SurgeryStatusChanged {
                id,
                theatre_id: guard.id,
                status,
            };
            self.persist_and_apply(&mut guard, &event).await?;
            tracing::info!(surgery_id = id, from = %current, to = %status, "surgery status changed");
        }

        guard.booking(id).cloned().ok_or(EngineError::SurgeryNotFound(id))
    }

    /// Delete a booking outright, whatever its status.
    pub async fn remove_surgery(&self, id: SurgeryId) -> Result<Booking, EngineError> {
        let _compaction = self.compaction.read().await;
        let mut guard = self.resolve_surgery_write(id).await?;
        let removed = guard.booking(id).cloned().ok_or(EngineError::SurgeryNotFound(id))?;

        let event = Event::SurgeryRemoved {
            id,
            theatre_id: guard.id,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        self.surgery_to_theatre.remove(&id);
        tracing::info!(surgery_id = id, theatre_id = guard.id, "surgery removed");
        Ok(removed)
    }

    /// Compact the WAL by rewriting it with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _exclusive = self.compaction.write().await;

        let mut ids: Vec<TheatreId> = self.state.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();

        let mut events = Vec::new();
        for id in ids {
            let Some(rs) = self.get_theatre_state(id) else {
                continue;
            };
            let guard = rs.read().await;
            events.push(Event::TheatreCreated {
                id: guard.id,
                name: guard.name.clone(),
                capacity: guard.capacity,
            });
            for b in &guard.bookings {
                events.push(Event::SurgeryScheduled {
                    id: b.surgery_id,
                    theatre_id: guard.id,
                    window: b.window,
                    status: b.status,
                    surgery_type: b.surgery_type.clone(),
                    surgeon_id: b.surgeon_id,
                    patient_id: b.patient_id,
                });
            }
        }
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::StorageUnavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::StorageUnavailable("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::StorageUnavailable(e.to_string()))?;

        tracing::info!(events = count, "wal compacted");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

fn ensure_reschedulable(booking: &Booking) -> Result<(), EngineError> {
    if booking.is_active() {
        Ok(())
    } else {
        Err(EngineError::InvalidInput(format!(
            "surgery {} is {} and cannot be rescheduled",
            booking.surgery_id, booking.status
        )))
    }
}

