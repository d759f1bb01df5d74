pub mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;

pub use error::EngineError;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, OwnedRwLockWriteGuard, RwLock};

use crate::model::*;
use crate::observability;
use crate::wal::Wal;

pub type SharedTheatreState = Arc<RwLock<TheatreState>>;
pub(super) type TheatreGuard = OwnedRwLockWriteGuard<TheatreState>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders with the batch result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            // Commit what we have before touching the file for anything else
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
    tracing::debug!("wal writer: channel closed, exiting");
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!(batch = batch.len(), "wal flush failed: {e}");
    }
    respond_batch(batch, &result);
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even on append error so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn respond_batch(batch: &mut Vec<PendingAppend>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let mut batch = vec![(event, response)];
            commit_batch(wal, &mut batch);
        }
    }
}

// ── Applying events ─────────────────────────────────────

/// Apply an event that touches a single theatre. Caller holds the lock.
///
/// Cross-theatre reschedules go through `move_booking` instead.
fn apply_to_theatre(ts: &mut TheatreState, event: &Event) {
    match event {
        Event::TheatreUpdated { name, capacity, .. } => {
            ts.name = name.clone();
            ts.capacity = *capacity;
        }
        Event::SurgeryScheduled {
            id,
            theatre_id,
            window,
            status,
            surgery_type,
            surgeon_id,
            patient_id,
        } => {
            ts.insert_booking(Booking {
                surgery_id: *id,
                theatre_id: *theatre_id,
                window: *window,
                status: *status,
                surgery_type: surgery_type.clone(),
                surgeon_id: *surgeon_id,
                patient_id: *patient_id,
            });
        }
        Event::SurgeryRescheduled { id, window, .. } => {
            if let Some(mut booking) = ts.remove_booking(*id) {
                booking.window = *window;
                ts.insert_booking(booking);
            }
        }
        Event::SurgeryStatusChanged { id, status, .. } => {
            if let Some(booking) = ts.booking_mut(*id) {
                booking.status = *status;
            }
        }
        Event::SurgeryRemoved { id, .. } => {
            ts.remove_booking(*id);
        }
        // Creation is handled at the map level
        Event::TheatreCreated { .. } => {}
    }
}

/// Relocate a booking between two theatres, both already locked.
fn move_booking(from: &mut TheatreState, to: &mut TheatreState, id: SurgeryId, window: TimeWindow) {
    if let Some(mut booking) = from.remove_booking(id) {
        booking.theatre_id = to.id;
        booking.window = window;
        to.insert_booking(booking);
    }
}

/// Rebuild theatre states and the surgery index from a replayed log.
fn rebuild(events: &[Event]) -> (HashMap<TheatreId, TheatreState>, HashMap<SurgeryId, TheatreId>) {
    let mut theatres: HashMap<TheatreId, TheatreState> = HashMap::new();
    let mut index: HashMap<SurgeryId, TheatreId> = HashMap::new();

    for event in events {
        match event {
            Event::TheatreCreated { id, name, capacity } => {
                theatres.insert(*id, TheatreState::new(*id, name.clone(), *capacity));
            }
            Event::SurgeryRescheduled {
                id,
                from_theatre,
                theatre_id,
                window,
            } if from_theatre != theatre_id => {
                let moved = theatres
                    .get_mut(from_theatre)
                    .and_then(|ts| ts.remove_booking(*id));
                if let Some(mut booking) = moved
                    && let Some(ts) = theatres.get_mut(theatre_id)
                {
                    booking.theatre_id = *theatre_id;
                    booking.window = *window;
                    ts.insert_booking(booking);
                    index.insert(*id, *theatre_id);
                }
            }
            other => {
                let Some(theatre_id) = event_theatre_id(other) else {
                    continue;
                };
                let Some(ts) = theatres.get_mut(&theatre_id) else {
                    tracing::warn!(theatre_id, "wal: event for unknown theatre, skipping");
                    continue;
                };
                apply_to_theatre(ts, other);
                match other {
                    Event::SurgeryScheduled { id, .. } => {
                        index.insert(*id, theatre_id);
                    }
                    Event::SurgeryRemoved { id, .. } => {
                        index.remove(id);
                    }
                    _ => {}
                }
            }
        }
    }

    (theatres, index)
}

/// The theatre an event is applied to (the destination for reschedules).
fn event_theatre_id(event: &Event) -> Option<TheatreId> {
    match event {
        Event::TheatreUpdated { id, .. } => Some(*id),
        Event::SurgeryScheduled { theatre_id, .. }
        | Event::SurgeryRescheduled { theatre_id, .. }
        | Event::SurgeryStatusChanged { theatre_id, .. }
        | Event::SurgeryRemoved { theatre_id, .. } => Some(*theatre_id),
        Event::TheatreCreated { .. } => None,
    }
}

/// A guard taken on a theatre whose creation was rolled back.
pub(super) fn ensure_live(ts: &TheatreState) -> Result<(), EngineError> {
    if ts.retired {
        Err(EngineError::TheatreNotFound(ts.id))
    } else {
        Ok(())
    }
}

// ── Engine ──────────────────────────────────────────────

/// In-memory booking ledger backed by the WAL.
///
/// Each theatre sits behind its own `RwLock`; the conflict check and the
/// insert of a booking happen under the same write guard.
pub struct Engine {
    pub state: DashMap<TheatreId, SharedTheatreState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Reverse lookup: surgery id → theatre id
    pub(super) surgery_to_theatre: DashMap<SurgeryId, TheatreId>,
    /// Mutations hold this shared, compaction holds it exclusively.
    pub(super) compaction: RwLock<()>,
}

impl Engine {
    /// Replay the WAL at `wal_path` and start the background writer.
    /// Must be called from within a tokio runtime.
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let (theatres, index) = rebuild(&events);
        let bookings: usize = theatres.values().map(|ts| ts.bookings.len()).sum();
        tracing::info!(
            events = events.len(),
            theatres = theatres.len(),
            bookings,
            "replayed wal from {}",
            wal_path.display()
        );

        let engine = Self {
            state: theatres
                .into_iter()
                .map(|(id, ts)| (id, Arc::new(RwLock::new(ts))))
                .collect(),
            wal_tx,
            surgery_to_theatre: index.into_iter().collect(),
            compaction: RwLock::new(()),
        };
        engine.record_theatre_count();
        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::StorageUnavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::StorageUnavailable("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::StorageUnavailable(e.to_string()))
    }

    pub fn get_theatre_state(&self, id: TheatreId) -> Option<SharedTheatreState> {
        self.state.get(&id).map(|e| e.value().clone())
    }

    pub(super) fn theatre_state(&self, id: TheatreId) -> Result<SharedTheatreState, EngineError> {
        self.get_theatre_state(id).ok_or(EngineError::TheatreNotFound(id))
    }

    pub(super) fn surgery_theatre(&self, id: SurgeryId) -> Result<TheatreId, EngineError> {
        self.surgery_to_theatre
            .get(&id)
            .map(|e| *e.value())
            .ok_or(EngineError::SurgeryNotFound(id))
    }

    /// WAL-append + apply in one call.
    pub(super) async fn persist_and_apply(
        &self,
        ts: &mut TheatreState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_theatre(ts, event);
        Ok(())
    }

    /// Lookup surgery → theatre and acquire that theatre's write lock.
    ///
    /// Retries when the booking moved to another theatre between the
    /// lookup and the lock.
    pub(super) async fn resolve_surgery_write(&self, id: SurgeryId) -> Result<TheatreGuard, EngineError> {
        loop {
            let theatre_id = self.surgery_theatre(id)?;
            let guard = self.theatre_state(theatre_id)?.write_owned().await;
            ensure_live(&guard)?;
            if guard.booking(id).is_some() {
                return Ok(guard);
            }
            if self.surgery_theatre(id)? == theatre_id {
                return Err(EngineError::SurgeryNotFound(id));
            }
        }
    }

    /// Write-lock two distinct theatres in ascending id order; guards come back as `(a, b)`.
    pub(super) async fn lock_pair(
        &self,
        a: TheatreId,
        b: TheatreId,
    ) -> Result<(TheatreGuard, TheatreGuard), EngineError> {
        let (sa, sb) = (self.theatre_state(a)?, self.theatre_state(b)?);
        let (ga, gb) = if a < b {
            let ga = sa.write_owned().await;
            (ga, sb.write_owned().await)
        } else {
            let gb = sb.write_owned().await;
            (sa.write_owned().await, gb)
        };
        ensure_live(&ga)?;
        ensure_live(&gb)?;
        Ok((ga, gb))
    }

    /// Undo a theatre publication whose WAL append failed. Caller holds the
    /// write guard; waiters that already cloned the `Arc` see `retired`.
    pub(super) fn retire_theatre(&self, ts: &mut TheatreState) {
        ts.retired = true;
        self.state.remove(&ts.id);
    }

    pub(super) fn record_theatre_count(&self) {
        metrics::gauge!(observability::THEATRES_ACTIVE).set(self.state.len() as f64);
    }
}
