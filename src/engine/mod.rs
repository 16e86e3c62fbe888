mod compaction;
mod error;
mod ledger;
mod lifecycle;
mod mutations;
mod queries;
mod store;
mod sweep;

pub use error::EngineError;
pub use ledger::Usage;
pub use lifecycle::hold_lapsed;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, OwnedMutexGuard, RwLock, RwLockReadGuard};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

use store::InMemoryStore;

pub type SharedResourceState = Arc<RwLock<ResourceState>>;

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

/// Sole owner of the WAL. Every append waiting in the channel when the writer
/// wakes joins one batch and shares one fsync; each sender then gets the
/// batch result. A compaction request ends the batch and runs right after it.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break, // channel empty, flush
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
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::warn!("WAL flush failed for batch of {}: {e}", batch.len());
    }
    respond_batch(batch, &result);
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so partially buffered bytes do not
    // leak into the next batch; every caller in this one is told it failed.
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(
    batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>,
    result: &io::Result<()>,
) {
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
        // The writer loop batches appends itself; a stray one is committed alone.
        WalCommand::Append { event, response } => {
            let mut batch = vec![(event, response)];
            commit_batch(wal, &mut batch);
        }
    }
}

/// The reservation engine: capacity accounting, the hold/confirm protocol and
/// the expiry sweep over an in-memory store made durable by the WAL.
///
/// Lock order, fixed for every operation:
/// commit gate (shared) → reservation row → resource.
/// Compaction is the only exclusive holder of the commit gate.
pub struct Engine {
    pub(super) store: InMemoryStore,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Shared by every committing operation; taken exclusively by compaction so
    /// a snapshot never misses an event appended to the log it replaces.
    pub(super) commit_gate: RwLock<()>,
    hold_ttl: Ms,
}

impl Engine {
    /// Replay `wal_path` and start the WAL writer. Must be called inside a tokio runtime.
    pub fn new(wal_path: PathBuf, hold_ttl: Ms) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            store: InMemoryStore::new(),
            wal_tx,
            commit_gate: RwLock::new(()),
            hold_ttl,
        };

        // Sole owner of every Arc during replay, so try_write cannot contend.
        // blocking_write would panic inside the runtime.
        for event in &events {
            engine.replay_event(event)?;
        }
        tracing::info!(
            "replayed {} WAL events: {} resources, {} reservations",
            events.len(),
            engine.store.resource_count(),
            engine.store.reservation_count()
        );

        Ok(engine)
    }

    fn replay_event(&self, event: &Event) -> io::Result<()> {
        match event {
            Event::ResourceCreated {
                id,
                name,
                description,
                capacity,
                active,
                schedule,
                created_at,
            } => {
                let spec = ResourceSpec {
                    name: name.clone(),
                    description: description.clone(),
                    capacity: *capacity,
                    active: *active,
                    schedule: *schedule,
                };
                let rs = ResourceState::new(*id, spec, *created_at);
                self.store.insert_resource(*id, Arc::new(RwLock::new(rs)));
            }
            Event::HoldConfirmed { .. }
            | Event::ReservationCancelled { .. }
            | Event::HoldsExpired { .. } => self.store.apply_row_event(event),
            Event::HoldPlaced { resource_id: id, .. }
            | Event::ResourceUpdated { id, .. }
            | Event::ResourceDeleted { id } => {
                let Some(rs) = self.store.get_resource(id) else {
                    tracing::warn!("replay: event for unknown resource {id}, skipped");
                    return Ok(());
                };
                let mut guard = rs
                    .try_write()
                    .map_err(|_| io::Error::other("replay: resource lock contended"))?;
                self.store.apply_resource_event(&mut guard, event);
                if matches!(event, Event::ResourceDeleted { .. }) {
                    self.store.remove_resource(id);
                }
            }
        }
        Ok(())
    }

    pub fn hold_ttl(&self) -> Ms {
        self.hold_ttl
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Shared side of the commit gate. Taken first by every committing operation.
    pub(super) async fn enter_commit(&self) -> RwLockReadGuard<'_, ()> {
        self.commit_gate.read().await
    }

    /// WAL-append, then apply to the resource and its rows. Nothing is applied
    /// if the append fails.
    pub(super) async fn persist_and_apply(
        &self,
        rs: &mut ResourceState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_resource_event(rs, event);
        Ok(())
    }

    /// WAL-append, then apply a row-only event.
    pub(super) async fn persist_row_event(&self, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_row_event(event);
        Ok(())
    }

    /// Acquire the exclusive row lock for a reservation.
    pub(super) async fn lock_row(&self, id: &Ulid) -> Result<OwnedMutexGuard<()>, EngineError> {
        let lock = self.store.row_lock(id).ok_or(EngineError::NotFound(*id))?;
        Ok(lock.lock_owned().await)
    }

    /// Look up a resource and acquire its write lock. Fails if the resource was
    /// deleted while we waited.
    pub(super) async fn lock_resource(
        &self,
        id: &Ulid,
    ) -> Result<tokio::sync::OwnedRwLockWriteGuard<ResourceState>, EngineError> {
        let rs = self.store.get_resource(id).ok_or(EngineError::NotFound(*id))?;
        let guard = rs.clone().write_owned().await;
        let still_current = self
            .store
            .get_resource(id)
            .is_some_and(|current| Arc::ptr_eq(&current, &rs));
        if !still_current {
            return Err(EngineError::NotFound(*id));
        }
        Ok(guard)
    }

    /// Ledger tally for a resource from its live rows, optionally leaving one
    /// reservation out.
    pub(super) fn usage(&self, rs: &ResourceState, skip: Option<Ulid>, now: Ms) -> Usage {
        let rows = self.store.reservations_of(&rs.live_ids);
        match skip {
            Some(id) => Usage::tally_excluding(&rows, id, now),
            None => Usage::tally(&rows, now),
        }
    }
}
