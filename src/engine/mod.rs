mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod store;
#[cfg(test)]
pub(crate) mod testing;

pub use availability::{Availability, AvailabilityResolver, ResourceStatus};
pub use conflict::{refine, ConflictDetector};
pub use error::EngineError;
pub use store::{CoarseQuery, InMemoryStore, ScheduleStore};

use std::io;
use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::info;
use ulid::Ulid;

use crate::lifecycle::RuleRow;
use crate::model::*;
use crate::wal::Wal;

// ── WAL writer task ──────────────────────────────────────

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

/// Owns the WAL so file I/O never runs on a caller's task.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let started = Instant::now();
                let result = wal.append(&event);
                metrics::histogram!(crate::observability::WAL_APPEND_DURATION_SECONDS)
                    .record(started.elapsed().as_secs_f64());
                let _ = response.send(result);
            }
            WalCommand::Compact { events, response } => {
                let _ = response.send(wal.compact(&events));
            }
            WalCommand::AppendsSinceCompact { response } => {
                let _ = response.send(wal.appends_since_compact());
            }
        }
    }
}

/// Reference store: row maps in memory, every mutation logged to a WAL first.
pub struct Engine {
    pub(super) store: InMemoryStore,
    /// `None` for a volatile engine.
    pub(super) wal_tx: Option<mpsc::Sender<WalCommand>>,
    /// Keeps log order identical to in-memory application order.
    pub(super) write_gate: Mutex<()>,
}

impl Engine {
    /// Replay `wal_path` and start the writer task. Must run inside a tokio runtime.
    pub fn open(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::recover(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(1024);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = InMemoryStore::new();
        for event in &events {
            store.apply_event(event);
        }
        info!(
            "replayed {} events from {}: {} bookings, {} lifecycle records",
            events.len(),
            wal_path.display(),
            store.booking_count(),
            store.record_count()
        );

        Ok(Self {
            store,
            wal_tx: Some(wal_tx),
            write_gate: Mutex::new(()),
        })
    }

    /// No durability. Used by tests and benches.
    pub fn in_memory() -> Self {
        Self {
            store: InMemoryStore::new(),
            wal_tx: None,
            write_gate: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }

    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let Some(wal_tx) = &self.wal_tx else {
            return Ok(());
        };
        let (tx, rx) = oneshot::channel();
        wal_tx
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

    /// WAL-append then apply. Caller holds `write_gate`.
    pub(super) async fn commit(&self, event: &Event) -> Result<Vec<Transition>, EngineError> {
        self.wal_append(event).await?;
        Ok(self.store.apply_event(event))
    }
}

#[async_trait]
impl ScheduleStore for Engine {
    async fn overlapping_bookings(&self, query: &CoarseQuery) -> Result<Vec<Booking>, EngineError> {
        Ok(self.store.overlapping_bookings(query))
    }

    async fn booking(&self, id: Ulid) -> Result<Option<Booking>, EngineError> {
        Ok(self.store.booking(&id))
    }

    async fn live_bookings_for_teacher(&self, teacher_id: Ulid) -> Result<Vec<Booking>, EngineError> {
        Ok(self.store.live_bookings_for_teacher(&teacher_id))
    }

    async fn teachers(&self) -> Result<Vec<Teacher>, EngineError> {
        Ok(self.store.teachers())
    }

    async fn rooms(&self) -> Result<Vec<Room>, EngineError> {
        Ok(self.store.rooms())
    }

    async fn apply_rule_row(&self, row: &RuleRow, now: Ms) -> Result<Vec<Transition>, EngineError> {
        self.advance(row, now).await
    }
}
