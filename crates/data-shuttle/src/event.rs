//! Typed event stream consumed by the presentation layer.
//!
//! Events cross the worker/caller boundary through a bounded tokio channel:
//! emission order is preserved end-to-end and a full channel applies
//! backpressure to the engine instead of discarding notifications.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Bound of the event channel between the engine and its subscriber.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Ordered, typed notification emitted while a job runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MigrationEvent {
    /// Informational message, already composed; rendering is the
    /// subscriber's concern.
    Log { message: String },

    /// Cumulative progress across the whole job.
    Progress { inserted_total: u64, source_total: u64 },

    /// A single row failed extraction decode or its individual insert
    /// retry. `row_index` is the row's 1-based position in the source scan.
    Error { row_index: u64, message: String },

    /// Terminal event with the true aggregate totals.
    Done { inserted_total: u64, source_total: u64 },
}

/// Sending half of the event stream, with emission helpers.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<MigrationEvent>,
}

impl EventSink {
    /// Create a bounded event channel and its sink.
    pub fn channel() -> (Self, mpsc::Receiver<MigrationEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        (Self { tx }, rx)
    }

    /// Wrap an existing sender.
    pub fn new(tx: mpsc::Sender<MigrationEvent>) -> Self {
        Self { tx }
    }

    async fn emit(&self, event: MigrationEvent) {
        // A dropped receiver means the subscriber went away; the engine
        // keeps running and the remaining events are discarded by the
        // subscriber's own choice, never by the channel.
        let _ = self.tx.send(event).await;
    }

    pub async fn log(&self, message: impl Into<String>) {
        self.emit(MigrationEvent::Log {
            message: message.into(),
        })
        .await;
    }

    pub async fn progress(&self, inserted_total: u64, source_total: u64) {
        self.emit(MigrationEvent::Progress {
            inserted_total,
            source_total,
        })
        .await;
    }

    pub async fn error(&self, row_index: u64, message: impl Into<String>) {
        self.emit(MigrationEvent::Error {
            row_index,
            message: message.into(),
        })
        .await;
    }

    pub async fn done(&self, inserted_total: u64, source_total: u64) {
        self.emit(MigrationEvent::Done {
            inserted_total,
            source_total,
        })
        .await;
    }
}
