//! Structured events emitted by the core. The core emits; external
//! subsystems (log viewers, dashboards) subscribe and render. Rendering is
//! out of scope here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::{DownloadState, ResourceSource, ResourceType, TabId};

/// One structured observation from the processing core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SnifferEvent {
    ResourceAdded {
        tab_id: TabId,
        url: String,
        resource_type: ResourceType,
        source: ResourceSource,
    },
    DetectionComplete {
        tab_id: TabId,
        extracted: usize,
        added: usize,
    },
    AnalysisComplete {
        url: String,
        score: u32,
        variants: usize,
    },
    DeduplicationComplete {
        input: usize,
        unique: usize,
        duplicates: usize,
        similars: usize,
    },
    DownloadQueued {
        download_id: Uuid,
        url: String,
        priority: f64,
    },
    DownloadStateChanged {
        download_id: Uuid,
        from: DownloadState,
        to: DownloadState,
    },
    DownloadProgress {
        download_id: Uuid,
        bytes_received: u64,
        total_bytes: Option<u64>,
    },
    SpeedSample {
        bytes_per_second: f64,
    },
    StorageError {
        key: String,
        error: String,
    },
}

/// A timestamped event as seen by subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmittedEvent {
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub event: SnifferEvent,
}

/// Broadcast fan-out for core events. Slow subscribers lose old events
/// rather than blocking the core (broadcast semantics).
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EmittedEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Emit an event to all subscribers and to the tracing layer.
    pub fn emit(&self, event: SnifferEvent) {
        match &event {
            SnifferEvent::StorageError { key, error } => {
                tracing::error!(key, error, "storage error")
            }
            SnifferEvent::DownloadStateChanged { download_id, from, to } => {
                tracing::info!(%download_id, %from, %to, "download state change")
            }
            SnifferEvent::DownloadProgress { .. } | SnifferEvent::SpeedSample { .. } => {
                tracing::trace!(?event, "core event")
            }
            _ => tracing::debug!(?event, "core event"),
        }
        let _ = self.tx.send(EmittedEvent {
            ts: Utc::now(),
            event,
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EmittedEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
