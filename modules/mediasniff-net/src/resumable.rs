//! Resumable-download store: enough persisted state per interrupted
//! download to issue a Range continuation later. Capped; the oldest entry
//! gives way.

use std::collections::VecDeque;
use std::sync::Arc;

use mediasniff_common::ResumableEntry;
use mediasniff_graph::{keys, KeyValueStore};
use tokio::sync::Mutex;
use tracing::error;

/// Entry cap; oldest dropped first.
pub const MAX_ENTRIES: usize = 100;

pub struct ResumableStore {
    entries: Mutex<VecDeque<ResumableEntry>>,
    store: Arc<dyn KeyValueStore>,
}

impl ResumableStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            store,
        }
    }

    /// Load persisted entries. Storage trouble degrades to an empty store.
    pub async fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let entries = match store.get(keys::RESUMABLE_DOWNLOADS).await {
            Ok(Some(value)) => serde_json::from_value::<VecDeque<ResumableEntry>>(value)
                .unwrap_or_default(),
            Ok(None) => VecDeque::new(),
            Err(e) => {
                error!(error = %e, "failed to load resumable store");
                VecDeque::new()
            }
        };
        Self {
            entries: Mutex::new(entries),
            store,
        }
    }

    pub async fn upsert(&self, entry: ResumableEntry) {
        let mut entries = self.entries.lock().await;
        entries.retain(|e| e.url != entry.url);
        if entries.len() == MAX_ENTRIES {
            entries.pop_front();
        }
        entries.push_back(entry);
        self.persist(&entries).await;
    }

    pub async fn get(&self, url: &str) -> Option<ResumableEntry> {
        self.entries
            .lock()
            .await
            .iter()
            .find(|e| e.url == url)
            .cloned()
    }

    pub async fn remove(&self, url: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|e| e.url != url);
        let removed = entries.len() != before;
        if removed {
            self.persist(&entries).await;
        }
        removed
    }

    pub async fn all(&self) -> Vec<ResumableEntry> {
        self.entries.lock().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Persistence is best-effort: a failing store loses durability, not
    /// the in-memory entries.
    async fn persist(&self, entries: &VecDeque<ResumableEntry>) {
        let value = match serde_json::to_value(entries) {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "failed to serialize resumable entries");
                return;
            }
        };
        if let Err(e) = self.store.set(keys::RESUMABLE_DOWNLOADS, value).await {
            error!(error = %e, "failed to persist resumable entries");
        }
    }
}
