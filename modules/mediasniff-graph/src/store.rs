//! Opaque key/value persistence. The core treats stored values as JSON
//! blobs; schema belongs to the callers. Storage failures are surfaced as
//! `SniffError::Storage` and must never take the in-memory state down
//! with them.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use mediasniff_common::SniffError;
use tokio::sync::Mutex;
use tracing::warn;

/// Well-known persisted state keys.
pub mod keys {
    pub const OPTIONS: &str = "resource_sniffer_options";
    pub const DOWNLOAD_HISTORY: &str = "resource_sniffer_download_history";
    pub const SITE_CONFIGS: &str = "resource_sniffer_site_configs";
    pub const NETWORK_SPEED_HISTORY: &str = "networkSpeedHistory";
    pub const RESUMABLE_DOWNLOADS: &str = "resumableDownloads";

    /// Per-tab resource cache key.
    pub fn resource_cache(tab_id: &str) -> String {
        format!("resource_cache_{tab_id}")
    }
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, SniffError>;
    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), SniffError>;
    async fn remove(&self, key: &str) -> Result<(), SniffError>;
    async fn clear(&self) -> Result<(), SniffError>;
}

// ---------------------------------------------------------------------------
// MemoryStore: tests and ephemeral sessions
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, SniffError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), SniffError> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), SniffError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), SniffError> {
        self.entries.lock().await.clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JsonFileStore: single-file persistence for the service binary
// ---------------------------------------------------------------------------

/// Whole-document JSON file store. Reads hit an in-memory map; every write
/// rewrites the file. Suits the small blobs this system persists (options,
/// histories, resumable entries).
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, serde_json::Value>>,
}

impl JsonFileStore {
    /// Open (or create) the backing file and load its current contents. A
    /// corrupt file is treated as empty rather than fatal.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, SniffError> {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<HashMap<String, serde_json::Value>>(&bytes)
            {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "store file corrupt, starting empty");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(SniffError::Storage(format!(
                    "cannot read {}: {e}",
                    path.display()
                )))
            }
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    async fn persist(
        &self,
        entries: &HashMap<String, serde_json::Value>,
    ) -> Result<(), SniffError> {
        let body = serde_json::to_vec_pretty(entries)
            .map_err(|e| SniffError::Storage(format!("serialize store: {e}")))?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SniffError::Storage(format!("create store dir: {e}")))?;
        }
        tokio::fs::write(&self.path, body)
            .await
            .map_err(|e| SniffError::Storage(format!("write {}: {e}", self.path.display())))
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, SniffError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), SniffError> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), value);
        self.persist(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), SniffError> {
        let mut entries = self.entries.lock().await;
        entries.remove(key);
        self.persist(&entries).await
    }

    async fn clear(&self) -> Result<(), SniffError> {
        let mut entries = self.entries.lock().await;
        entries.clear();
        self.persist(&entries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryStore::new();
        assert!(store.get("k").await.unwrap().is_none());
        store.set("k", serde_json::json!({"a": 1})).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().unwrap()["a"], 1);
        store.remove("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_clear_drops_everything() {
        let store = MemoryStore::new();
        store.set("a", serde_json::json!(1)).await.unwrap();
        store.set("b", serde_json::json!(2)).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
        assert!(store.get("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = JsonFileStore::open(&path).await.unwrap();
        store
            .set(keys::OPTIONS, serde_json::json!({"max_concurrent_downloads": 4}))
            .await
            .unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path).await.unwrap();
        let value = reopened.get(keys::OPTIONS).await.unwrap().unwrap();
        assert_eq!(value["max_concurrent_downloads"], 4);
    }

    #[tokio::test]
    async fn file_store_tolerates_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let store = JsonFileStore::open(&path).await.unwrap();
        assert!(store.get("anything").await.unwrap().is_none());
    }

    #[test]
    fn per_tab_cache_keys() {
        assert_eq!(keys::resource_cache("42"), "resource_cache_42");
    }
}
