//! Fingerprint -> representative cache with time-based expiry. Lets the
//! dedup path short-circuit "have we seen this fingerprint recently"
//! across batches without consulting the full graph.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use mediasniff_common::ResourceRecord;

#[derive(Debug, Clone)]
pub struct FingerprintEntry {
    pub record: ResourceRecord,
    pub inserted_at: DateTime<Utc>,
}

pub struct FingerprintCache {
    entries: HashMap<String, FingerprintEntry>,
    ttl: Duration,
}

impl FingerprintCache {
    /// Default expiry: one hour.
    pub fn new() -> Self {
        Self::with_ttl(Duration::hours(1))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    /// The live representative for a fingerprint, if any. Expired entries
    /// read as absent (and are removed on the next sweep).
    pub fn get(&self, fingerprint: &str) -> Option<&ResourceRecord> {
        let entry = self.entries.get(fingerprint)?;
        if Utc::now() - entry.inserted_at > self.ttl {
            return None;
        }
        Some(&entry.record)
    }

    pub fn insert(&mut self, fingerprint: impl Into<String>, record: ResourceRecord) {
        self.entries.insert(
            fingerprint.into(),
            FingerprintEntry {
                record,
                inserted_at: Utc::now(),
            },
        );
    }

    /// Drop expired entries; returns how many were removed.
    pub fn sweep(&mut self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now - entry.inserted_at <= self.ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for FingerprintCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediasniff_common::{ResourceSource, ResourceType};

    fn record(url: &str) -> ResourceRecord {
        ResourceRecord::new(url, ResourceType::Image, ResourceSource::Dom)
    }

    #[test]
    fn insert_then_get() {
        let mut cache = FingerprintCache::new();
        cache.insert("fp-1", record("https://x.com/a.jpg"));
        assert_eq!(cache.get("fp-1").unwrap().url, "https://x.com/a.jpg");
        assert!(cache.get("fp-2").is_none());
    }

    #[test]
    fn expired_entries_read_as_absent() {
        let mut cache = FingerprintCache::with_ttl(Duration::zero());
        cache.insert("fp-1", record("https://x.com/a.jpg"));
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(cache.get("fp-1").is_none());
        // Still physically present until swept.
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.sweep(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn sweep_keeps_live_entries() {
        let mut cache = FingerprintCache::new();
        cache.insert("fp-1", record("https://x.com/a.jpg"));
        assert_eq!(cache.sweep(), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn reinsert_refreshes_entry() {
        let mut cache = FingerprintCache::new();
        cache.insert("fp-1", record("https://x.com/a.jpg"));
        cache.insert("fp-1", record("https://x.com/b.jpg"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("fp-1").unwrap().url, "https://x.com/b.jpg");
    }
}
