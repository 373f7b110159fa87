//! The per-tab resource graph: the authoritative, in-memory collection of
//! discovered resources. Single-writer: the owning service serializes
//! writes; readers get snapshots.

use std::collections::HashMap;

use mediasniff_common::{urlnorm, ResourceRecord, ResourceStats, TabId};
use tracing::debug;

#[derive(Default)]
struct TabStore {
    /// Insertion order preserved for deterministic tie-breaks.
    records: Vec<ResourceRecord>,
    by_url: HashMap<String, usize>,
}

#[derive(Default)]
pub struct ResourceGraph {
    tabs: HashMap<TabId, TabStore>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or merge. Returns true only for a fresh insert; a second
    /// write with an identical URL merges into the existing record.
    pub fn add(&mut self, tab_id: &str, record: ResourceRecord) -> bool {
        let tab = self.tabs.entry(tab_id.to_string()).or_default();
        match tab.by_url.get(&record.url) {
            Some(&idx) => {
                tab.records[idx].merge_from(&record);
                false
            }
            None => {
                tab.by_url.insert(record.url.clone(), tab.records.len());
                tab.records.push(record);
                true
            }
        }
    }

    /// Add a batch; returns how many were fresh inserts.
    pub fn add_many(&mut self, tab_id: &str, records: Vec<ResourceRecord>) -> usize {
        let mut added = 0;
        for record in records {
            if self.add(tab_id, record) {
                added += 1;
            }
        }
        debug!(tab_id, added, "batch add complete");
        added
    }

    /// Snapshot of a tab's records, sorted by score (descending) with
    /// older-first tie-breaks. Unanalyzed records sort as score 0.
    pub fn get(&self, tab_id: &str) -> Vec<ResourceRecord> {
        let mut records = match self.tabs.get(tab_id) {
            Some(tab) => tab.records.clone(),
            None => return Vec::new(),
        };
        records.sort_by(|a, b| {
            b.score
                .unwrap_or(0)
                .cmp(&a.score.unwrap_or(0))
                .then(a.timestamp.cmp(&b.timestamp))
        });
        records
    }

    /// Number of records in a tab's graph without cloning.
    pub fn len(&self, tab_id: &str) -> usize {
        self.tabs.get(tab_id).map_or(0, |t| t.records.len())
    }

    pub fn is_empty(&self, tab_id: &str) -> bool {
        self.len(tab_id) == 0
    }

    /// One record by exact URL.
    pub fn find(&self, tab_id: &str, url: &str) -> Option<&ResourceRecord> {
        let tab = self.tabs.get(tab_id)?;
        tab.by_url.get(url).map(|&idx| &tab.records[idx])
    }

    pub fn get_stats(&self, tab_id: &str) -> ResourceStats {
        let mut stats = ResourceStats::default();
        let Some(tab) = self.tabs.get(tab_id) else {
            return stats;
        };
        stats.total = tab.records.len();
        for record in &tab.records {
            *stats
                .by_type
                .entry(record.resource_type.to_string())
                .or_insert(0) += 1;
            *stats
                .by_source
                .entry(record.source.to_string())
                .or_insert(0) += 1;
            *stats
                .by_quality
                .entry(record.quality.to_string())
                .or_insert(0) += 1;
        }
        stats
    }

    /// Records related to `url`: same URL fingerprint (cosmetic variants)
    /// or an explicit `similar_to` back-link. The record itself is
    /// excluded.
    pub fn get_similar(&self, tab_id: &str, url: &str) -> Vec<ResourceRecord> {
        let Some(tab) = self.tabs.get(tab_id) else {
            return Vec::new();
        };
        let target_fp = urlnorm::url_fingerprint(url);
        tab.records
            .iter()
            .filter(|r| r.url != url)
            .filter(|r| {
                r.similar_to.as_deref() == Some(url)
                    || urlnorm::url_fingerprint(&r.url) == target_fp
            })
            .cloned()
            .collect()
    }

    /// Drop a tab's collection entirely. Returns how many records it held.
    pub fn clear(&mut self, tab_id: &str) -> usize {
        let removed = self.tabs.remove(tab_id).map_or(0, |t| t.records.len());
        debug!(tab_id, removed, "tab graph cleared");
        removed
    }

    /// Tabs with at least one record.
    pub fn tab_ids(&self) -> Vec<TabId> {
        self.tabs.keys().cloned().collect()
    }
}
