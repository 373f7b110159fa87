//! The analyzer proper: banding, scoring, fingerprinting, metadata, and
//! variant synthesis for one record at a time. Pure per record, so it can
//! run on any worker without coordination.

use std::sync::Arc;

use mediasniff_common::{urlnorm, ResourceRecord, SharedCache};
use serde::{Deserialize, Serialize};

use crate::{quality, related, score, variants};

/// Analyzer output: the enriched record plus advisory metadata that does
/// not live on the record itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub record: ResourceRecord,
    /// Candidate URLs for higher-resolution versions (images only).
    pub possible_high_res: Vec<String>,
    /// Synthesised variant records, ready for graph insertion after
    /// dedup against existing entries.
    pub variants: Vec<ResourceRecord>,
    /// Informational regex templates for related resources. Never
    /// executed by the core.
    pub related_patterns: Vec<String>,
}

pub struct Analyzer {
    /// Memoizes URL fingerprints; analysis re-runs are common when tabs
    /// refresh and the hash is recomputed per record otherwise.
    fingerprint_cache: Arc<SharedCache<String, String>>,
}

impl Analyzer {
    pub fn new(fingerprint_cache: Arc<SharedCache<String, String>>) -> Self {
        Self { fingerprint_cache }
    }

    /// Enrich a record: quality band, component scores, combined score,
    /// fingerprint, high-res candidates, variants, related patterns.
    pub fn analyze(&self, mut record: ResourceRecord) -> Analysis {
        record.quality = quality::quality_band(&record);

        let scores = score::score(&record);
        record.score_details = score::breakdown(&record, &scores);
        record.score = Some(scores.overall);

        if record.fingerprint.is_none() {
            // The URL fingerprint is the cacheable half; dimensions and
            // size make the full fingerprint record-specific.
            let _memoized = self
                .fingerprint_cache
                .get_or_insert_with(record.url.clone(), || urlnorm::url_fingerprint(&record.url));
            record.fingerprint = Some(urlnorm::resource_fingerprint(&record));
        }

        let possible_high_res = variants::high_res_candidates(&record.url);
        let variant_list = variants::variant_records(&record);
        let related_patterns = related::related_patterns(&record);

        Analysis {
            record,
            possible_high_res,
            variants: variant_list,
            related_patterns,
        }
    }

    pub fn cache_stats(&self) -> mediasniff_common::CacheStats {
        self.fingerprint_cache.stats()
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(Arc::new(SharedCache::new(4096)))
    }
}
