//! Deduplication: fingerprint-exact merging followed by similarity
//! clustering, with a best-representative-wins policy throughout.

use std::collections::HashMap;

use mediasniff_common::{urlnorm, ResourceRecord, ResourceType};
use tracing::debug;

use crate::similarity;

/// Pairs at or above this similarity are clustered.
pub const SIMILARITY_THRESHOLD: f64 = 0.85;

#[derive(Debug, Clone, Default)]
pub struct DedupResult {
    /// Exactly one representative per equivalence class.
    pub unique: Vec<ResourceRecord>,
    /// Fingerprint-identical records, back-linked via `duplicate_of`.
    pub duplicates: Vec<ResourceRecord>,
    /// Similarity-clustered records, back-linked via `similar_to`.
    pub similars: Vec<ResourceRecord>,
}

/// Deduplicate a batch. Idempotent: running the output back through
/// produces the same partition.
pub fn dedup(records: Vec<ResourceRecord>) -> DedupResult {
    let input = records.len();
    let mut result = DedupResult::default();

    // Unparseable URLs are never merged; pass them straight through.
    let (parseable, opaque): (Vec<_>, Vec<_>) = records
        .into_iter()
        .partition(|r| url::Url::parse(&r.url).is_ok());
    result.unique.extend(opaque);

    // Partition by type: a thumbnail and a clip never collapse together.
    let mut by_type: HashMap<ResourceType, Vec<ResourceRecord>> = HashMap::new();
    for record in parseable {
        by_type.entry(record.resource_type).or_default().push(record);
    }

    let mut types: Vec<ResourceType> = by_type.keys().copied().collect();
    types.sort();
    for resource_type in types {
        let partition = by_type.remove(&resource_type).unwrap_or_default();
        let survivors = collapse_fingerprints(partition, &mut result.duplicates);
        let survivors = collapse_similars(survivors, &mut result.similars);
        result.unique.extend(survivors);
    }

    debug!(
        input,
        unique = result.unique.len(),
        duplicates = result.duplicates.len(),
        similars = result.similars.len(),
        "dedup complete"
    );
    result
}

/// Scan in order, hashing by fingerprint; on collision the higher
/// quality-weight record stays and the other is demoted.
fn collapse_fingerprints(
    records: Vec<ResourceRecord>,
    duplicates: &mut Vec<ResourceRecord>,
) -> Vec<ResourceRecord> {
    let mut by_fingerprint: HashMap<String, usize> = HashMap::new();
    let mut survivors: Vec<ResourceRecord> = Vec::new();

    for mut record in records {
        if record.fingerprint.is_none() {
            record.fingerprint = Some(urlnorm::resource_fingerprint(&record));
        }
        let fp = record.fingerprint.clone().unwrap_or_default();

        match by_fingerprint.get(&fp) {
            None => {
                by_fingerprint.insert(fp, survivors.len());
                survivors.push(record);
            }
            Some(&idx) => {
                if record.quality_weight() > survivors[idx].quality_weight() {
                    let mut demoted = std::mem::replace(&mut survivors[idx], record);
                    demoted.duplicate_of = Some(survivors[idx].url.clone());
                    duplicates.push(demoted);
                } else {
                    record.duplicate_of = Some(survivors[idx].url.clone());
                    duplicates.push(record);
                }
            }
        }
    }

    survivors
}

/// Secondary-group by (hostname, path pattern), cluster pairs above the
/// similarity threshold, and keep one representative per cluster.
fn collapse_similars(
    records: Vec<ResourceRecord>,
    similars: &mut Vec<ResourceRecord>,
) -> Vec<ResourceRecord> {
    let mut groups: HashMap<(String, String), Vec<ResourceRecord>> = HashMap::new();
    let mut order: Vec<(String, String)> = Vec::new();
    for record in records {
        let key = similarity::path_pattern(&record.url);
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(record);
    }

    let mut survivors = Vec::new();
    for key in order {
        let group = groups.remove(&key).unwrap_or_default();
        cluster_group(group, similars, &mut survivors);
    }
    survivors
}

fn cluster_group(
    group: Vec<ResourceRecord>,
    similars: &mut Vec<ResourceRecord>,
    survivors: &mut Vec<ResourceRecord>,
) {
    let n = group.len();
    if n <= 1 {
        survivors.extend(group);
        return;
    }

    // Union-find over the group.
    let mut parent: Vec<usize> = (0..n).collect();
    fn find(parent: &mut Vec<usize>, i: usize) -> usize {
        if parent[i] != i {
            let root = find(parent, parent[i]);
            parent[i] = root;
        }
        parent[i]
    }

    for i in 0..n {
        for j in (i + 1)..n {
            if similarity::similarity(&group[i], &group[j]) >= SIMILARITY_THRESHOLD {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[rj] = ri;
                }
            }
        }
    }

    let mut clusters: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..n {
        let root = find(&mut parent, i);
        clusters.entry(root).or_default().push(i);
    }

    let mut cluster_roots: Vec<usize> = clusters.keys().copied().collect();
    cluster_roots.sort();
    let mut taken: Vec<Option<ResourceRecord>> = group.into_iter().map(Some).collect();
    for root in cluster_roots {
        let members = &clusters[&root];
        let best = members
            .iter()
            .copied()
            .max_by(|&a, &b| {
                let (wa, wb) = (
                    taken[a].as_ref().map_or(0.0, |r| r.quality_weight()),
                    taken[b].as_ref().map_or(0.0, |r| r.quality_weight()),
                );
                wa.partial_cmp(&wb).unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(root);

        let representative = taken[best].take().expect("member taken once");
        for &member in members {
            if member == best {
                continue;
            }
            let mut demoted = taken[member].take().expect("member taken once");
            demoted.similarity = Some(similarity::similarity(&demoted, &representative));
            demoted.similar_to = Some(representative.url.clone());
            similars.push(demoted);
        }
        survivors.push(representative);
    }
}
