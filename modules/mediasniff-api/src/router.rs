//! The inbound message surface. Every request is a JSON document with an
//! `action` discriminator; every response is a `{success, error?, ...}`
//! envelope. Errors are caught here, at the boundary, and never propagate
//! past it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use mediasniff_analyze::{Analyzer, WorkerPool};
use mediasniff_common::{
    urlnorm, EventBus, ResourceRecord, ResourceSource, SiteConfig, SniffError, SnifferConfig,
    SnifferEvent,
};
use mediasniff_detect::{DetectionPipeline, ExtractionContext};
use mediasniff_graph::{keys, FingerprintCache, KeyValueStore, ResourceGraph};
use mediasniff_net::scheduler::{DownloadOptions, DownloadScheduler};
use mediasniff_net::{AdapterRegistry, SpeedEstimator};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ApiDownloadOptions {
    pub tab: Option<String>,
    pub target_dir: Option<String>,
}

impl ApiDownloadOptions {
    fn into_options(self) -> DownloadOptions {
        DownloadOptions {
            tab_id: self.tab,
            target_dir: self.target_dir.map(PathBuf::from),
            index: 0,
        }
    }
}

/// All recognized inbound actions.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
enum Request {
    AddResource {
        tab: String,
        record: ResourceRecord,
    },
    AddDomResources {
        tab: String,
        records: Vec<ResourceRecord>,
    },
    AddPredictedResources {
        tab: String,
        records: Vec<ResourceRecord>,
    },
    GetResources {
        tab: String,
    },
    ClearResources {
        tab: String,
    },
    AnalyzeResource {
        record: ResourceRecord,
    },
    ProbeResource {
        url: String,
    },
    PredictResources {
        tab: String,
        url: String,
        html: String,
    },
    DetectResources {
        tab: String,
        url: String,
        html: String,
        #[serde(default)]
        responses: Vec<mediasniff_common::ResponseMeta>,
    },
    GetSimilarResources {
        tab: String,
        url: String,
    },
    GetResourceStats {
        tab: String,
    },
    StreamingResource {
        tab: String,
        record: ResourceRecord,
    },
    DownloadResource {
        record: ResourceRecord,
        #[serde(default)]
        options: ApiDownloadOptions,
    },
    BatchDownloadResources {
        records: Vec<ResourceRecord>,
        #[serde(default)]
        options: ApiDownloadOptions,
    },
    GetDownloadQueue {},
    GetDownloadHistory {},
    CancelDownload {
        download_id: Uuid,
    },
    PauseDownload {
        download_id: Uuid,
    },
    ResumeDownload {
        download_id: Uuid,
    },
    UpdateDownloadSettings {
        settings: Value,
    },
    GetNetworkAnalysis {},
}

/// The wired-together core: graph, workers, scheduler, estimator, stores,
/// events. Single-writer resources sit behind locks owned here; nothing in
/// the system is a global.
pub struct CoreService {
    graph: RwLock<ResourceGraph>,
    /// Cross-batch fingerprint representatives, keyed `{tab}:{fingerprint}`.
    /// Dedup alone only sees one batch; this keeps later batches from
    /// re-inserting a fingerprint the tab already represents.
    fingerprints: RwLock<FingerprintCache>,
    workers: WorkerPool,
    registry: Arc<AdapterRegistry>,
    scheduler: Arc<DownloadScheduler>,
    estimator: Arc<std::sync::Mutex<SpeedEstimator>>,
    store: Arc<dyn KeyValueStore>,
    config: RwLock<SnifferConfig>,
    site_configs: RwLock<HashMap<String, SiteConfig>>,
    events: EventBus,
    analyzer: Arc<Analyzer>,
}

impl CoreService {
    pub fn new(
        registry: Arc<AdapterRegistry>,
        scheduler: Arc<DownloadScheduler>,
        estimator: Arc<std::sync::Mutex<SpeedEstimator>>,
        store: Arc<dyn KeyValueStore>,
        events: EventBus,
        config: SnifferConfig,
        worker_count: usize,
    ) -> Self {
        let analyzer = Arc::new(Analyzer::default());
        let pipeline = Arc::new(DetectionPipeline::with_default_extractors());
        let workers = WorkerPool::new(worker_count, Arc::clone(&analyzer), pipeline);
        Self {
            graph: RwLock::new(ResourceGraph::new()),
            fingerprints: RwLock::new(FingerprintCache::new()),
            workers,
            registry,
            scheduler,
            estimator,
            store,
            config: RwLock::new(config),
            site_configs: RwLock::new(HashMap::new()),
            events,
            analyzer,
        }
    }

    /// Pull persisted options and site configs into memory. Storage
    /// trouble logs and continues on defaults.
    pub async fn load_persisted(&self) {
        match self.store.get(keys::OPTIONS).await {
            Ok(Some(value)) => match SnifferConfig::from_json(&value) {
                Ok(config) => {
                    self.scheduler.update_config(config.clone()).await;
                    *self.config.write().await = config;
                    info!("loaded persisted options");
                }
                Err(e) => error!(error = %e, "persisted options invalid, using defaults"),
            },
            Ok(None) => {}
            Err(e) => error!(error = %e, "could not read persisted options"),
        }

        match self.store.get(keys::SITE_CONFIGS).await {
            Ok(Some(value)) => {
                match serde_json::from_value::<HashMap<String, SiteConfig>>(value) {
                    Ok(map) => *self.site_configs.write().await = map,
                    Err(e) => error!(error = %e, "persisted site configs invalid"),
                }
            }
            Ok(None) => {}
            Err(e) => error!(error = %e, "could not read persisted site configs"),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Dispatch one inbound message and produce its response envelope.
    pub async fn handle(&self, message: Value) -> Value {
        let request: Request = match serde_json::from_value(message) {
            Ok(r) => r,
            Err(e) => {
                let text = e.to_string();
                // Distinguish "we don't know this action" from "we know it
                // but the payload is malformed".
                let error = if text.contains("unknown variant") || text.contains("missing field `action`") {
                    "unknown action".to_string()
                } else {
                    format!("invalid payload: {text}")
                };
                return json!({ "success": false, "error": error });
            }
        };

        match self.dispatch(request).await {
            Ok(body) => body,
            Err(e) => {
                if e.is_cancellation() {
                    info!("request ended in cancellation");
                } else {
                    error!(error = %e, "request failed");
                }
                json!({ "success": false, "error": e.to_string() })
            }
        }
    }

    async fn dispatch(&self, request: Request) -> Result<Value, SniffError> {
        match request {
            Request::AddResource { tab, record } => {
                require_tab(&tab)?;
                let added = self.ingest(&tab, vec![record]).await?;
                Ok(json!({ "success": true, "added": added > 0 }))
            }
            Request::AddDomResources { tab, records } => {
                require_tab(&tab)?;
                let added = self.ingest(&tab, records).await?;
                Ok(json!({ "success": true, "added_count": added }))
            }
            Request::AddPredictedResources { tab, records } => {
                require_tab(&tab)?;
                let records = records.into_iter().map(normalize_predicted).collect();
                let added = self.ingest(&tab, records).await?;
                Ok(json!({ "success": true, "added_count": added }))
            }
            Request::StreamingResource { tab, record } => {
                require_tab(&tab)?;
                let mut record = record;
                record.is_stream = true;
                if record.stream_type.is_none() {
                    record.stream_type =
                        urlnorm::detect_stream(&record.url, record.content_type.as_deref());
                }
                let added = self.ingest(&tab, vec![record]).await?;
                Ok(json!({ "success": true, "added": added > 0 }))
            }
            Request::GetResources { tab } => {
                require_tab(&tab)?;
                let graph = self.graph.read().await;
                let records = graph.get(&tab);
                let stats = graph.get_stats(&tab);
                Ok(json!({
                    "success": true,
                    "count": records.len(),
                    "records": records,
                    "stats": stats,
                }))
            }
            Request::ClearResources { tab } => {
                require_tab(&tab)?;
                let removed = self.graph.write().await.clear(&tab);
                let cancelled = self.scheduler.cancel_tab(&tab).await;
                if let Err(e) = self.store.remove(&keys::resource_cache(&tab)).await {
                    self.events.emit(SnifferEvent::StorageError {
                        key: keys::resource_cache(&tab),
                        error: e.to_string(),
                    });
                }
                info!(tab, removed, cancelled, "tab cleared");
                Ok(json!({ "success": true }))
            }
            Request::AnalyzeResource { record } => {
                let analysis = self.workers.analyze(record).await?;
                self.events.emit(SnifferEvent::AnalysisComplete {
                    url: analysis.record.url.clone(),
                    score: analysis.record.score.unwrap_or(0),
                    variants: analysis.variants.len(),
                });
                Ok(json!({
                    "success": true,
                    "analysis": {
                        "record": analysis.record,
                        "possible_high_res": analysis.possible_high_res,
                        "variants": analysis.variants,
                        "related_patterns": analysis.related_patterns,
                    }
                }))
            }
            Request::ProbeResource { url } => {
                let probe = self.registry.probe(&url).await?;
                Ok(json!({ "success": true, "probe": probe }))
            }
            Request::PredictResources { tab, url, html } => {
                require_tab(&tab)?;
                let config = self.effective_config(&url).await;
                let records = self.workers.predict(url, html, config).await?;
                let added = self.ingest(&tab, records.clone()).await?;
                Ok(json!({
                    "success": true,
                    "records": records,
                    "added_count": added,
                }))
            }
            Request::DetectResources {
                tab,
                url,
                html,
                responses,
            } => {
                require_tab(&tab)?;
                let config = self.effective_config(&url).await;
                let ctx = ExtractionContext::for_page(url, html).with_responses(responses);
                let records = self.workers.detect(ctx, config).await?;
                let extracted = records.len();
                let added = self.ingest(&tab, records).await?;
                self.events.emit(SnifferEvent::DetectionComplete {
                    tab_id: tab,
                    extracted,
                    added,
                });
                Ok(json!({ "success": true, "added_count": added }))
            }
            Request::GetSimilarResources { tab, url } => {
                require_tab(&tab)?;
                let records = self.graph.read().await.get_similar(&tab, &url);
                Ok(json!({ "success": true, "records": records }))
            }
            Request::GetResourceStats { tab } => {
                require_tab(&tab)?;
                let stats = self.graph.read().await.get_stats(&tab);
                Ok(json!({
                    "success": true,
                    "stats": stats,
                    "cache": self.analyzer.cache_stats(),
                }))
            }
            Request::DownloadResource { record, options } => {
                let download_id = self
                    .scheduler
                    .enqueue(record, options.into_options())
                    .await?;
                Ok(json!({ "success": true, "download_id": download_id }))
            }
            Request::BatchDownloadResources { records, options } => {
                let (batch_id, ids) = self
                    .scheduler
                    .enqueue_batch(records, options.into_options())
                    .await?;
                Ok(json!({
                    "success": true,
                    "batch_id": batch_id,
                    "download_ids": ids,
                }))
            }
            Request::GetDownloadQueue {} => {
                let items = self.scheduler.queue_snapshot().await;
                Ok(json!({ "success": true, "items": items }))
            }
            Request::GetDownloadHistory {} => {
                let items = self.scheduler.history().await;
                Ok(json!({ "success": true, "items": items }))
            }
            Request::CancelDownload { download_id } => {
                self.scheduler.cancel(download_id).await?;
                Ok(json!({ "success": true }))
            }
            Request::PauseDownload { download_id } => {
                self.scheduler.pause(download_id).await?;
                Ok(json!({ "success": true }))
            }
            Request::ResumeDownload { download_id } => {
                let resumed_id = self.scheduler.resume(download_id).await?;
                Ok(json!({ "success": true, "download_id": resumed_id }))
            }
            Request::UpdateDownloadSettings { settings } => {
                let config = SnifferConfig::from_json(&settings)?;
                self.scheduler.update_config(config.clone()).await;
                *self.config.write().await = config.clone();
                if let Err(e) = self
                    .store
                    .set(keys::OPTIONS, serde_json::to_value(&config).unwrap_or_default())
                    .await
                {
                    self.events.emit(SnifferEvent::StorageError {
                        key: keys::OPTIONS.to_string(),
                        error: e.to_string(),
                    });
                }
                Ok(json!({ "success": true }))
            }
            Request::GetNetworkAnalysis {} => {
                let (current, analysis) = {
                    let estimator = self.estimator.lock().unwrap_or_else(|p| p.into_inner());
                    (estimator.current(), estimator.analysis())
                };
                Ok(json!({
                    "success": true,
                    "current_bps": current,
                    "analysis": analysis,
                }))
            }
        }
    }

    /// Shared ingest path: analyze, deduplicate, then write survivors and
    /// their similarity-demoted siblings into the tab graph. Synthesised
    /// variants join only when the graph does not already know their URL.
    async fn ingest(&self, tab: &str, records: Vec<ResourceRecord>) -> Result<usize, SniffError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut enriched = Vec::with_capacity(records.len());
        let mut variants = Vec::new();
        for record in records {
            match self.workers.analyze(record.clone()).await {
                Ok(analysis) => {
                    variants.extend(analysis.variants);
                    enriched.push(analysis.record);
                }
                // A worker failure drops the enrichment, not the record.
                Err(e) => {
                    error!(error = %e, "analysis failed; keeping record unenriched");
                    enriched.push(record);
                }
            }
        }

        let result = self.workers.deduplicate(enriched).await?;
        self.events.emit(SnifferEvent::DeduplicationComplete {
            input: result.unique.len() + result.duplicates.len() + result.similars.len(),
            unique: result.unique.len(),
            duplicates: result.duplicates.len(),
            similars: result.similars.len(),
        });

        let mut graph = self.graph.write().await;
        let mut fingerprints = self.fingerprints.write().await;
        fingerprints.sweep();
        let mut added = 0;
        let snapshot;
        for mut record in result.unique.into_iter().chain(result.similars) {
            // Cross-batch guard: if this tab already represents the
            // fingerprint under a different URL, merge there instead of
            // inserting a second representative.
            if let Some(fp) = record.fingerprint.clone() {
                let key = format!("{tab}:{fp}");
                let representative = fingerprints
                    .get(&key)
                    .map(|r| r.url.clone())
                    .filter(|url| *url != record.url && graph.find(tab, url).is_some());
                match representative {
                    Some(rep_url) => {
                        record.duplicate_of = Some(rep_url.clone());
                        if let Some(existing) = graph.find(tab, &rep_url).cloned() {
                            let mut merged = existing;
                            merged.merge_from(&record);
                            graph.add(tab, merged);
                        }
                        continue;
                    }
                    None => fingerprints.insert(key, record.clone()),
                }
            }
            if graph.add(tab, record.clone()) {
                added += 1;
                self.events.emit(SnifferEvent::ResourceAdded {
                    tab_id: tab.to_string(),
                    url: record.url,
                    resource_type: record.resource_type,
                    source: record.source,
                });
            }
        }
        for variant in variants {
            if graph.find(tab, &variant.url).is_none() && graph.add(tab, variant) {
                added += 1;
            }
        }
        snapshot = graph.get(tab);
        drop(fingerprints);
        drop(graph);

        // Per-tab cache persistence so a restarted service can repopulate
        // without re-scanning every open page.
        if let Ok(value) = serde_json::to_value(&snapshot) {
            if let Err(e) = self.store.set(&keys::resource_cache(tab), value).await {
                self.events.emit(SnifferEvent::StorageError {
                    key: keys::resource_cache(tab),
                    error: e.to_string(),
                });
            }
        }
        Ok(added)
    }

    /// Global config with the page host's site overlay applied.
    async fn effective_config(&self, url: &str) -> SnifferConfig {
        let base = self.config.read().await.clone();
        let host = url
            .split("://")
            .nth(1)
            .unwrap_or(url)
            .split('/')
            .next()
            .unwrap_or("")
            .to_lowercase();
        let site_configs = self.site_configs.read().await;
        match site_configs.get(&host) {
            Some(overlay) => overlay.overlay(&base),
            None => base,
        }
    }
}

fn require_tab(tab: &str) -> Result<(), SniffError> {
    if tab.trim().is_empty() {
        return Err(SniffError::InvalidInput("missing tab id".to_string()));
    }
    Ok(())
}

/// Predicted records must carry predicted provenance and a confidence in
/// [0, 1], whatever the caller sent.
fn normalize_predicted(mut record: ResourceRecord) -> ResourceRecord {
    record.source = ResourceSource::Predicted;
    record.is_predicted = true;
    record.confidence = Some(record.confidence.unwrap_or(0.5).clamp(0.0, 1.0));
    record
}
