//! Download scheduler: a priority queue with bounded concurrency, a
//! per-download state machine, byte-range resume, retry with exponential
//! backoff, and optional speed limiting.

use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use mediasniff_common::{
    urlnorm, DownloadRecord, DownloadState, EventBus, ResourceRecord, ResourceType,
    ResumableEntry, SniffError, SnifferConfig, SnifferEvent, TabId,
};
use mediasniff_graph::{keys, KeyValueStore};
use tokio::io::AsyncWriteExt;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapter::AdapterRegistry;
use crate::filename;
use crate::resumable::ResumableStore;
use crate::speed::SpeedEstimator;

/// Network errors are retried this many times before a download is marked
/// interrupted.
const MAX_RETRIES: u32 = 3;
/// Terminal records kept in history.
const HISTORY_CAP: usize = 200;
/// Emit a progress event after at least this many new bytes.
const PROGRESS_EVENT_BYTES: u64 = 256 * 1024;

#[derive(Debug, Clone, Default)]
pub struct DownloadOptions {
    pub tab_id: Option<TabId>,
    /// Overrides the configured default path.
    pub target_dir: Option<PathBuf>,
    /// Position within a batch; feeds the `{index}` filename placeholder.
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run,
    Pause,
    Cancel,
}

struct QueuedItem {
    priority: f64,
    seq: u64,
    id: Uuid,
}

impl PartialEq for QueuedItem {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}
impl Eq for QueuedItem {}
impl PartialOrd for QueuedItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueuedItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Max-heap on priority; FIFO (smaller seq first) among equals.
        self.priority
            .partial_cmp(&other.priority)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct State {
    queue: BinaryHeap<QueuedItem>,
    records: HashMap<Uuid, DownloadRecord>,
    options: HashMap<Uuid, DownloadOptions>,
    controls: HashMap<Uuid, watch::Sender<Command>>,
    active: HashSet<Uuid>,
    /// One live (non-terminal) download per resource fingerprint.
    fingerprints: HashMap<String, Uuid>,
    history: VecDeque<DownloadRecord>,
    seq: u64,
}

impl State {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

pub struct DownloadScheduler {
    state: Mutex<State>,
    registry: Arc<AdapterRegistry>,
    estimator: Arc<std::sync::Mutex<SpeedEstimator>>,
    resumable: Arc<ResumableStore>,
    history_store: Arc<dyn KeyValueStore>,
    events: EventBus,
    config: std::sync::RwLock<SnifferConfig>,
}

impl DownloadScheduler {
    pub fn new(
        registry: Arc<AdapterRegistry>,
        estimator: Arc<std::sync::Mutex<SpeedEstimator>>,
        resumable: Arc<ResumableStore>,
        history_store: Arc<dyn KeyValueStore>,
        events: EventBus,
        config: SnifferConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
            registry,
            estimator,
            resumable,
            history_store,
            events,
            config: std::sync::RwLock::new(config),
        })
    }

    fn config_snapshot(&self) -> SnifferConfig {
        self.config.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub async fn update_config(self: &Arc<Self>, config: SnifferConfig) {
        *self.config.write().unwrap_or_else(|p| p.into_inner()) = config;
        // A raised concurrency cap frees slots immediately.
        self.promote().await;
    }

    /// Queue a download. A second enqueue for a fingerprint with a live
    /// download is ignored and answered with the existing id.
    pub async fn enqueue(
        self: &Arc<Self>,
        resource: ResourceRecord,
        options: DownloadOptions,
    ) -> Result<Uuid, SniffError> {
        // Unsupported schemes fail at the boundary, before queueing.
        self.registry.adapter_for(&resource.url)?;

        let fingerprint = resource
            .fingerprint
            .clone()
            .unwrap_or_else(|| urlnorm::resource_fingerprint(&resource));
        let priority = self.priority_for(&resource);

        let id = {
            let mut state = self.state.lock().await;
            if let Some(&existing) = state.fingerprints.get(&fingerprint) {
                let live = state
                    .records
                    .get(&existing)
                    .is_some_and(|r| !r.state.is_terminal());
                if live {
                    return Ok(existing);
                }
            }

            let id = Uuid::new_v4();
            let now = Utc::now();
            let url = resource.url.clone();
            let record = DownloadRecord {
                download_id: id,
                resource,
                priority,
                state: DownloadState::Queued,
                bytes_received: 0,
                total_bytes: None,
                added_at: now,
                started_at: None,
                last_update: now,
                last_error: None,
                filename_on_disk: None,
                resumable_offset: None,
                tab_id: options.tab_id.clone(),
            };
            state.fingerprints.insert(fingerprint, id);
            state.records.insert(id, record);
            state.options.insert(id, options);
            let seq = state.next_seq();
            state.queue.push(QueuedItem { priority, seq, id });
            self.events.emit(SnifferEvent::DownloadQueued {
                download_id: id,
                url,
                priority,
            });
            id
        };

        self.promote().await;
        Ok(id)
    }

    /// Queue a batch under one batch id. Unsupported-scheme items are
    /// skipped rather than failing the batch.
    pub async fn enqueue_batch(
        self: &Arc<Self>,
        resources: Vec<ResourceRecord>,
        mut options: DownloadOptions,
    ) -> Result<(Uuid, Vec<Uuid>), SniffError> {
        let batch_id = Uuid::new_v4();
        let mut ids = Vec::with_capacity(resources.len());
        for (index, resource) in resources.into_iter().enumerate() {
            options.index = index;
            match self.enqueue(resource, options.clone()).await {
                Ok(id) => ids.push(id),
                Err(SniffError::AdapterUnsupported(scheme)) => {
                    warn!(scheme, "skipping batch item with unsupported scheme");
                }
                Err(e) => return Err(e),
            }
        }
        Ok((batch_id, ids))
    }

    pub async fn pause(&self, id: Uuid) -> Result<(), SniffError> {
        let mut state = self.state.lock().await;
        let current = state
            .records
            .get(&id)
            .map(|r| r.state)
            .ok_or_else(|| SniffError::InvalidInput(format!("unknown download: {id}")))?;
        match current {
            DownloadState::InProgress => {
                if let Some(control) = state.controls.get(&id) {
                    let _ = control.send(Command::Pause);
                }
                Ok(())
            }
            DownloadState::Queued => {
                if let Some(record) = state.records.get_mut(&id) {
                    Self::transition(&self.events, record, DownloadState::Paused);
                }
                Ok(())
            }
            other => Err(SniffError::InvalidInput(format!(
                "cannot pause download in state {other}"
            ))),
        }
    }

    /// Resume a paused or interrupted download. Paused downloads keep
    /// their id; an interrupted one is re-issued under a fresh id that
    /// continues at the recorded byte offset.
    pub async fn resume(self: &Arc<Self>, id: Uuid) -> Result<Uuid, SniffError> {
        let resumed_id = {
            let mut state = self.state.lock().await;
            let current = state
                .records
                .get(&id)
                .map(|r| r.state)
                .ok_or_else(|| SniffError::InvalidInput(format!("unknown download: {id}")))?;

            match current {
                DownloadState::Paused => {
                    if let Some(record) = state.records.get_mut(&id) {
                        record.resumable_offset = Some(record.bytes_received);
                        Self::transition(&self.events, record, DownloadState::Queued);
                    }
                    let priority = state.records[&id].priority;
                    let seq = state.next_seq();
                    state.queue.push(QueuedItem { priority, seq, id });
                    id
                }
                DownloadState::Interrupted => {
                    // The interrupted record's story is finished (it is in
                    // history); a fresh id carries the byte range forward.
                    let Some(old) = state.records.remove(&id) else {
                        return Err(SniffError::InvalidInput(format!("unknown download: {id}")));
                    };
                    let options = state.options.remove(&id).unwrap_or_default();
                    let fingerprint = old
                        .resource
                        .fingerprint
                        .clone()
                        .unwrap_or_else(|| urlnorm::resource_fingerprint(&old.resource));

                    let new_id = Uuid::new_v4();
                    let now = Utc::now();
                    let url = old.resource.url.clone();
                    let priority = old.priority;
                    let record = DownloadRecord {
                        download_id: new_id,
                        resource: old.resource,
                        priority,
                        state: DownloadState::Queued,
                        bytes_received: old.bytes_received,
                        total_bytes: old.total_bytes,
                        added_at: now,
                        started_at: None,
                        last_update: now,
                        last_error: None,
                        filename_on_disk: old.filename_on_disk,
                        resumable_offset: Some(old.bytes_received),
                        tab_id: old.tab_id,
                    };
                    state.fingerprints.insert(fingerprint, new_id);
                    state.records.insert(new_id, record);
                    state.options.insert(new_id, options);
                    let seq = state.next_seq();
                    state.queue.push(QueuedItem {
                        priority,
                        seq,
                        id: new_id,
                    });
                    self.events.emit(SnifferEvent::DownloadQueued {
                        download_id: new_id,
                        url,
                        priority,
                    });
                    new_id
                }
                other => {
                    return Err(SniffError::InvalidInput(format!(
                        "cannot resume download in state {other}"
                    )))
                }
            }
        };
        self.promote().await;
        Ok(resumed_id)
    }

    /// Cancel at any non-terminal state; the transition is atomic per
    /// download, and the resumable entry goes with it.
    pub async fn cancel(&self, id: Uuid) -> Result<(), SniffError> {
        let url = {
            let mut state = self.state.lock().await;
            let current = state
                .records
                .get(&id)
                .map(|r| r.state)
                .ok_or_else(|| SniffError::InvalidInput(format!("unknown download: {id}")))?;
            match current {
                DownloadState::InProgress => {
                    if let Some(control) = state.controls.get(&id) {
                        let _ = control.send(Command::Cancel);
                    }
                    // The transfer task finalizes the transition.
                    return Ok(());
                }
                DownloadState::Queued | DownloadState::Paused | DownloadState::Interrupted => {
                    if let Some(record) = state.records.get_mut(&id) {
                        Self::transition(&self.events, record, DownloadState::Cancelled);
                    }
                    let record = state.records[&id].clone();
                    let url = record.resource.url.clone();
                    Self::settle_locked(&mut state, record, true);
                    url
                }
                DownloadState::Complete | DownloadState::Cancelled => return Ok(()),
            }
        };
        self.resumable.remove(&url).await;
        self.persist_history().await;
        Ok(())
    }

    /// Tab close: cancel that tab's queued downloads; in-progress ones
    /// keep running.
    pub async fn cancel_tab(&self, tab_id: &str) -> usize {
        let ids: Vec<Uuid> = {
            let state = self.state.lock().await;
            state
                .records
                .values()
                .filter(|r| {
                    r.state == DownloadState::Queued && r.tab_id.as_deref() == Some(tab_id)
                })
                .map(|r| r.download_id)
                .collect()
        };
        let mut cancelled = 0;
        for id in &ids {
            if self.cancel(*id).await.is_ok() {
                cancelled += 1;
            }
        }
        info!(tab_id, cancelled, "tab close cancelled queued downloads");
        cancelled
    }

    /// Live queue snapshot: queued, paused, and in-progress records,
    /// highest priority first, FIFO among equals.
    pub async fn queue_snapshot(&self) -> Vec<DownloadRecord> {
        let state = self.state.lock().await;
        let mut items: Vec<DownloadRecord> = state
            .records
            .values()
            .filter(|r| {
                matches!(
                    r.state,
                    DownloadState::Queued | DownloadState::InProgress | DownloadState::Paused
                )
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            b.priority
                .partial_cmp(&a.priority)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.added_at.cmp(&b.added_at))
        });
        items
    }

    pub async fn history(&self) -> Vec<DownloadRecord> {
        let state = self.state.lock().await;
        state.history.iter().cloned().collect()
    }

    pub async fn get(&self, id: Uuid) -> Option<DownloadRecord> {
        self.state.lock().await.records.get(&id).cloned()
    }

    // --- internals ---

    fn priority_for(&self, resource: &ResourceRecord) -> f64 {
        let factor_type = match resource.resource_type {
            ResourceType::Image => 1.2,
            ResourceType::Video => 1.5,
            ResourceType::Audio => 1.3,
            ResourceType::Document => 1.0,
            ResourceType::Other => {
                if is_archive(&resource.url) {
                    0.8
                } else {
                    0.7
                }
            }
        };
        let factor_size = match resource.size_bytes {
            Some(size) if size < 1_000_000 => 1.3,
            Some(size) if size <= 10_000_000 => 1.0,
            Some(_) => 0.7,
            None => 1.0,
        };
        let factor_network = self
            .estimator
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .network_factor();
        factor_type * factor_size * factor_network
    }

    fn transition(events: &EventBus, record: &mut DownloadRecord, to: DownloadState) {
        let from = record.state;
        record.state = to;
        record.last_update = Utc::now();
        events.emit(SnifferEvent::DownloadStateChanged {
            download_id: record.download_id,
            from,
            to,
        });
    }

    /// Copy a settled record into history and release its slot. The
    /// fingerprint guard is released only for terminal outcomes; an
    /// interrupted download still owns its fingerprint so a re-enqueue is
    /// answered with the resumable id.
    fn settle_locked(state: &mut State, record: DownloadRecord, release_fingerprint: bool) {
        let id = record.download_id;
        state.active.remove(&id);
        state.controls.remove(&id);
        if release_fingerprint {
            let fingerprint = record
                .resource
                .fingerprint
                .clone()
                .unwrap_or_else(|| urlnorm::resource_fingerprint(&record.resource));
            if state.fingerprints.get(&fingerprint) == Some(&id) {
                state.fingerprints.remove(&fingerprint);
            }
        }
        if state.history.len() == HISTORY_CAP {
            state.history.pop_front();
        }
        state.history.push_back(record);
    }

    /// Start transfers while capacity remains, highest priority first.
    ///
    /// Boxed: `run_transfer` awaits this recursively after it spawns via
    /// `tokio::spawn`, and leaving this as a plain `async fn` makes the
    /// compiler's Send-auto-trait check on the spawned future self-referential
    /// (it can't prove `Send` through the cycle). Returning a boxed future
    /// gives the recursive call a concrete, already-`Send` type instead.
    fn promote(self: &Arc<Self>) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let max_concurrent = self.config_snapshot().max_concurrent_downloads as usize;
            let mut to_start = Vec::new();
            {
                let mut state = self.state.lock().await;
                while state.active.len() < max_concurrent {
                    let Some(item) = state.queue.pop() else { break };
                    // Items whose record moved on (cancelled, paused,
                    // superseded) are stale heap entries; skip them.
                    let startable = state
                        .records
                        .get(&item.id)
                        .is_some_and(|r| r.state == DownloadState::Queued);
                    if !startable {
                        continue;
                    }
                    let (control_tx, control_rx) = watch::channel(Command::Run);
                    state.controls.insert(item.id, control_tx);
                    state.active.insert(item.id);
                    if let Some(record) = state.records.get_mut(&item.id) {
                        record.started_at = Some(Utc::now());
                        Self::transition(&self.events, record, DownloadState::InProgress);
                    }
                    to_start.push((item.id, control_rx));
                }
            }
            for (id, control_rx) in to_start {
                let scheduler = Arc::clone(self);
                tokio::spawn(async move {
                    scheduler.run_transfer(id, control_rx).await;
                });
            }
        })
    }

    async fn run_transfer(self: Arc<Self>, id: Uuid, control: watch::Receiver<Command>) {
        let outcome = self.transfer(id, control).await;

        let (url, settled) = {
            let mut state = self.state.lock().await;
            let Some(record) = state.records.get_mut(&id) else {
                return;
            };
            let url = record.resource.url.clone();
            match &outcome {
                TransferOutcome::Complete => {
                    Self::transition(&self.events, record, DownloadState::Complete);
                }
                TransferOutcome::Cancelled => {
                    Self::transition(&self.events, record, DownloadState::Cancelled);
                }
                TransferOutcome::Interrupted(reason) => {
                    record.last_error = Some(reason.clone());
                    Self::transition(&self.events, record, DownloadState::Interrupted);
                }
                TransferOutcome::Paused => {
                    Self::transition(&self.events, record, DownloadState::Paused);
                }
            }

            match &outcome {
                TransferOutcome::Paused => {
                    state.active.remove(&id);
                    state.controls.remove(&id);
                    (url, false)
                }
                TransferOutcome::Interrupted(_) => {
                    let record = state.records[&id].clone();
                    Self::settle_locked(&mut state, record, false);
                    (url, true)
                }
                _ => {
                    let record = state.records[&id].clone();
                    Self::settle_locked(&mut state, record, true);
                    (url, true)
                }
            }
        };

        if matches!(
            outcome,
            TransferOutcome::Complete | TransferOutcome::Cancelled
        ) {
            self.resumable.remove(&url).await;
        }
        if settled {
            self.persist_history().await;
        }
        self.promote().await;
    }

    /// The byte-moving loop, with retries. Returns the settled outcome;
    /// `run_transfer` owns the state transition.
    async fn transfer(&self, id: Uuid, control: watch::Receiver<Command>) -> TransferOutcome {
        let config = self.config_snapshot();
        let Some(record) = self.get(id).await else {
            return TransferOutcome::Cancelled;
        };
        let url = record.resource.url.clone();
        let mut offset = record.resumable_offset.unwrap_or(0);

        let path = match self.target_path(&record, &config).await {
            Ok(p) => p,
            Err(e) => return TransferOutcome::Interrupted(e.to_string()),
        };
        {
            let mut state = self.state.lock().await;
            if let Some(r) = state.records.get_mut(&id) {
                r.filename_on_disk = Some(path.to_string_lossy().into_owned());
            }
        }

        let started = std::time::Instant::now();
        let start_offset = offset;
        let mut attempt = 0u32;

        loop {
            match self
                .attempt_transfer(id, &url, offset, &path, &config, control.clone())
                .await
            {
                Ok(AttemptEnd::Complete { bytes_received }) => {
                    let elapsed = started.elapsed().as_secs_f64();
                    let session_bytes = bytes_received.saturating_sub(start_offset);
                    if session_bytes > 0 && elapsed > 0.0 {
                        self.estimator
                            .lock()
                            .unwrap_or_else(|p| p.into_inner())
                            .record(session_bytes, elapsed);
                        self.events.emit(SnifferEvent::SpeedSample {
                            bytes_per_second: session_bytes as f64 / elapsed,
                        });
                        self.persist_speed_history().await;
                    }
                    return TransferOutcome::Complete;
                }
                Ok(AttemptEnd::Cancelled) => {
                    // Cancellation drops the partial file.
                    let _ = tokio::fs::remove_file(&path).await;
                    return TransferOutcome::Cancelled;
                }
                Ok(AttemptEnd::Paused { bytes_received }) => {
                    self.save_resumable(id, bytes_received).await;
                    return TransferOutcome::Paused;
                }
                Err(e) => {
                    attempt += 1;
                    offset = self.get(id).await.map(|r| r.bytes_received).unwrap_or(offset);
                    if attempt >= MAX_RETRIES {
                        let interrupted = SniffError::Interrupted {
                            bytes_received: offset,
                            reason: e.to_string(),
                        };
                        warn!(%id, url, error = %interrupted, "download interrupted after retries");
                        self.save_resumable(id, offset).await;
                        return TransferOutcome::Interrupted(interrupted.to_string());
                    }
                    // 1s / 2s / 4s.
                    let backoff = std::time::Duration::from_secs(1 << (attempt - 1));
                    warn!(%id, url, attempt, error = %e, "transfer attempt failed, retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn attempt_transfer(
        &self,
        id: Uuid,
        url: &str,
        offset: u64,
        path: &std::path::Path,
        config: &SnifferConfig,
        control: watch::Receiver<Command>,
    ) -> Result<AttemptEnd, SniffError> {
        let mut stream = self.registry.open_stream(url, offset).await?;
        let effective_offset = if offset > 0 && !stream.resumed_from_offset {
            // Server ignored the range; start the file over.
            0
        } else {
            offset
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SniffError::Network(format!("create download dir: {e}")))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(effective_offset == 0)
            .append(effective_offset > 0)
            .open(path)
            .await
            .map_err(|e| SniffError::Network(format!("open {}: {e}", path.display())))?;

        let mut bytes_received = effective_offset;
        {
            let mut state = self.state.lock().await;
            if let Some(r) = state.records.get_mut(&id) {
                r.bytes_received = bytes_received;
                r.total_bytes = stream.total_bytes.or(r.total_bytes);
            }
        }

        let mut since_event = 0u64;
        while let Some(chunk) = stream.stream.next().await {
            match *control.borrow() {
                Command::Cancel => return Ok(AttemptEnd::Cancelled),
                Command::Pause => return Ok(AttemptEnd::Paused { bytes_received }),
                Command::Run => {}
            }

            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| SniffError::Network(format!("write {}: {e}", path.display())))?;
            bytes_received += chunk.len() as u64;
            since_event += chunk.len() as u64;

            let active_count = {
                let mut state = self.state.lock().await;
                if let Some(r) = state.records.get_mut(&id) {
                    r.bytes_received = bytes_received;
                    r.last_update = Utc::now();
                }
                if since_event >= PROGRESS_EVENT_BYTES {
                    since_event = 0;
                    let total = state.records.get(&id).and_then(|r| r.total_bytes);
                    self.events.emit(SnifferEvent::DownloadProgress {
                        download_id: id,
                        bytes_received,
                        total_bytes: total,
                    });
                }
                state.active.len().max(1)
            };

            // Aggregate speed limit split across active downloads: delay
            // this chunk by the time it should have taken at the capped
            // rate.
            if config.download_speed_limit_kbs > 0 {
                let per_download_bps =
                    (config.download_speed_limit_kbs * 1024) as f64 / active_count as f64;
                let delay = chunk.len() as f64 / per_download_bps;
                tokio::time::sleep(std::time::Duration::from_secs_f64(delay)).await;
            }
        }

        file.flush()
            .await
            .map_err(|e| SniffError::Network(format!("flush {}: {e}", path.display())))?;
        Ok(AttemptEnd::Complete { bytes_received })
    }

    async fn target_path(
        &self,
        record: &DownloadRecord,
        config: &SnifferConfig,
    ) -> Result<PathBuf, SniffError> {
        // Resumed downloads append to the file they started.
        if let Some(existing) = &record.filename_on_disk {
            if record.resumable_offset.unwrap_or(0) > 0 {
                return Ok(PathBuf::from(existing));
            }
        }

        let options = {
            let state = self.state.lock().await;
            state.options.get(&record.download_id).cloned()
        };
        let mut dir = options
            .as_ref()
            .and_then(|o| o.target_dir.clone())
            .unwrap_or_else(|| PathBuf::from(&config.default_path));
        if config.categorize_by_website {
            dir = dir.join(filename::sanitize(&site_dir(&record.resource.url)));
        }
        if config.categorize_by_type {
            dir = dir.join(record.resource.resource_type.to_string());
        }

        let index = options.map(|o| o.index).unwrap_or(0);
        let mut name = filename::derive(&record.resource, config, index);
        let mut path = dir.join(&name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            name = filename::conflict_suffix(&name);
            path = dir.join(&name);
        }
        Ok(path)
    }

    async fn save_resumable(&self, id: Uuid, bytes_received: u64) {
        let Some(record) = self.get(id).await else {
            return;
        };
        self.resumable
            .upsert(ResumableEntry {
                url: record.resource.url.clone(),
                filename: record
                    .filename_on_disk
                    .clone()
                    .unwrap_or_else(|| record.resource.filename.clone()),
                total_bytes: record.total_bytes,
                bytes_received,
                mime: record.resource.content_type.clone(),
                timestamp: Utc::now(),
            })
            .await;
    }

    async fn persist_speed_history(&self) {
        let snapshot = {
            let estimator = self.estimator.lock().unwrap_or_else(|p| p.into_inner());
            serde_json::to_value(&*estimator).ok()
        };
        if let Some(value) = snapshot {
            if let Err(e) = self
                .history_store
                .set(keys::NETWORK_SPEED_HISTORY, value)
                .await
            {
                self.events.emit(SnifferEvent::StorageError {
                    key: keys::NETWORK_SPEED_HISTORY.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    async fn persist_history(&self) {
        let history = self.history().await;
        let value = match serde_json::to_value(&history) {
            Ok(v) => v,
            Err(_) => return,
        };
        if let Err(e) = self.history_store.set(keys::DOWNLOAD_HISTORY, value).await {
            self.events.emit(SnifferEvent::StorageError {
                key: keys::DOWNLOAD_HISTORY.to_string(),
                error: e.to_string(),
            });
        }
    }
}

enum AttemptEnd {
    Complete { bytes_received: u64 },
    Cancelled,
    Paused { bytes_received: u64 },
}

enum TransferOutcome {
    Complete,
    Cancelled,
    Paused,
    Interrupted(String),
}

fn is_archive(url: &str) -> bool {
    matches!(
        urlnorm::extension(url).as_deref(),
        Some("zip" | "rar" | "7z" | "tar" | "gz" | "bz2" | "xz")
    )
}

fn site_dir(url: &str) -> String {
    url.split("://")
        .nth(1)
        .unwrap_or(url)
        .split('/')
        .next()
        .unwrap_or("site")
        .trim_start_matches("www.")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{ByteStream, FetchedBody, ProbeResult, ProtocolAdapter};
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream;
    use mediasniff_common::ResourceSource;
    use mediasniff_graph::MemoryStore;
    use std::time::Duration;

    const CHUNK: usize = 100;

    /// Scripted byte source for "mock:" URLs. Each `open_stream` call pops
    /// one entry from `fail_after_bytes`: `Some(n)` delivers n bytes of
    /// this session then errors; `None` (or an empty script) streams to
    /// completion. Every observed offset and URL is recorded.
    #[derive(Clone)]
    struct MockSource {
        body: Arc<Vec<u8>>,
        fail_script: Arc<std::sync::Mutex<VecDeque<Option<usize>>>>,
        opened: Arc<std::sync::Mutex<Vec<(String, u64)>>>,
        chunk_delay: Duration,
    }

    impl MockSource {
        fn new(body: Vec<u8>) -> Self {
            Self {
                body: Arc::new(body),
                fail_script: Arc::new(std::sync::Mutex::new(VecDeque::new())),
                opened: Arc::new(std::sync::Mutex::new(Vec::new())),
                chunk_delay: Duration::from_millis(0),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.chunk_delay = delay;
            self
        }

        fn script_failures(&self, script: Vec<Option<usize>>) {
            *self.fail_script.lock().unwrap() = script.into();
        }

        fn offsets(&self) -> Vec<u64> {
            self.opened.lock().unwrap().iter().map(|(_, o)| *o).collect()
        }

        fn opened_urls(&self) -> Vec<String> {
            self.opened.lock().unwrap().iter().map(|(u, _)| u.clone()).collect()
        }
    }

    #[async_trait]
    impl ProtocolAdapter for MockSource {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn can_handle(&self, url: &str) -> bool {
            url.starts_with("mock:")
        }

        async fn probe(&self, _url: &str) -> Result<ProbeResult, SniffError> {
            Ok(ProbeResult {
                resource_type: ResourceType::Other,
                content_type: None,
                size: Some(self.body.len() as u64),
                available: true,
            })
        }

        async fn fetch(&self, _url: &str) -> Result<FetchedBody, SniffError> {
            Ok(FetchedBody {
                content_type: None,
                bytes: Bytes::from(self.body.as_ref().clone()),
            })
        }

        async fn open_stream(&self, url: &str, offset: u64) -> Result<ByteStream, SniffError> {
            self.opened.lock().unwrap().push((url.to_string(), offset));
            let fail_after = self.fail_script.lock().unwrap().pop_front().flatten();

            let data = self.body[(offset as usize).min(self.body.len())..].to_vec();
            let mut items: Vec<Result<Bytes, SniffError>> = data
                .chunks(CHUNK)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect();
            if let Some(n) = fail_after {
                items.truncate(n / CHUNK);
                items.push(Err(SniffError::Network("injected failure".to_string())));
            }

            let delay = self.chunk_delay;
            let stream = stream::iter(items).then(move |item| async move {
                if delay > Duration::ZERO {
                    tokio::time::sleep(delay).await;
                }
                item
            });

            Ok(ByteStream {
                total_bytes: Some(self.body.len() as u64),
                content_type: Some("application/octet-stream".to_string()),
                resumed_from_offset: offset > 0,
                stream: Box::pin(stream),
            })
        }
    }

    struct Harness {
        scheduler: Arc<DownloadScheduler>,
        source: MockSource,
        _dir: tempfile::TempDir,
        dir_path: PathBuf,
        estimator: Arc<std::sync::Mutex<SpeedEstimator>>,
        resumable: Arc<ResumableStore>,
    }

    fn harness(body_len: usize, config: SnifferConfig) -> Harness {
        let source = MockSource::new((0..body_len).map(|i| (i % 251) as u8).collect());
        let registry = Arc::new(
            AdapterRegistry::new().register(Box::new(source.clone())),
        );
        let estimator = Arc::new(std::sync::Mutex::new(SpeedEstimator::new()));
        let resumable = Arc::new(ResumableStore::new(Arc::new(MemoryStore::new())));
        let dir = tempfile::tempdir().unwrap();
        let dir_path = dir.path().to_path_buf();
        let scheduler = DownloadScheduler::new(
            registry,
            Arc::clone(&estimator),
            Arc::clone(&resumable),
            Arc::new(MemoryStore::new()),
            EventBus::new(64),
            config,
        );
        Harness {
            scheduler,
            source,
            _dir: dir,
            dir_path,
            estimator,
            resumable,
        }
    }

    fn resource(url: &str, resource_type: ResourceType, size: Option<u64>) -> ResourceRecord {
        let mut r = ResourceRecord::new(url, resource_type, ResourceSource::Dom);
        r.size_bytes = size;
        r
    }

    fn options(h: &Harness) -> DownloadOptions {
        DownloadOptions {
            tab_id: None,
            target_dir: Some(h.dir_path.clone()),
            index: 0,
        }
    }

    async fn wait_for_state(
        scheduler: &Arc<DownloadScheduler>,
        id: Uuid,
        want: DownloadState,
    ) -> DownloadRecord {
        for _ in 0..600 {
            if let Some(record) = scheduler.get(id).await {
                if record.state == want {
                    return record;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("download {id} never reached {want}");
    }

    #[tokio::test]
    async fn small_download_completes_and_lands_on_disk() {
        let h = harness(950, SnifferConfig::default());
        let id = h
            .scheduler
            .enqueue(resource("mock:file.bin", ResourceType::Other, None), options(&h))
            .await
            .unwrap();
        let record = wait_for_state(&h.scheduler, id, DownloadState::Complete).await;
        assert_eq!(record.bytes_received, 950);

        let path = record.filename_on_disk.unwrap();
        let written = std::fs::read(&path).unwrap();
        assert_eq!(written.len(), 950);
        assert_eq!(written, *h.source.body);

        // Completion feeds the speed estimator.
        let current = h.estimator.lock().unwrap().current();
        assert!(current > 0.0);
    }

    #[tokio::test]
    async fn duplicate_fingerprint_enqueue_is_ignored() {
        let h = harness(100_000, SnifferConfig::default());
        let slow = h.source.clone().with_delay(Duration::from_millis(5));
        // Re-register a slowed source so the first download stays live.
        let registry = Arc::new(AdapterRegistry::new().register(Box::new(slow)));
        let scheduler = DownloadScheduler::new(
            registry,
            Arc::clone(&h.estimator),
            Arc::clone(&h.resumable),
            Arc::new(MemoryStore::new()),
            EventBus::new(64),
            SnifferConfig::default(),
        );

        let r = resource("mock:same.bin", ResourceType::Image, None);
        let first = scheduler.enqueue(r.clone(), options(&h)).await.unwrap();
        let second = scheduler.enqueue(r, options(&h)).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn unsupported_scheme_rejected_at_enqueue() {
        let h = harness(100, SnifferConfig::default());
        let err = h
            .scheduler
            .enqueue(
                resource("gopher://ancient/file", ResourceType::Other, None),
                options(&h),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SniffError::AdapterUnsupported(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn network_failures_retry_then_interrupt() {
        let h = harness(1000, SnifferConfig::default());
        // All three attempts fail: 400 bytes, then nothing twice.
        h.source
            .script_failures(vec![Some(400), Some(0), Some(0)]);

        let id = h
            .scheduler
            .enqueue(resource("mock:flaky.bin", ResourceType::Other, None), options(&h))
            .await
            .unwrap();
        let record = wait_for_state(&h.scheduler, id, DownloadState::Interrupted).await;
        assert_eq!(record.bytes_received, 400);
        assert!(record.last_error.is_some());

        // Interrupted downloads persist a Range continuation point.
        let entry = h.resumable.get("mock:flaky.bin").await.unwrap();
        assert_eq!(entry.bytes_received, 400);

        // Three opens: initial plus two retries, resuming at the high-water mark.
        assert_eq!(h.source.offsets(), vec![0, 400, 400]);
    }

    #[tokio::test(start_paused = true)]
    async fn resume_after_interrupt_uses_new_id_and_byte_range() {
        let h = harness(1000, SnifferConfig::default());
        h.source
            .script_failures(vec![Some(400), Some(0), Some(0)]);

        let id = h
            .scheduler
            .enqueue(resource("mock:resume.bin", ResourceType::Other, None), options(&h))
            .await
            .unwrap();
        wait_for_state(&h.scheduler, id, DownloadState::Interrupted).await;

        let resumed = h.scheduler.resume(id).await.unwrap();
        assert_ne!(resumed, id, "interrupted resume issues a fresh download id");
        let record = wait_for_state(&h.scheduler, resumed, DownloadState::Complete).await;
        assert_eq!(record.bytes_received, 1000);

        // The continuation opened with Range offset 400.
        assert_eq!(*h.source.offsets().last().unwrap(), 400);

        // Completion purges the resumable entry.
        assert!(h.resumable.get("mock:resume.bin").await.is_none());

        // The reassembled file matches the full body.
        let written = std::fs::read(record.filename_on_disk.unwrap()).unwrap();
        assert_eq!(written, *h.source.body);
    }

    #[tokio::test]
    async fn pause_and_resume_keep_the_same_id() {
        let h = harness(5_000, SnifferConfig::default());
        let slow = h.source.clone().with_delay(Duration::from_millis(5));
        let registry = Arc::new(AdapterRegistry::new().register(Box::new(slow)));
        let scheduler = DownloadScheduler::new(
            registry,
            Arc::clone(&h.estimator),
            Arc::clone(&h.resumable),
            Arc::new(MemoryStore::new()),
            EventBus::new(64),
            SnifferConfig::default(),
        );

        let id = scheduler
            .enqueue(resource("mock:pausable.bin", ResourceType::Other, None), options(&h))
            .await
            .unwrap();
        wait_for_state(&scheduler, id, DownloadState::InProgress).await;
        tokio::time::sleep(Duration::from_millis(25)).await;

        scheduler.pause(id).await.unwrap();
        let paused = wait_for_state(&scheduler, id, DownloadState::Paused).await;
        assert!(paused.bytes_received < 5_000);
        assert!(h.resumable.get("mock:pausable.bin").await.is_some());

        let resumed = scheduler.resume(id).await.unwrap();
        assert_eq!(resumed, id, "paused resume keeps the id");
        let done = wait_for_state(&scheduler, id, DownloadState::Complete).await;
        assert_eq!(done.bytes_received, 5_000);
        let written = std::fs::read(done.filename_on_disk.unwrap()).unwrap();
        assert_eq!(written, *h.source.body);
    }

    #[tokio::test]
    async fn cancel_in_progress_removes_partial_file_and_resumable_entry() {
        let h = harness(50_000, SnifferConfig::default());
        let slow = h.source.clone().with_delay(Duration::from_millis(5));
        let registry = Arc::new(AdapterRegistry::new().register(Box::new(slow)));
        let scheduler = DownloadScheduler::new(
            registry,
            Arc::clone(&h.estimator),
            Arc::clone(&h.resumable),
            Arc::new(MemoryStore::new()),
            EventBus::new(64),
            SnifferConfig::default(),
        );

        let id = scheduler
            .enqueue(resource("mock:doomed.bin", ResourceType::Other, None), options(&h))
            .await
            .unwrap();
        let started = wait_for_state(&scheduler, id, DownloadState::InProgress).await;
        scheduler.cancel(id).await.unwrap();
        let record = wait_for_state(&scheduler, id, DownloadState::Cancelled).await;
        assert!(record.state.is_terminal());

        assert!(h.resumable.get("mock:doomed.bin").await.is_none());
        if let Some(path) = started.filename_on_disk.or(record.filename_on_disk) {
            assert!(!std::path::Path::new(&path).exists());
        }
    }

    #[tokio::test]
    async fn dequeue_order_follows_priority() {
        let mut config = SnifferConfig::default();
        config.max_concurrent_downloads = 1;
        let h = harness(1_000, config.clone());
        // 3 Mbps -> network factor 1.0.
        h.estimator.lock().unwrap().record(375_000, 1.0);

        let slow = h.source.clone().with_delay(Duration::from_millis(10));
        let registry = Arc::new(AdapterRegistry::new().register(Box::new(slow)));
        let scheduler = DownloadScheduler::new(
            registry,
            Arc::clone(&h.estimator),
            Arc::clone(&h.resumable),
            Arc::new(MemoryStore::new()),
            EventBus::new(64),
            config,
        );

        // Occupy the single slot so the next three queue up together.
        let blocker = scheduler
            .enqueue(resource("mock:blocker.bin", ResourceType::Other, None), options(&h))
            .await
            .unwrap();
        wait_for_state(&scheduler, blocker, DownloadState::InProgress).await;

        let video = scheduler
            .enqueue(
                resource("mock:clip.mp4", ResourceType::Video, Some(500_000)),
                options(&h),
            )
            .await
            .unwrap();
        let image = scheduler
            .enqueue(
                resource("mock:pic.jpg", ResourceType::Image, Some(50_000)),
                options(&h),
            )
            .await
            .unwrap();
        let document = scheduler
            .enqueue(
                resource("mock:report.pdf", ResourceType::Document, Some(20_000_000)),
                options(&h),
            )
            .await
            .unwrap();

        // Priorities: video 1.95, image 1.56, document 0.7.
        let video_p = scheduler.get(video).await.unwrap().priority;
        let image_p = scheduler.get(image).await.unwrap().priority;
        let document_p = scheduler.get(document).await.unwrap().priority;
        assert!((video_p - 1.95).abs() < 1e-9, "video priority {video_p}");
        assert!((image_p - 1.56).abs() < 1e-9, "image priority {image_p}");
        assert!((document_p - 0.7).abs() < 1e-9, "document priority {document_p}");

        for id in [video, image, document] {
            wait_for_state(&scheduler, id, DownloadState::Complete).await;
        }
        let order = h.source.opened_urls();
        assert_eq!(
            order,
            vec![
                "mock:blocker.bin",
                "mock:clip.mp4",
                "mock:pic.jpg",
                "mock:report.pdf"
            ]
        );
    }

    #[tokio::test]
    async fn tab_close_cancels_queued_but_not_in_progress() {
        let mut config = SnifferConfig::default();
        config.max_concurrent_downloads = 1;
        let h = harness(20_000, config.clone());
        let slow = h.source.clone().with_delay(Duration::from_millis(5));
        let registry = Arc::new(AdapterRegistry::new().register(Box::new(slow)));
        let scheduler = DownloadScheduler::new(
            registry,
            Arc::clone(&h.estimator),
            Arc::clone(&h.resumable),
            Arc::new(MemoryStore::new()),
            EventBus::new(64),
            config,
        );

        let tab_options = DownloadOptions {
            tab_id: Some("tab-7".to_string()),
            target_dir: Some(h.dir_path.clone()),
            index: 0,
        };
        let running = scheduler
            .enqueue(resource("mock:running.bin", ResourceType::Other, None), tab_options.clone())
            .await
            .unwrap();
        wait_for_state(&scheduler, running, DownloadState::InProgress).await;
        let queued_a = scheduler
            .enqueue(resource("mock:q1.bin", ResourceType::Other, None), tab_options.clone())
            .await
            .unwrap();
        let queued_b = scheduler
            .enqueue(resource("mock:q2.bin", ResourceType::Other, None), tab_options)
            .await
            .unwrap();

        let cancelled = scheduler.cancel_tab("tab-7").await;
        assert_eq!(cancelled, 2);
        assert_eq!(
            scheduler.get(queued_a).await.unwrap().state,
            DownloadState::Cancelled
        );
        assert_eq!(
            scheduler.get(queued_b).await.unwrap().state,
            DownloadState::Cancelled
        );
        // The in-progress download keeps running to completion.
        wait_for_state(&scheduler, running, DownloadState::Complete).await;
    }

    #[tokio::test]
    async fn history_records_terminal_outcomes() {
        let h = harness(500, SnifferConfig::default());
        let id = h
            .scheduler
            .enqueue(resource("mock:done.bin", ResourceType::Other, None), options(&h))
            .await
            .unwrap();
        wait_for_state(&h.scheduler, id, DownloadState::Complete).await;
        let history = h.scheduler.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].state, DownloadState::Complete);
    }

    #[tokio::test]
    async fn queue_snapshot_orders_by_priority() {
        let mut config = SnifferConfig::default();
        config.max_concurrent_downloads = 1;
        let h = harness(50_000, config.clone());
        let slow = h.source.clone().with_delay(Duration::from_millis(5));
        let registry = Arc::new(AdapterRegistry::new().register(Box::new(slow)));
        let scheduler = DownloadScheduler::new(
            registry,
            Arc::clone(&h.estimator),
            Arc::clone(&h.resumable),
            Arc::new(MemoryStore::new()),
            EventBus::new(64),
            config,
        );

        let blocker = scheduler
            .enqueue(resource("mock:hold.bin", ResourceType::Other, None), options(&h))
            .await
            .unwrap();
        wait_for_state(&scheduler, blocker, DownloadState::InProgress).await;
        scheduler
            .enqueue(
                resource("mock:doc.pdf", ResourceType::Document, Some(20_000_000)),
                options(&h),
            )
            .await
            .unwrap();
        scheduler
            .enqueue(
                resource("mock:movie.mp4", ResourceType::Video, Some(500_000)),
                options(&h),
            )
            .await
            .unwrap();

        let snapshot = scheduler.queue_snapshot().await;
        let urls: Vec<&str> = snapshot.iter().map(|r| r.resource.url.as_str()).collect();
        let movie_pos = urls.iter().position(|u| *u == "mock:movie.mp4").unwrap();
        let doc_pos = urls.iter().position(|u| *u == "mock:doc.pdf").unwrap();
        assert!(movie_pos < doc_pos);
    }
}
