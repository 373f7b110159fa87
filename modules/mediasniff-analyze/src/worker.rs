//! Worker pool for CPU-bound enrichment. Requests mirror the worker
//! protocol actions (analyze, predict, deduplicate, detectResources); each
//! reply is the matching `*Complete` message. A panicking job loses only
//! its own result; the pool and the submitting caller both survive.

use std::sync::Arc;

use mediasniff_common::{ResourceRecord, SniffError, SnifferConfig};
use mediasniff_detect::{DetectionPipeline, ExtractionContext, Extractor, PatternPredictor};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};

use crate::analyzer::{Analysis, Analyzer};
use crate::dedup::{self, DedupResult};

#[derive(Debug)]
pub enum WorkerRequest {
    Analyze {
        record: ResourceRecord,
    },
    Predict {
        page_url: String,
        html: String,
        config: SnifferConfig,
    },
    Deduplicate {
        records: Vec<ResourceRecord>,
    },
    Detect {
        ctx: ExtractionContext,
        config: SnifferConfig,
    },
}

#[derive(Debug)]
pub enum WorkerReply {
    AnalysisComplete(Box<Analysis>),
    PredictionComplete(Vec<ResourceRecord>),
    DeduplicationComplete(DedupResult),
    DetectionComplete(Vec<ResourceRecord>),
}

type Job = (WorkerRequest, oneshot::Sender<Result<WorkerReply, SniffError>>);

pub struct WorkerPool {
    tx: mpsc::Sender<Job>,
}

impl WorkerPool {
    pub fn new(workers: usize, analyzer: Arc<Analyzer>, pipeline: Arc<DetectionPipeline>) -> Self {
        let (tx, rx) = mpsc::channel::<Job>(workers.max(1) * 4);
        let rx = Arc::new(Mutex::new(rx));

        for worker_id in 0..workers.max(1) {
            let rx = Arc::clone(&rx);
            let analyzer = Arc::clone(&analyzer);
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move {
                loop {
                    let job = {
                        let mut guard = rx.lock().await;
                        guard.recv().await
                    };
                    let Some((request, reply_tx)) = job else {
                        debug!(worker_id, "worker pool channel closed");
                        break;
                    };
                    let result = handle(request, &analyzer, &pipeline).await;
                    // A dropped receiver means the submitter gave up;
                    // the result is discarded silently.
                    let _ = reply_tx.send(result);
                }
            });
        }

        Self { tx }
    }

    pub async fn submit(&self, request: WorkerRequest) -> Result<WorkerReply, SniffError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send((request, reply_tx))
            .await
            .map_err(|_| SniffError::Worker("worker pool is shut down".to_string()))?;
        reply_rx
            .await
            .map_err(|_| SniffError::Worker("worker dropped the reply".to_string()))?
    }

    pub async fn analyze(&self, record: ResourceRecord) -> Result<Analysis, SniffError> {
        match self.submit(WorkerRequest::Analyze { record }).await? {
            WorkerReply::AnalysisComplete(analysis) => Ok(*analysis),
            other => Err(SniffError::Worker(format!("unexpected reply: {other:?}"))),
        }
    }

    pub async fn deduplicate(
        &self,
        records: Vec<ResourceRecord>,
    ) -> Result<DedupResult, SniffError> {
        match self.submit(WorkerRequest::Deduplicate { records }).await? {
            WorkerReply::DeduplicationComplete(result) => Ok(result),
            other => Err(SniffError::Worker(format!("unexpected reply: {other:?}"))),
        }
    }

    pub async fn detect(
        &self,
        ctx: ExtractionContext,
        config: SnifferConfig,
    ) -> Result<Vec<ResourceRecord>, SniffError> {
        match self.submit(WorkerRequest::Detect { ctx, config }).await? {
            WorkerReply::DetectionComplete(records) => Ok(records),
            other => Err(SniffError::Worker(format!("unexpected reply: {other:?}"))),
        }
    }

    pub async fn predict(
        &self,
        page_url: String,
        html: String,
        config: SnifferConfig,
    ) -> Result<Vec<ResourceRecord>, SniffError> {
        let request = WorkerRequest::Predict {
            page_url,
            html,
            config,
        };
        match self.submit(request).await? {
            WorkerReply::PredictionComplete(records) => Ok(records),
            other => Err(SniffError::Worker(format!("unexpected reply: {other:?}"))),
        }
    }
}

async fn handle(
    request: WorkerRequest,
    analyzer: &Arc<Analyzer>,
    pipeline: &Arc<DetectionPipeline>,
) -> Result<WorkerReply, SniffError> {
    match request {
        WorkerRequest::Analyze { record } => {
            let analyzer = Arc::clone(analyzer);
            tokio::task::spawn_blocking(move || analyzer.analyze(record))
                .await
                .map(|analysis| WorkerReply::AnalysisComplete(Box::new(analysis)))
                .map_err(worker_error)
        }
        WorkerRequest::Deduplicate { records } => {
            tokio::task::spawn_blocking(move || dedup::dedup(records))
                .await
                .map(WorkerReply::DeduplicationComplete)
                .map_err(worker_error)
        }
        WorkerRequest::Detect { ctx, config } => pipeline
            .run(ctx, &config)
            .await
            .map(WorkerReply::DetectionComplete)
            .map_err(|e| SniffError::Worker(e.to_string())),
        WorkerRequest::Predict {
            page_url,
            html,
            config,
        } => {
            tokio::task::spawn_blocking(move || {
                let predictor = PatternPredictor;
                if !predictor.enabled(&config) {
                    return Ok(Vec::new());
                }
                let ctx = ExtractionContext::for_page(page_url, html);
                predictor.extract(&ctx)
            })
            .await
            .map_err(worker_error)?
            .map(WorkerReply::PredictionComplete)
            .map_err(|e| SniffError::Worker(e.to_string()))
        }
    }
}

fn worker_error(e: tokio::task::JoinError) -> SniffError {
    if e.is_panic() {
        warn!("worker job panicked");
    }
    SniffError::Worker(e.to_string())
}
