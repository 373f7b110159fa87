use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use mediasniff_api::{app, CoreService};
use mediasniff_common::{EventBus, SnifferConfig};
use mediasniff_graph::{JsonFileStore, KeyValueStore};
use mediasniff_net::{default_registry, DownloadScheduler, ResumableStore, SpeedEstimator};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mediasniff", about = "Media resource detection and download service")]
struct Args {
    /// Listen address.
    #[arg(long, default_value = "127.0.0.1:8642")]
    addr: String,

    /// Backing store file for options, histories, and resumable state.
    #[arg(long, default_value = "mediasniff-store.json")]
    store: PathBuf,

    /// Analyzer/detector worker count.
    #[arg(long, default_value_t = 4)]
    workers: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("mediasniff=info".parse()?))
        .init();

    let args = Args::parse();
    info!(addr = %args.addr, store = %args.store.display(), "mediasniff starting");

    let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::open(&args.store).await?);
    let config = SnifferConfig::default().apply_env().validated()?;
    let events = EventBus::default();
    let speed_history = match store.get(mediasniff_graph::keys::NETWORK_SPEED_HISTORY).await {
        Ok(Some(value)) => serde_json::from_value(value).unwrap_or_default(),
        _ => SpeedEstimator::new(),
    };
    let estimator = Arc::new(std::sync::Mutex::new(speed_history));
    let resumable = Arc::new(ResumableStore::load(Arc::clone(&store)).await);

    let registry = Arc::new(default_registry());
    let scheduler = DownloadScheduler::new(
        Arc::clone(&registry),
        Arc::clone(&estimator),
        resumable,
        Arc::clone(&store),
        events.clone(),
        config.clone(),
    );

    let service = Arc::new(CoreService::new(
        registry,
        scheduler,
        estimator,
        store,
        events,
        config,
        args.workers,
    ));
    service.load_persisted().await;

    let listener = tokio::net::TcpListener::bind(&args.addr).await?;
    info!(addr = %args.addr, "listening");
    axum::serve(listener, app(service))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
