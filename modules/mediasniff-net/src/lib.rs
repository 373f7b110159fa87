//! Network edge of the resource pipeline: per-scheme protocol adapters,
//! the download scheduler, the rolling speed estimator, filename
//! derivation, and the resumable-download store.

pub mod adapter;
pub mod blob;
pub mod data_url;
pub mod filename;
pub mod http;
pub mod resumable;
pub mod scheduler;
pub mod speed;
pub mod ws;

pub use adapter::{AdapterRegistry, ByteStream, FetchedBody, ProbeResult, ProtocolAdapter};
pub use blob::BlobAdapter;
pub use data_url::DataUrlAdapter;
pub use http::HttpAdapter;
pub use resumable::ResumableStore;
pub use scheduler::{DownloadOptions, DownloadScheduler};
pub use speed::{SpeedAnalysis, SpeedEstimator, Trend, DEFAULT_SPEED_BPS};
pub use ws::WsAdapter;

/// The built-in adapter set: http/https, data:, blob:, ws/wss.
pub fn default_registry() -> AdapterRegistry {
    AdapterRegistry::new()
        .register(Box::new(HttpAdapter::new()))
        .register(Box::new(DataUrlAdapter))
        .register(Box::new(BlobAdapter::new(HttpAdapter::new())))
        .register(Box::new(WsAdapter))
}
