//! Protocol adapter seam: one strategy object per URL scheme, dispatched
//! through a registry. Probing and fetching live here; driving bytes to
//! disk is the scheduler's job, fed by an adapter's byte stream.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use mediasniff_common::{ResourceType, SniffError};

/// What a probe learned about a URL without downloading it.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProbeResult {
    pub resource_type: ResourceType,
    pub content_type: Option<String>,
    pub size: Option<u64>,
    pub available: bool,
}

/// A fully fetched body.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// An open byte stream plus the response metadata the scheduler needs.
pub struct ByteStream {
    pub total_bytes: Option<u64>,
    pub content_type: Option<String>,
    /// Whether the server honored the requested byte offset.
    pub resumed_from_offset: bool,
    pub stream: Pin<Box<dyn Stream<Item = Result<Bytes, SniffError>> + Send>>,
}

impl std::fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteStream")
            .field("total_bytes", &self.total_bytes)
            .field("content_type", &self.content_type)
            .field("resumed_from_offset", &self.resumed_from_offset)
            .field("stream", &"<stream>")
            .finish()
    }
}

#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_handle(&self, url: &str) -> bool;

    /// Cheap availability/metadata check (HEAD or equivalent).
    async fn probe(&self, url: &str) -> Result<ProbeResult, SniffError>;

    /// Materialize the full body in memory. Callers own the size
    /// tradeoff; the scheduler streams instead.
    async fn fetch(&self, url: &str) -> Result<FetchedBody, SniffError>;

    /// Open a byte stream starting at `offset` (0 = from the beginning).
    /// Adapters without download support return `AdapterUnsupported`.
    async fn open_stream(&self, url: &str, offset: u64) -> Result<ByteStream, SniffError>;
}

/// Scheme-based dispatch table. Unregistered schemes are a well-defined
/// failure, not a panic.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn ProtocolAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    pub fn register(mut self, adapter: Box<dyn ProtocolAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    /// The first adapter claiming the URL, or `AdapterUnsupported`.
    pub fn adapter_for(&self, url: &str) -> Result<&dyn ProtocolAdapter, SniffError> {
        self.adapters
            .iter()
            .map(|a| a.as_ref())
            .find(|a| a.can_handle(url))
            .ok_or_else(|| SniffError::AdapterUnsupported(scheme_of(url)))
    }

    pub async fn probe(&self, url: &str) -> Result<ProbeResult, SniffError> {
        self.adapter_for(url)?.probe(url).await
    }

    pub async fn fetch(&self, url: &str) -> Result<FetchedBody, SniffError> {
        self.adapter_for(url)?.fetch(url).await
    }

    pub async fn open_stream(&self, url: &str, offset: u64) -> Result<ByteStream, SniffError> {
        self.adapter_for(url)?.open_stream(url, offset).await
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn scheme_of(url: &str) -> String {
    url.split(':').next().unwrap_or("").to_lowercase()
}
