//! blob: URL adapter. Blob URLs only resolve inside the browser context
//! that minted them, so the host forwards them with their inner origin URL
//! intact (`blob:https://origin/uuid`); this adapter strips the prefix and
//! lets the HTTP adapter do the transport work.

use async_trait::async_trait;
use mediasniff_common::SniffError;

use crate::adapter::{ByteStream, FetchedBody, ProbeResult, ProtocolAdapter};
use crate::http::HttpAdapter;

pub struct BlobAdapter {
    inner: HttpAdapter,
}

impl BlobAdapter {
    pub fn new(inner: HttpAdapter) -> Self {
        Self { inner }
    }

    fn inner_url(url: &str) -> Result<&str, SniffError> {
        let inner = url
            .strip_prefix("blob:")
            .ok_or_else(|| SniffError::InvalidInput("not a blob: URL".to_string()))?;
        if inner.starts_with("http://") || inner.starts_with("https://") {
            Ok(inner)
        } else {
            Err(SniffError::AdapterUnsupported(format!(
                "blob with non-http origin: {url}"
            )))
        }
    }
}

#[async_trait]
impl ProtocolAdapter for BlobAdapter {
    fn name(&self) -> &'static str {
        "blob"
    }

    fn can_handle(&self, url: &str) -> bool {
        url.starts_with("blob:")
    }

    async fn probe(&self, url: &str) -> Result<ProbeResult, SniffError> {
        self.inner.probe(Self::inner_url(url)?).await
    }

    async fn fetch(&self, url: &str) -> Result<FetchedBody, SniffError> {
        self.inner.fetch(Self::inner_url(url)?).await
    }

    async fn open_stream(&self, url: &str, offset: u64) -> Result<ByteStream, SniffError> {
        self.inner.open_stream(Self::inner_url(url)?, offset).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_blob_urls() {
        let adapter = BlobAdapter::new(HttpAdapter::new());
        assert!(adapter.can_handle("blob:https://example.com/550e8400"));
        assert!(!adapter.can_handle("https://example.com/550e8400"));
    }

    #[test]
    fn inner_url_extraction() {
        assert_eq!(
            BlobAdapter::inner_url("blob:https://example.com/550e8400").unwrap(),
            "https://example.com/550e8400"
        );
        assert!(BlobAdapter::inner_url("blob:null/abc").is_err());
    }
}
