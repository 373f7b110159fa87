//! HTTP/HTTPS adapter on reqwest: HEAD probe, in-memory GET, and a
//! streaming GET with byte-range resume for the scheduler.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use mediasniff_common::{urlnorm, SniffError};
use reqwest::header;
use tracing::debug;

use crate::adapter::{ByteStream, FetchedBody, ProbeResult, ProtocolAdapter};

/// Probe and fetch ceiling. Streaming downloads deliberately carry no
/// wall-clock timeout; they answer to the retry policy instead.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpAdapter {
    client: reqwest::Client,
}

impl HttpAdapter {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(concat!("mediasniff/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProtocolAdapter for HttpAdapter {
    fn name(&self) -> &'static str {
        "http"
    }

    fn can_handle(&self, url: &str) -> bool {
        url.starts_with("http://") || url.starts_with("https://")
    }

    async fn probe(&self, url: &str) -> Result<ProbeResult, SniffError> {
        let response = self
            .client
            .head(url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| SniffError::Network(e.to_string()))?;

        let available = response.status().is_success();
        let content_type = header_str(&response, header::CONTENT_TYPE);
        let size = response.content_length().or_else(|| {
            header_str(&response, header::CONTENT_LENGTH).and_then(|v| v.parse().ok())
        });

        Ok(ProbeResult {
            resource_type: urlnorm::infer_type(url, content_type.as_deref()),
            content_type,
            size,
            available,
        })
    }

    async fn fetch(&self, url: &str) -> Result<FetchedBody, SniffError> {
        let response = self
            .client
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| SniffError::Network(e.to_string()))?
            .error_for_status()
            .map_err(|e| SniffError::Network(e.to_string()))?;

        let content_type = header_str(&response, header::CONTENT_TYPE);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SniffError::Network(e.to_string()))?;
        Ok(FetchedBody {
            content_type,
            bytes,
        })
    }

    async fn open_stream(&self, url: &str, offset: u64) -> Result<ByteStream, SniffError> {
        let mut request = self.client.get(url);
        if offset > 0 {
            request = request.header(header::RANGE, format!("bytes={offset}-"));
        }
        let response = request
            .send()
            .await
            .map_err(|e| SniffError::Network(e.to_string()))?
            .error_for_status()
            .map_err(|e| SniffError::Network(e.to_string()))?;

        // 206 means the server honored the range; a 200 restarts from
        // byte zero and the caller must truncate.
        let resumed_from_offset =
            offset > 0 && response.status() == reqwest::StatusCode::PARTIAL_CONTENT;
        let content_type = header_str(&response, header::CONTENT_TYPE);
        let remaining = response.content_length();
        let total_bytes = remaining.map(|n| if resumed_from_offset { n + offset } else { n });

        debug!(url, offset, resumed_from_offset, "http stream opened");

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| SniffError::Network(e.to_string())));

        Ok(ByteStream {
            total_bytes,
            content_type,
            resumed_from_offset,
            stream: Box::pin(stream),
        })
    }
}

fn header_str(response: &reqwest::Response, name: header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}
