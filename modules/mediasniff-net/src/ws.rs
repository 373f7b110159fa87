//! ws/wss adapter. Probe-oriented: connect, confirm the endpoint answers,
//! close. Streams of media bytes over websockets are out of scope, so
//! download support is explicitly absent.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use mediasniff_common::{ResourceType, SniffError};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::adapter::{ByteStream, FetchedBody, ProbeResult, ProtocolAdapter};

/// Fixed probe ceiling; a socket that cannot even complete its handshake
/// in this window is reported unavailable.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct WsAdapter;

#[async_trait]
impl ProtocolAdapter for WsAdapter {
    fn name(&self) -> &'static str {
        "ws"
    }

    fn can_handle(&self, url: &str) -> bool {
        url.starts_with("ws://") || url.starts_with("wss://")
    }

    async fn probe(&self, url: &str) -> Result<ProbeResult, SniffError> {
        let attempt = tokio::time::timeout(PROBE_TIMEOUT, async {
            let (mut socket, _response) = connect_async(url)
                .await
                .map_err(|e| SniffError::Network(e.to_string()))?;
            // Connected is all we wanted to know.
            let _ = socket.close(None).await;
            Ok::<(), SniffError>(())
        })
        .await;

        let available = match attempt {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                debug!(url, error = %e, "websocket probe failed");
                false
            }
            Err(_) => {
                debug!(url, "websocket probe timed out");
                false
            }
        };

        Ok(ProbeResult {
            resource_type: ResourceType::Other,
            content_type: None,
            size: None,
            available,
        })
    }

    /// Read a single message then close. Useful for endpoints that
    /// announce stream metadata on connect.
    async fn fetch(&self, url: &str) -> Result<FetchedBody, SniffError> {
        let body = tokio::time::timeout(PROBE_TIMEOUT, async {
            let (mut socket, _response) = connect_async(url)
                .await
                .map_err(|e| SniffError::Network(e.to_string()))?;
            let message = socket.next().await;
            let _ = socket.close(None).await;
            match message {
                Some(Ok(Message::Text(text))) => Ok(Bytes::from(text.as_bytes().to_vec())),
                Some(Ok(Message::Binary(bin))) => Ok(Bytes::from(bin)),
                Some(Ok(_)) | None => Ok(Bytes::new()),
                Some(Err(e)) => Err(SniffError::Network(e.to_string())),
            }
        })
        .await
        .map_err(|_| SniffError::Network(format!("websocket fetch timed out: {url}")))??;

        Ok(FetchedBody {
            content_type: None,
            bytes: body,
        })
    }

    async fn open_stream(&self, _url: &str, _offset: u64) -> Result<ByteStream, SniffError> {
        Err(SniffError::AdapterUnsupported(
            "ws download is not supported".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_ws_and_wss() {
        assert!(WsAdapter.can_handle("ws://x.com/socket"));
        assert!(WsAdapter.can_handle("wss://x.com/socket"));
        assert!(!WsAdapter.can_handle("https://x.com/socket"));
    }

    #[tokio::test]
    async fn download_is_unsupported() {
        let err = WsAdapter
            .open_stream("wss://x.com/socket", 0)
            .await
            .unwrap_err();
        assert!(matches!(err, SniffError::AdapterUnsupported(_)));
    }

    #[tokio::test]
    async fn probe_reports_unreachable_endpoint_as_unavailable() {
        // Nothing listens on this port; the connect fails fast and the
        // probe degrades to available=false rather than erroring.
        let probe = WsAdapter.probe("ws://127.0.0.1:1/socket").await.unwrap();
        assert!(!probe.available);
    }
}
