//! data: URL adapter. The "network" here is string parsing: MIME and
//! encoding come from the prefix, and size is computed without decoding
//! when possible.

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use futures::stream;
use mediasniff_common::{urlnorm, SniffError};

use crate::adapter::{ByteStream, FetchedBody, ProbeResult, ProtocolAdapter};

pub struct DataUrlAdapter;

struct ParsedDataUrl<'a> {
    mime: &'a str,
    is_base64: bool,
    body: &'a str,
}

fn parse(url: &str) -> Result<ParsedDataUrl<'_>, SniffError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| SniffError::InvalidInput("not a data: URL".to_string()))?;
    let (header, body) = rest
        .split_once(',')
        .ok_or_else(|| SniffError::InvalidInput("data: URL has no comma".to_string()))?;

    let is_base64 = header.ends_with(";base64");
    let mime_part = header.trim_end_matches(";base64");
    let mime = mime_part
        .split(';')
        .next()
        .filter(|m| !m.is_empty())
        .unwrap_or("text/plain");

    Ok(ParsedDataUrl {
        mime,
        is_base64,
        body,
    })
}

/// Decoded size without decoding: base64 carries 3 bytes per 4 chars
/// (minus padding); URI-encoded bodies decode one %XX per byte.
fn decoded_size(parsed: &ParsedDataUrl<'_>) -> u64 {
    if parsed.is_base64 {
        let trimmed = parsed.body.trim_end_matches('=');
        (trimmed.len() as u64 * 3) / 4
    } else {
        let percent_escapes = parsed.body.matches('%').count() as u64;
        parsed.body.len() as u64 - percent_escapes * 2
    }
}

fn decode(parsed: &ParsedDataUrl<'_>) -> Result<Bytes, SniffError> {
    if parsed.is_base64 {
        base64::engine::general_purpose::STANDARD
            .decode(parsed.body)
            .map(Bytes::from)
            .map_err(|e| SniffError::InvalidInput(format!("bad base64 body: {e}")))
    } else {
        // Percent-decode byte by byte.
        let mut out = Vec::with_capacity(parsed.body.len());
        let bytes = parsed.body.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'%' {
                let byte = bytes
                    .get(i + 1..i + 3)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| {
                        SniffError::InvalidInput("bad percent escape in data: URL".to_string())
                    })?;
                out.push(byte);
                i += 3;
            } else {
                out.push(bytes[i]);
                i += 1;
            }
        }
        Ok(Bytes::from(out))
    }
}

#[async_trait]
impl ProtocolAdapter for DataUrlAdapter {
    fn name(&self) -> &'static str {
        "data"
    }

    fn can_handle(&self, url: &str) -> bool {
        url.starts_with("data:")
    }

    async fn probe(&self, url: &str) -> Result<ProbeResult, SniffError> {
        let parsed = parse(url)?;
        Ok(ProbeResult {
            resource_type: urlnorm::infer_type(url, Some(parsed.mime)),
            content_type: Some(parsed.mime.to_string()),
            size: Some(decoded_size(&parsed)),
            available: true,
        })
    }

    async fn fetch(&self, url: &str) -> Result<FetchedBody, SniffError> {
        let parsed = parse(url)?;
        Ok(FetchedBody {
            content_type: Some(parsed.mime.to_string()),
            bytes: decode(&parsed)?,
        })
    }

    async fn open_stream(&self, url: &str, offset: u64) -> Result<ByteStream, SniffError> {
        let parsed = parse(url)?;
        let content_type = Some(parsed.mime.to_string());
        let bytes = decode(&parsed)?;
        let total = bytes.len() as u64;
        let offset = offset.min(total) as usize;
        let body = bytes.slice(offset..);

        Ok(ByteStream {
            total_bytes: Some(total),
            content_type,
            resumed_from_offset: offset > 0,
            stream: Box::pin(stream::once(async move { Ok(body) })),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediasniff_common::ResourceType;

    const PNG_DATA: &str = "data:image/png;base64,iVBORw0KGgo=";

    #[tokio::test]
    async fn probe_reads_mime_and_size() {
        let probe = DataUrlAdapter.probe(PNG_DATA).await.unwrap();
        assert_eq!(probe.content_type.as_deref(), Some("image/png"));
        assert_eq!(probe.resource_type, ResourceType::Image);
        // "iVBORw0KGgo" is 11 chars after padding strip -> 8 bytes.
        assert_eq!(probe.size, Some(8));
        assert!(probe.available);
    }

    #[tokio::test]
    async fn fetch_decodes_base64() {
        let body = DataUrlAdapter
            .fetch("data:text/plain;base64,aGVsbG8=")
            .await
            .unwrap();
        assert_eq!(&body.bytes[..], b"hello");
    }

    #[tokio::test]
    async fn fetch_decodes_percent_encoding() {
        let body = DataUrlAdapter
            .fetch("data:text/plain,hello%20world")
            .await
            .unwrap();
        assert_eq!(&body.bytes[..], b"hello world");
    }

    #[tokio::test]
    async fn missing_mime_defaults_to_text_plain() {
        let probe = DataUrlAdapter.probe("data:,plain").await.unwrap();
        assert_eq!(probe.content_type.as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn malformed_data_url_is_invalid_input() {
        let err = DataUrlAdapter.fetch("data:no-comma-here").await.unwrap_err();
        assert!(matches!(err, SniffError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn stream_respects_offset() {
        let mut stream = DataUrlAdapter
            .open_stream("data:text/plain;base64,aGVsbG8=", 2)
            .await
            .unwrap();
        assert!(stream.resumed_from_offset);
        assert_eq!(stream.total_bytes, Some(5));
        let chunk = futures::StreamExt::next(&mut stream.stream)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&chunk[..], b"llo");
    }
}
