//! Streaming-manifest extraction. Manifest URLs (HLS/DASH/Smooth) rarely
//! sit in media elements; they hide in script blobs, player configs, and
//! network traffic.

use anyhow::Result;
use mediasniff_common::{
    urlnorm, ResourceRecord, ResourceSource, ResourceType, SnifferConfig,
};
use regex::Regex;

use crate::context::ExtractionContext;
use crate::traits::Extractor;

pub struct StreamingExtractor;

impl Extractor for StreamingExtractor {
    fn name(&self) -> &'static str {
        "streaming"
    }

    fn enabled(&self, config: &SnifferConfig) -> bool {
        config.enable_streaming_detection
    }

    fn extract(&self, ctx: &ExtractionContext) -> Result<Vec<ResourceRecord>> {
        // Any quoted URL-ish string ending in a manifest extension,
        // wherever it appears in the markup (attributes, JSON, scripts).
        let manifest_re = Regex::new(
            r#"["']([^"'\s]+\.(?:m3u8|mpd)(?:\?[^"'\s]*)?)["']"#,
        )
        .expect("valid regex");

        let mut records = Vec::new();
        for caps in manifest_re.captures_iter(&ctx.html) {
            push_manifest(caps[1].to_string(), None, &mut records);
        }

        for response in &ctx.responses {
            if let Some(stream_type) =
                urlnorm::detect_stream(&response.url, response.content_type.as_deref())
            {
                let mut record = ResourceRecord::new(
                    response.url.clone(),
                    ResourceType::Video,
                    ResourceSource::Streaming,
                );
                record.is_stream = true;
                record.stream_type = Some(stream_type);
                record.content_type = response.content_type.clone();
                record.size_bytes = response.content_length;
                record.request_id = response.request_id.clone();
                records.push(record);
            }
        }

        Ok(records)
    }
}

fn push_manifest(url: String, content_type: Option<String>, out: &mut Vec<ResourceRecord>) {
    let stream_type = match urlnorm::detect_stream(&url, content_type.as_deref()) {
        Some(s) => s,
        None => return,
    };
    let mut record = ResourceRecord::new(url, ResourceType::Video, ResourceSource::Streaming);
    record.is_stream = true;
    record.stream_type = Some(stream_type);
    record.content_type = content_type;
    out.push(record);
}
