//! Network-observation extraction: response headers forwarded by the host
//! become records with authoritative MIME and size information.

use anyhow::Result;
use mediasniff_common::{urlnorm, ResourceRecord, ResourceSource, ResourceType, SnifferConfig};

use crate::context::ExtractionContext;
use crate::traits::Extractor;

pub struct NetworkExtractor;

impl Extractor for NetworkExtractor {
    fn name(&self) -> &'static str {
        "network"
    }

    fn enabled(&self, _config: &SnifferConfig) -> bool {
        // Network observations are pushed by the host; there is no toggle
        // to suppress them once forwarded.
        true
    }

    fn extract(&self, ctx: &ExtractionContext) -> Result<Vec<ResourceRecord>> {
        let mut records = Vec::new();
        for response in &ctx.responses {
            let resource_type =
                urlnorm::infer_type(&response.url, response.content_type.as_deref());
            let is_media_mime = matches!(
                resource_type,
                ResourceType::Image | ResourceType::Video | ResourceType::Audio
            );
            if !is_media_mime && resource_type != ResourceType::Document {
                continue;
            }
            // Streaming manifests belong to the streaming extractor.
            if urlnorm::detect_stream(&response.url, response.content_type.as_deref()).is_some() {
                continue;
            }
            let mut record = ResourceRecord::new(
                response.url.clone(),
                resource_type,
                ResourceSource::Network,
            );
            record.content_type = response.content_type.clone();
            record.size_bytes = response.content_length;
            record.request_id = response.request_id.clone();
            records.push(record);
        }
        Ok(records)
    }
}
