//! Embedded-context extraction: iframe, embed, and object elements. Media
//! URLs become records of their own type; other frames surface as document
//! records so the host can decide whether to descend.

use anyhow::Result;
use mediasniff_common::{urlnorm, ResourceRecord, ResourceSource, ResourceType, SnifferConfig};

use crate::context::ExtractionContext;
use crate::markup;
use crate::traits::Extractor;

pub struct NestedExtractor;

impl Extractor for NestedExtractor {
    fn name(&self) -> &'static str {
        "nested"
    }

    fn enabled(&self, config: &SnifferConfig) -> bool {
        config.enable_nested_detection
    }

    fn extract(&self, ctx: &ExtractionContext) -> Result<Vec<ResourceRecord>> {
        let mut records = Vec::new();

        for tag in markup::open_tags(&ctx.html, "iframe") {
            if let Some(src) = markup::attr(tag, "src") {
                push_nested(src, &mut records);
            }
        }
        for tag in markup::open_tags(&ctx.html, "embed") {
            if let Some(src) = markup::attr(tag, "src") {
                push_nested(src, &mut records);
            }
        }
        for tag in markup::open_tags(&ctx.html, "object") {
            if let Some(data) = markup::attr(tag, "data") {
                push_nested(data, &mut records);
            }
        }

        Ok(records)
    }
}

fn push_nested(url: String, out: &mut Vec<ResourceRecord>) {
    if url.starts_with("about:") || url.starts_with("javascript:") {
        return;
    }
    let resource_type = if urlnorm::is_media_url(&url) {
        urlnorm::infer_type(&url, None)
    } else {
        ResourceType::Document
    };
    out.push(ResourceRecord::new(url, resource_type, ResourceSource::Nested));
}
