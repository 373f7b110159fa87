//! Lazy-loading attribute extraction: data-src and friends carry the real
//! asset URL on pages that defer loading until scroll.

use anyhow::Result;
use mediasniff_common::{urlnorm, ResourceRecord, ResourceSource, ResourceType, SnifferConfig};
use regex::Regex;

use crate::context::ExtractionContext;
use crate::markup;
use crate::traits::Extractor;

/// Attributes that hold a single URL.
const URL_ATTRIBUTES: &[&str] = &[
    "data-src",
    "data-lazy-src",
    "data-lazy",
    "data-original",
    "data-full",
    "data-hd",
    "data-bg",
    "data-background",
    "data-poster",
];

/// Attributes that hold a srcset-style candidate list.
const SRCSET_ATTRIBUTES: &[&str] = &["data-srcset", "data-lazy-srcset"];

pub struct AttributeExtractor;

impl Extractor for AttributeExtractor {
    fn name(&self) -> &'static str {
        "attribute"
    }

    fn enabled(&self, config: &SnifferConfig) -> bool {
        config.enable_attribute_detection
    }

    fn extract(&self, ctx: &ExtractionContext) -> Result<Vec<ResourceRecord>> {
        let tag_re = Regex::new(r"(?is)<[a-z][a-z0-9-]*\b[^>]*\bdata-[^>]*>").expect("valid regex");
        let mut records = Vec::new();

        for tag in tag_re.find_iter(&ctx.html) {
            let tag = tag.as_str();
            for attr_name in URL_ATTRIBUTES {
                if let Some(url) = markup::attr(tag, attr_name) {
                    push_record(url, &mut records);
                }
            }
            for attr_name in SRCSET_ATTRIBUTES {
                if let Some(srcset) = markup::attr(tag, attr_name) {
                    if let Some((url, width)) = markup::best_srcset_candidate(&srcset) {
                        let before = records.len();
                        push_record(url, &mut records);
                        if records.len() > before {
                            records[before].width = width;
                        }
                    }
                }
            }
        }

        Ok(records)
    }
}

fn push_record(url: String, out: &mut Vec<ResourceRecord>) {
    if url.starts_with('#') || url.starts_with("javascript:") {
        return;
    }
    let inferred = urlnorm::infer_type(&url, None);
    let resource_type = if inferred == ResourceType::Other {
        // Lazy-load attributes mostly carry imagery.
        ResourceType::Image
    } else {
        inferred
    };
    out.push(ResourceRecord::new(url, resource_type, ResourceSource::Attribute));
}
