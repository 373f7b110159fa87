//! Detection pipeline: fans the enabled extractors out over blocking
//! worker threads, then normalizes the combined output into graph-ready
//! records.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use mediasniff_common::{urlnorm, ResourceRecord, ResourceType, SnifferConfig};
use tracing::{debug, warn};

use crate::attribute::AttributeExtractor;
use crate::context::ExtractionContext;
use crate::css::CssExtractor;
use crate::dom::DomExtractor;
use crate::nested::NestedExtractor;
use crate::network::NetworkExtractor;
use crate::predictor::PatternPredictor;
use crate::shadow::ShadowDomExtractor;
use crate::streaming::StreamingExtractor;
use crate::traits::Extractor;

pub struct DetectionPipeline {
    extractors: Vec<Arc<dyn Extractor>>,
}

impl DetectionPipeline {
    /// The full built-in extractor set, in discovery-priority order: the
    /// order decides which sighting wins the first-insert slot when two
    /// extractors surface the same URL.
    pub fn with_default_extractors() -> Self {
        Self {
            extractors: vec![
                Arc::new(DomExtractor),
                Arc::new(ShadowDomExtractor),
                Arc::new(AttributeExtractor),
                Arc::new(CssExtractor),
                Arc::new(NestedExtractor),
                Arc::new(StreamingExtractor),
                Arc::new(NetworkExtractor),
                Arc::new(PatternPredictor),
            ],
        }
    }

    pub fn with_extractors(extractors: Vec<Arc<dyn Extractor>>) -> Self {
        Self { extractors }
    }

    /// Run every enabled extractor and return normalized, batch-deduped
    /// records. A failing extractor loses only its own output.
    pub async fn run(
        &self,
        ctx: ExtractionContext,
        config: &SnifferConfig,
    ) -> Result<Vec<ResourceRecord>> {
        let ctx = Arc::new(ctx);
        let tasks: Vec<_> = self
            .extractors
            .iter()
            .filter(|e| e.enabled(config))
            .map(|extractor| {
                let extractor = Arc::clone(extractor);
                let ctx = Arc::clone(&ctx);
                tokio::task::spawn_blocking(move || {
                    let name = extractor.name();
                    (name, extractor.extract(&ctx))
                })
            })
            .collect();

        let mut raw = Vec::new();
        for joined in join_all(tasks).await {
            match joined {
                Ok((name, Ok(records))) => {
                    debug!(extractor = name, count = records.len(), "extractor done");
                    raw.extend(records);
                }
                Ok((name, Err(e))) => {
                    warn!(extractor = name, error = %e, "extractor failed");
                }
                Err(e) => {
                    warn!(error = %e, "extractor task panicked");
                }
            }
        }

        let extracted = raw.len();
        let records = normalize(raw, &ctx.page_url, config);
        debug!(extracted, normalized = records.len(), "detection pipeline complete");
        Ok(records)
    }
}

/// Resolve URLs against the page, drop non-fetchable schemes, apply the
/// minimum-size filters, and merge in-batch duplicates by normalized URL.
fn normalize(
    raw: Vec<ResourceRecord>,
    page_url: &str,
    config: &SnifferConfig,
) -> Vec<ResourceRecord> {
    let mut by_url: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<ResourceRecord> = Vec::new();

    for mut record in raw {
        let resolved = urlnorm::resolve(&record.url, page_url);
        if !is_fetchable(&resolved) {
            continue;
        }
        if below_size_floor(&record, config) {
            continue;
        }
        if record.url != resolved {
            record.filename = urlnorm::filename_from_url(&resolved);
            record.url = resolved;
        }

        let key = urlnorm::normalize(&record.url);
        match by_url.get(&key) {
            Some(&idx) => out[idx].merge_from(&record),
            None => {
                by_url.insert(key, out.len());
                out.push(record);
            }
        }
    }

    out
}

fn is_fetchable(url: &str) -> bool {
    url.starts_with("http://")
        || url.starts_with("https://")
        || url.starts_with("data:")
        || url.starts_with("blob:")
}

fn below_size_floor(record: &ResourceRecord, config: &SnifferConfig) -> bool {
    let Some(size) = record.size_bytes else {
        return false;
    };
    match record.resource_type {
        ResourceType::Image => size < config.min_image_size_kb * 1024,
        ResourceType::Video => size < config.min_video_size_kb * 1024,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediasniff_common::{ResourceSource, ResponseMeta};

    fn config() -> SnifferConfig {
        SnifferConfig::default()
    }

    #[tokio::test]
    async fn pipeline_resolves_relative_urls() {
        let pipeline = DetectionPipeline::with_default_extractors();
        let ctx = ExtractionContext::for_page(
            "https://example.com/gallery/",
            r#"<img src="pics/a.jpg">"#,
        );
        let records = pipeline.run(ctx, &config()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, "https://example.com/gallery/pics/a.jpg");
        assert_eq!(records[0].filename, "a.jpg");
    }

    #[tokio::test]
    async fn same_url_from_two_extractors_merges() {
        let pipeline = DetectionPipeline::with_default_extractors();
        // DOM sees the img, attribute extractor sees data-src to the same
        // asset with dimensions.
        let html = r#"
            <img src="https://cdn.example.com/x.jpg" width="1200" height="800">
            <div data-src="https://cdn.example.com/x.jpg"></div>
        "#;
        let ctx = ExtractionContext::for_page("https://example.com/", html);
        let records = pipeline.run(ctx, &config()).await.unwrap();
        let matching: Vec<_> = records
            .iter()
            .filter(|r| r.url == "https://cdn.example.com/x.jpg")
            .collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].width, Some(1200));
        assert_eq!(matching[0].source, ResourceSource::Dom);
    }

    #[tokio::test]
    async fn disabled_extractors_do_not_run() {
        let pipeline = DetectionPipeline::with_default_extractors();
        let mut cfg = config();
        cfg.enable_predicted_detection = false;
        let ctx = ExtractionContext::for_page(
            "https://example.com/",
            r#"<img src="https://cdn.example.com/photo_01.jpg">"#,
        );
        let records = pipeline.run(ctx, &cfg).await.unwrap();
        assert!(records.iter().all(|r| !r.is_predicted));
    }

    #[tokio::test]
    async fn min_size_filter_drops_known_small_images() {
        let pipeline = DetectionPipeline::with_default_extractors();
        let mut cfg = config();
        cfg.min_image_size_kb = 50;
        let ctx = ExtractionContext::for_page("https://example.com/", "").with_responses(vec![
            ResponseMeta {
                url: "https://cdn.example.com/tiny.png".to_string(),
                content_type: Some("image/png".to_string()),
                content_length: Some(10 * 1024),
                request_id: None,
            },
            ResponseMeta {
                url: "https://cdn.example.com/big.png".to_string(),
                content_type: Some("image/png".to_string()),
                content_length: Some(200 * 1024),
                request_id: None,
            },
        ]);
        let records = pipeline.run(ctx, &cfg).await.unwrap();
        let urls: Vec<&str> = records.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://cdn.example.com/big.png"]);
    }

    #[tokio::test]
    async fn data_scheme_and_frames_kept() {
        let pipeline = DetectionPipeline::with_default_extractors();
        let html = r#"
            <img src="data:image/png;base64,AAAA">
            <iframe src="https://frames.example.com/f"></iframe>
        "#;
        let ctx = ExtractionContext::for_page("https://example.com/", html);
        let records = pipeline.run(ctx, &config()).await.unwrap();
        assert!(records.iter().any(|r| r.url.starts_with("data:")));
        assert!(records.iter().any(|r| r.url.starts_with("https://frames")));
    }
}
