//! Declarative shadow-root extraction. Serialized shadow DOM arrives as
//! `<template shadowrootmode="...">` blocks; the DOM and CSS scans are
//! re-run over their contents.

use anyhow::Result;
use mediasniff_common::{ResourceRecord, ResourceSource, SnifferConfig};
use regex::Regex;

use crate::context::ExtractionContext;
use crate::traits::Extractor;
use crate::{css, dom};

pub struct ShadowDomExtractor;

impl Extractor for ShadowDomExtractor {
    fn name(&self) -> &'static str {
        "shadow_dom"
    }

    fn enabled(&self, config: &SnifferConfig) -> bool {
        config.enable_shadow_dom_detection
    }

    fn extract(&self, ctx: &ExtractionContext) -> Result<Vec<ResourceRecord>> {
        // Matches both the standard `shadowrootmode` and the earlier
        // `shadowroot` attribute form.
        let template_re = Regex::new(
            r#"(?is)<template\b[^>]*\bshadowroot(?:mode)?\s*=\s*["']?(?:open|closed)["']?[^>]*>(.*?)</template>"#,
        )
        .expect("valid regex");

        let mut records = Vec::new();
        for caps in template_re.captures_iter(&ctx.html) {
            let inner = &caps[1];
            dom::scan_markup(inner, ResourceSource::ShadowDom, &mut records);
            css::scan_styles(inner, ResourceSource::ShadowDom, &mut records);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediasniff_common::ResourceType;

    fn extract(html: &str) -> Vec<ResourceRecord> {
        ShadowDomExtractor
            .extract(&ExtractionContext::for_page("https://example.com/", html))
            .unwrap()
    }

    #[test]
    fn finds_media_inside_shadow_roots() {
        let html = r#"
            <my-gallery>
              <template shadowrootmode="open">
                <img src="inside.jpg">
                <style>.bg { background: url(shadow-bg.png); }</style>
              </template>
            </my-gallery>
            <img src="outside.jpg">
        "#;
        let records = extract(html);
        let urls: Vec<&str> = records.iter().map(|r| r.url.as_str()).collect();
        assert!(urls.contains(&"inside.jpg"));
        assert!(urls.contains(&"shadow-bg.png"));
        assert!(!urls.contains(&"outside.jpg"));
        assert!(records.iter().all(|r| r.source == ResourceSource::ShadowDom));
    }

    #[test]
    fn legacy_shadowroot_attribute_supported() {
        let html = r#"<template shadowroot="open"><img src="legacy.webp"></template>"#;
        let records = extract(html);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].resource_type, ResourceType::Image);
    }

    #[test]
    fn plain_templates_ignored() {
        let html = r#"<template><img src="inert.jpg"></template>"#;
        assert!(extract(html).is_empty());
    }
}
