//! Stylesheet extraction: url(...) references in <style> blocks and inline
//! style attributes.

use anyhow::Result;
use mediasniff_common::{urlnorm, ResourceRecord, ResourceSource, ResourceType, SnifferConfig};
use regex::Regex;

use crate::context::ExtractionContext;
use crate::markup;
use crate::traits::Extractor;

pub struct CssExtractor;

impl Extractor for CssExtractor {
    fn name(&self) -> &'static str {
        "css"
    }

    fn enabled(&self, config: &SnifferConfig) -> bool {
        config.enable_css_detection
    }

    fn extract(&self, ctx: &ExtractionContext) -> Result<Vec<ResourceRecord>> {
        let mut records = Vec::new();
        scan_styles(&ctx.html, ResourceSource::Css, &mut records);
        Ok(records)
    }
}

pub(crate) fn scan_styles(html: &str, source: ResourceSource, out: &mut Vec<ResourceRecord>) {
    let style_block = Regex::new(r"(?is)<style\b[^>]*>(.*?)</style>").expect("valid regex");
    for caps in style_block.captures_iter(html) {
        push_css_urls(&caps[1], source, out);
    }

    let inline_style =
        Regex::new(r#"(?is)[^\w-]style\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid regex");
    for caps in inline_style.captures_iter(html) {
        let css = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str());
        if let Some(css) = css {
            push_css_urls(css, source, out);
        }
    }
}

fn push_css_urls(css: &str, source: ResourceSource, out: &mut Vec<ResourceRecord>) {
    for url in markup::css_urls(css) {
        if url.starts_with("data:") && !url.starts_with("data:image/") {
            continue;
        }
        let inferred = urlnorm::infer_type(&url, None);
        // Stylesheets overwhelmingly reference imagery; keep the image
        // default for extensionless CDN URLs.
        let resource_type = if inferred == ResourceType::Other {
            ResourceType::Image
        } else {
            inferred
        };
        out.push(ResourceRecord::new(url, resource_type, source));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(html: &str) -> Vec<ResourceRecord> {
        CssExtractor
            .extract(&ExtractionContext::for_page("https://example.com/", html))
            .unwrap()
    }

    #[test]
    fn style_block_urls() {
        let records =
            extract(r#"<style>.hero { background-image: url("banner.webp"); }</style>"#);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, "banner.webp");
        assert_eq!(records[0].source, ResourceSource::Css);
        assert_eq!(records[0].resource_type, ResourceType::Image);
    }

    #[test]
    fn inline_style_urls() {
        let records = extract(r#"<div style="background: url('tile.png')">x</div>"#);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, "tile.png");
    }

    #[test]
    fn extensionless_urls_default_to_image() {
        let records = extract(r#"<style>.x{background:url(https://cdn.x.com/asset/123)}</style>"#);
        assert_eq!(records[0].resource_type, ResourceType::Image);
    }

    #[test]
    fn non_image_data_uris_skipped() {
        let records = extract(r#"<style>.x{src:url(data:font/woff2;base64,AAAA)}</style>"#);
        assert!(records.is_empty());
    }
}
