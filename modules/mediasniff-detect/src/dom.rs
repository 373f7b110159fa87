//! Visible-markup extraction: img/video/audio/source/picture elements and
//! direct links to media files.

use anyhow::Result;
use mediasniff_common::{urlnorm, ResourceRecord, ResourceSource, ResourceType, SnifferConfig};

use crate::context::ExtractionContext;
use crate::markup;
use crate::traits::Extractor;

pub struct DomExtractor;

impl Extractor for DomExtractor {
    fn name(&self) -> &'static str {
        "dom"
    }

    fn enabled(&self, config: &SnifferConfig) -> bool {
        config.enable_dom_detection
    }

    fn extract(&self, ctx: &ExtractionContext) -> Result<Vec<ResourceRecord>> {
        let mut records = Vec::new();
        scan_markup(&ctx.html, ResourceSource::Dom, &mut records);
        Ok(records)
    }
}

/// Core tag scan, shared with the shadow-DOM extractor which re-runs it
/// over template contents.
pub(crate) fn scan_markup(html: &str, source: ResourceSource, out: &mut Vec<ResourceRecord>) {
    for tag in markup::open_tags(html, "img") {
        let mut candidates = Vec::new();
        if let Some(src) = markup::attr(tag, "src") {
            candidates.push((src, None));
        }
        if let Some(srcset) = markup::attr(tag, "srcset") {
            if let Some(best) = markup::best_srcset_candidate(&srcset) {
                candidates.push(best);
            }
        }
        for (url, srcset_width) in candidates {
            let mut record = ResourceRecord::new(url, ResourceType::Image, source);
            record.width = markup::attr(tag, "width")
                .as_deref()
                .and_then(markup::parse_dimension)
                .or(srcset_width);
            record.height = markup::attr(tag, "height")
                .as_deref()
                .and_then(markup::parse_dimension);
            out.push(record);
        }
    }

    for tag in markup::open_tags(html, "video") {
        if let Some(src) = markup::attr(tag, "src") {
            let mut record = ResourceRecord::new(src, ResourceType::Video, source);
            record.width = markup::attr(tag, "width")
                .as_deref()
                .and_then(markup::parse_dimension);
            record.height = markup::attr(tag, "height")
                .as_deref()
                .and_then(markup::parse_dimension);
            out.push(record);
        }
        if let Some(poster) = markup::attr(tag, "poster") {
            out.push(ResourceRecord::new(poster, ResourceType::Image, source));
        }
    }

    for tag in markup::open_tags(html, "audio") {
        if let Some(src) = markup::attr(tag, "src") {
            out.push(ResourceRecord::new(src, ResourceType::Audio, source));
        }
    }

    // <source> serves picture, video, and audio parents alike; the type
    // attribute or extension decides the class.
    for tag in markup::open_tags(html, "source") {
        let url = match markup::attr(tag, "src").or_else(|| {
            markup::attr(tag, "srcset")
                .and_then(|s| markup::best_srcset_candidate(&s))
                .map(|(u, _)| u)
        }) {
            Some(u) => u,
            None => continue,
        };
        let mime = markup::attr(tag, "type");
        let resource_type = urlnorm::infer_type(&url, mime.as_deref());
        let resource_type = if resource_type == ResourceType::Other {
            ResourceType::Image
        } else {
            resource_type
        };
        let mut record = ResourceRecord::new(url, resource_type, source);
        record.content_type = mime;
        out.push(record);
    }

    for tag in markup::open_tags(html, "a") {
        if let Some(href) = markup::attr(tag, "href") {
            if urlnorm::is_media_url(&href) {
                let resource_type = urlnorm::infer_type(&href, None);
                out.push(ResourceRecord::new(href, resource_type, source));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(html: &str) -> Vec<ResourceRecord> {
        DomExtractor
            .extract(&ExtractionContext::for_page("https://example.com/", html))
            .unwrap()
    }

    #[test]
    fn img_src_with_dimensions() {
        let records = extract(r#"<img src="photo.jpg" width="800" height="600">"#);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, "photo.jpg");
        assert_eq!(records[0].resource_type, ResourceType::Image);
        assert_eq!(records[0].width, Some(800));
        assert_eq!(records[0].height, Some(600));
    }

    #[test]
    fn img_srcset_takes_largest() {
        let records =
            extract(r#"<img srcset="s.jpg 320w, l.jpg 1600w, m.jpg 800w" alt="x">"#);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, "l.jpg");
        assert_eq!(records[0].width, Some(1600));
    }

    #[test]
    fn video_yields_video_and_poster() {
        let records = extract(r#"<video src="clip.mp4" poster="frame.jpg"></video>"#);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].resource_type, ResourceType::Video);
        assert_eq!(records[1].url, "frame.jpg");
        assert_eq!(records[1].resource_type, ResourceType::Image);
    }

    #[test]
    fn source_tag_classified_by_type_attr() {
        let records = extract(r#"<source src="track.ogg" type="audio/ogg">"#);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].resource_type, ResourceType::Audio);
        assert_eq!(records[0].content_type.as_deref(), Some("audio/ogg"));
    }

    #[test]
    fn anchors_only_when_media_extension() {
        let records = extract(
            r#"<a href="file.pdf">doc</a><a href="page.html">page</a><a href="movie.webm">v</a>"#,
        );
        let urls: Vec<&str> = records.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["file.pdf", "movie.webm"]);
        assert_eq!(records[0].resource_type, ResourceType::Document);
    }

    #[test]
    fn empty_markup_yields_nothing() {
        assert!(extract("<p>no media here</p>").is_empty());
    }
}
