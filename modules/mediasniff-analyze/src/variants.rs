//! High-resolution variant synthesis. Thumbnail URLs follow conventions;
//! rewriting them often lands on the full-size asset. Synthesis is
//! generation only; candidates are deduplicated against the graph before
//! insertion.

use mediasniff_common::{
    urlnorm, Platform, ResourceRecord, ResourceSource, ResourceType,
};
use regex::Regex;

/// Ceiling on synthesised variants per source record.
pub const MAX_VARIANTS: usize = 8;

/// Ordered candidate URLs for a higher-resolution version of `url`.
/// Generic rewrites run first, platform-specific rules last; duplicates
/// and non-rewrites are dropped, and the list is capped at
/// [`MAX_VARIANTS`].
pub fn high_res_candidates(url: &str) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();
    let mut push = |candidate: String| {
        if candidate != url && !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    };

    let size_word = Regex::new(r"(?i)(thumb|small|preview|low|mobile)").expect("valid regex");
    if size_word.is_match(url) {
        push(size_word.replace_all(url, "large").into_owned());
    }

    let dims = Regex::new(r"(\d+)x(\d+)").expect("valid regex");
    if let Some(caps) = dims.captures(url) {
        let (w, h): (u64, u64) = (
            caps[1].parse().unwrap_or(0),
            caps[2].parse().unwrap_or(0),
        );
        if w > 0 && h > 0 {
            push(
                dims.replace(url, format!("{}x{}", w * 2, h * 2).as_str())
                    .into_owned(),
            );
        }
    }

    let size_suffix = Regex::new(r"_[sm]\.").expect("valid regex");
    if size_suffix.is_match(url) {
        push(size_suffix.replace(url, "_l.").into_owned());
    }

    let dim_suffix = Regex::new(r"-\d+x\d+\.").expect("valid regex");
    if dim_suffix.is_match(url) {
        push(dim_suffix.replace(url, ".").into_owned());
    }

    // Platform ladders list every known rung, the source's own included;
    // `variant_records` filters the identity entry before insertion.
    for candidate in platform_candidates(url) {
        if !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    }

    candidates.truncate(MAX_VARIANTS);
    candidates
}

fn platform_candidates(url: &str) -> Vec<String> {
    match urlnorm::extract_platform(url) {
        Some(Platform::Youtube) => {
            let vi_thumb =
                Regex::new(r"(?P<base>https?://[^/]*ytimg\.[^/]+/vi/[^/]+/)[^/?]+\.jpg")
                    .expect("valid regex");
            match vi_thumb.captures(url) {
                Some(caps) => ["maxresdefault", "sddefault", "hqdefault"]
                    .iter()
                    .map(|name| format!("{}{name}.jpg", &caps["base"]))
                    .collect(),
                None => Vec::new(),
            }
        }
        Some(Platform::Twitter) if url.contains("twimg") => {
            let base = url.split('?').next().unwrap_or(url);
            vec![
                format!("{base}?format=jpg&name=large"),
                format!("{base}?format=jpg&name=orig"),
            ]
        }
        Some(Platform::Instagram) => {
            let size_segment = Regex::new(r"/(?:e\d+|s\d+x\d+|p\d+x\d+)/").expect("valid regex");
            // Segments can be adjacent (/e35/s640x640/); replace until the
            // URL stops changing.
            let mut stripped = url.to_string();
            loop {
                let next = size_segment.replace(&stripped, "/").into_owned();
                if next == stripped {
                    break;
                }
                stripped = next;
            }
            if stripped != url {
                vec![stripped]
            } else {
                Vec::new()
            }
        }
        _ => Vec::new(),
    }
}

/// Turn candidates into predicted-variant records: 4x the source's size
/// estimate, 0.8x its confidence, back-linked through `original_url`.
pub fn variant_records(source: &ResourceRecord) -> Vec<ResourceRecord> {
    if source.resource_type != ResourceType::Image {
        return Vec::new();
    }
    let base_confidence = source.confidence.unwrap_or(1.0);
    high_res_candidates(&source.url)
        .into_iter()
        .filter(|candidate| candidate != &source.url)
        .map(|candidate| {
            let mut record =
                ResourceRecord::new(candidate, ResourceType::Image, ResourceSource::Predicted);
            record.is_predicted = true;
            record.is_predicted_variant = true;
            record.original_url = Some(source.url.clone());
            record.size_bytes = source.size_bytes.map(|s| s.saturating_mul(4));
            record.confidence = Some((base_confidence * 0.8).clamp(0.0, 1.0));
            record.timestamp = source.timestamp;
            record
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediasniff_common::ResourceSource;

    #[test]
    fn size_words_rewritten_to_large() {
        let candidates = high_res_candidates("https://x.com/images/thumb/pic.jpg");
        assert!(candidates.contains(&"https://x.com/images/large/pic.jpg".to_string()));
    }

    #[test]
    fn dimensions_doubled() {
        let candidates = high_res_candidates("https://x.com/pic_320x240.jpg");
        assert!(candidates.contains(&"https://x.com/pic_640x480.jpg".to_string()));
    }

    #[test]
    fn flickr_style_suffix_upgraded() {
        let candidates = high_res_candidates("https://live.staticflickr.com/1/2_m.jpg");
        assert!(candidates.contains(&"https://live.staticflickr.com/1/2_l.jpg".to_string()));
    }

    #[test]
    fn wordpress_dim_suffix_stripped() {
        let candidates = high_res_candidates("https://blog.x.com/wp/img-1024x768.png");
        assert!(candidates.contains(&"https://blog.x.com/wp/img.png".to_string()));
    }

    #[test]
    fn youtube_thumbnail_ladder() {
        let candidates =
            high_res_candidates("https://i.ytimg.com/vi/ABC123/hqdefault.jpg");
        assert!(candidates.contains(&"https://i.ytimg.com/vi/ABC123/maxresdefault.jpg".to_string()));
        assert!(candidates.contains(&"https://i.ytimg.com/vi/ABC123/sddefault.jpg".to_string()));
        assert!(candidates.contains(&"https://i.ytimg.com/vi/ABC123/hqdefault.jpg".to_string()));
    }

    #[test]
    fn twitter_media_gets_name_params() {
        let candidates = high_res_candidates("https://pbs.twimg.com/media/abc123.jpg");
        assert!(candidates
            .contains(&"https://pbs.twimg.com/media/abc123.jpg?format=jpg&name=large".to_string()));
        assert!(candidates
            .contains(&"https://pbs.twimg.com/media/abc123.jpg?format=jpg&name=orig".to_string()));
    }

    #[test]
    fn instagram_size_segments_stripped() {
        let candidates = high_res_candidates(
            "https://scontent.cdninstagram.com/v/t51/e35/s640x640/photo.jpg",
        );
        assert!(candidates
            .contains(&"https://scontent.cdninstagram.com/v/t51/photo.jpg".to_string()));
    }

    #[test]
    fn candidate_count_capped() {
        // A URL matching several rules still stays under the cap.
        let candidates =
            high_res_candidates("https://cdn.x.com/thumb/small/pic_100x100_s.-200x200.jpg");
        assert!(candidates.len() <= MAX_VARIANTS);
    }

    #[test]
    fn variant_records_carry_provenance() {
        let mut source = ResourceRecord::new(
            "https://x.com/thumb/pic.jpg",
            ResourceType::Image,
            ResourceSource::Dom,
        );
        source.size_bytes = Some(40_000);
        source.confidence = Some(0.9);
        let variants = variant_records(&source);
        assert!(!variants.is_empty());
        for v in &variants {
            assert!(v.is_predicted_variant);
            assert!(v.is_predicted);
            assert_eq!(v.original_url.as_deref(), Some("https://x.com/thumb/pic.jpg"));
            assert_eq!(v.size_bytes, Some(160_000));
            let confidence = v.confidence.unwrap();
            assert!((confidence - 0.72).abs() < 1e-6);
        }
    }

    #[test]
    fn non_images_produce_no_variants() {
        let source = ResourceRecord::new(
            "https://x.com/thumb/clip.mp4",
            ResourceType::Video,
            ResourceSource::Dom,
        );
        assert!(variant_records(&source).is_empty());
    }
}
