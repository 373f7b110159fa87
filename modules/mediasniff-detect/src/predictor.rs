//! Pattern-based prediction. Galleries and CDNs are relentlessly regular:
//! a page showing `photo_04.jpg` very likely has neighbors, and a
//! `thumb` path almost always has a `large` sibling. Predictions are
//! deterministic: confidence comes from a fixed per-pattern table, never
//! from sampling.

use anyhow::Result;
use mediasniff_common::{
    urlnorm, ResourceRecord, ResourceSource, ResourceType, SnifferConfig,
};
use regex::Regex;

use crate::context::ExtractionContext;
use crate::traits::Extractor;

/// Ceiling on predictions per page; regular galleries could otherwise
/// flood the graph.
const MAX_PREDICTIONS: usize = 12;

/// How far past the last observed sequence number to look, and the
/// confidence assigned at each step.
const SEQUENCE_CONFIDENCE: &[f32] = &[0.6, 0.45, 0.35];

/// Confidence for thumbnail-to-full substitutions.
const SUBSTITUTION_CONFIDENCE: f32 = 0.7;

pub struct PatternPredictor;

impl Extractor for PatternPredictor {
    fn name(&self) -> &'static str {
        "predicted"
    }

    fn enabled(&self, config: &SnifferConfig) -> bool {
        config.enable_predicted_detection
    }

    fn extract(&self, ctx: &ExtractionContext) -> Result<Vec<ResourceRecord>> {
        let media_re = Regex::new(
            r#"["']([^"'\s]+\.(?:jpe?g|png|gif|webp)(?:\?[^"'\s]*)?)["']"#,
        )
        .expect("valid regex");

        let observed: Vec<String> = media_re
            .captures_iter(&ctx.html)
            .map(|caps| caps[1].to_string())
            .collect();

        let mut predictions = Vec::new();
        for url in &observed {
            predict_sequence_neighbors(url, &observed, &mut predictions);
            predict_fullsize_sibling(url, &observed, &mut predictions);
            if predictions.len() >= MAX_PREDICTIONS {
                predictions.truncate(MAX_PREDICTIONS);
                break;
            }
        }

        Ok(predictions
            .into_iter()
            .map(|(url, confidence)| {
                let mut record =
                    ResourceRecord::new(url, ResourceType::Image, ResourceSource::Predicted);
                record.is_predicted = true;
                record.confidence = Some(confidence);
                record
            })
            .collect())
    }
}

/// `gallery_04.jpg` → `gallery_05.jpg`, `gallery_06.jpg`, ... with
/// decaying confidence. Zero-padding is preserved.
fn predict_sequence_neighbors(url: &str, observed: &[String], out: &mut Vec<(String, f32)>) {
    let seq_re = Regex::new(r"^(.*?)(\d+)(\.[a-z0-9]+(?:\?.*)?)$").expect("valid regex");
    let filename_start = url.rfind('/').map(|i| i + 1).unwrap_or(0);
    let (prefix, filename) = url.split_at(filename_start);

    let caps = match seq_re.captures(filename) {
        Some(c) => c,
        None => return,
    };
    let stem = &caps[1];
    let digits = &caps[2];
    let suffix = &caps[3];
    let number: u64 = match digits.parse() {
        Ok(n) => n,
        Err(_) => return,
    };

    for (step, confidence) in SEQUENCE_CONFIDENCE.iter().enumerate() {
        let next = number + step as u64 + 1;
        let candidate = format!(
            "{prefix}{stem}{next:0width$}{suffix}",
            width = digits.len()
        );
        if !observed.iter().any(|o| o == &candidate)
            && !out.iter().any(|(u, _)| u == &candidate)
        {
            out.push((candidate, *confidence));
        }
    }
}

/// `thumb`/`small`/`preview` path segments usually have a `large` sibling.
fn predict_fullsize_sibling(url: &str, observed: &[String], out: &mut Vec<(String, f32)>) {
    let token_re = Regex::new(r"(?i)\b(thumb|thumbnail|small|preview|mini|tiny)\b")
        .expect("valid regex");
    if !token_re.is_match(url) {
        return;
    }
    let candidate = token_re.replace_all(url, "large").into_owned();
    if candidate != url
        && urlnorm::is_media_url(&candidate)
        && !observed.iter().any(|o| o == &candidate)
        && !out.iter().any(|(u, _)| u == &candidate)
    {
        out.push((candidate, SUBSTITUTION_CONFIDENCE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(html: &str) -> Vec<ResourceRecord> {
        PatternPredictor
            .extract(&ExtractionContext::for_page("https://example.com/", html))
            .unwrap()
    }

    #[test]
    fn sequence_neighbors_predicted_with_padding() {
        let records = extract(r#"<img src="https://cdn.x.com/g/photo_07.jpg">"#);
        let urls: Vec<&str> = records.iter().map(|r| r.url.as_str()).collect();
        assert!(urls.contains(&"https://cdn.x.com/g/photo_08.jpg"));
        assert!(urls.contains(&"https://cdn.x.com/g/photo_09.jpg"));
        assert!(urls.contains(&"https://cdn.x.com/g/photo_10.jpg"));
    }

    #[test]
    fn observed_urls_never_predicted() {
        let html = r#"
            <img src="https://cdn.x.com/p1.jpg">
            <img src="https://cdn.x.com/p2.jpg">
        "#;
        let records = extract(html);
        assert!(records.iter().all(|r| r.url != "https://cdn.x.com/p2.jpg"));
    }

    #[test]
    fn confidence_decays_with_distance() {
        let records = extract(r#"<img src="https://cdn.x.com/img5.png">"#);
        let conf_of = |url: &str| {
            records
                .iter()
                .find(|r| r.url == url)
                .and_then(|r| r.confidence)
                .unwrap()
        };
        assert!(conf_of("https://cdn.x.com/img6.png") > conf_of("https://cdn.x.com/img7.png"));
        assert!(conf_of("https://cdn.x.com/img7.png") > conf_of("https://cdn.x.com/img8.png"));
    }

    #[test]
    fn thumb_predicts_large_sibling() {
        let records = extract(r#"<img src="https://cdn.x.com/images/thumb/cat.jpg">"#);
        assert!(records
            .iter()
            .any(|r| r.url == "https://cdn.x.com/images/large/cat.jpg"
                && r.confidence == Some(0.7)));
    }

    #[test]
    fn predictions_flagged_and_capped() {
        let html: String = (0..30)
            .map(|i| format!(r#"<img src="https://cdn.x.com/a{i}/pic_{i}0.jpg">"#))
            .collect();
        let records = extract(&html);
        assert!(records.len() <= MAX_PREDICTIONS);
        assert!(records.iter().all(|r| r.is_predicted));
        assert!(records
            .iter()
            .all(|r| r.confidence.is_some_and(|c| (0.0..=1.0).contains(&c))));
    }
}
