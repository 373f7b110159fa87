//! The three analyzer score components and their weighted combination.
//! Every component starts at 50 and is clamped to 0-100; the stored score
//! is `round(0.4*quality + 0.3*relevance + 0.3*reliability)`.

use std::collections::BTreeMap;

use mediasniff_common::{urlnorm, ResourceRecord, ResourceSource, ScoreDetail};

use crate::quality::{self, SizeBand, PIXELS_FULL_HD, PIXELS_HD, PIXELS_SD};

const RELEVANT_PATH_TOKENS: &[&str] = &["content", "media", "assets", "uploads"];

/// Word-bounded so "uploads" and "gradient" don't read as "ad".
fn has_ad_token(url: &str) -> bool {
    regex::Regex::new(r"(?i)\b(ads?|banner|promo|sponsor)\b")
        .expect("valid regex")
        .is_match(url)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scores {
    pub quality: u32,
    pub relevance: u32,
    pub reliability: u32,
    pub overall: u32,
}

/// Score a record. Pure: the same record and configuration always produce
/// the same numbers.
pub fn score(record: &ResourceRecord) -> Scores {
    let quality = quality_score(record);
    let relevance = relevance_score(record);
    let reliability = reliability_score(record);
    let overall = (0.4 * f64::from(quality)
        + 0.3 * f64::from(relevance)
        + 0.3 * f64::from(reliability))
    .round() as u32;
    Scores {
        quality,
        relevance,
        reliability,
        overall,
    }
}

/// Per-component breakdown for the record's `score_details` map.
pub fn breakdown(record: &ResourceRecord, scores: &Scores) -> BTreeMap<String, ScoreDetail> {
    let mut details = BTreeMap::new();
    let dims = match (record.width, record.height) {
        (Some(w), Some(h)) => format!("{w}x{h}"),
        _ => "unknown dimensions".to_string(),
    };
    details.insert(
        "quality".to_string(),
        ScoreDetail {
            score: scores.quality,
            value: dims,
        },
    );
    details.insert(
        "relevance".to_string(),
        ScoreDetail {
            score: scores.relevance,
            value: format!("source: {}", record.source),
        },
    );
    let host_note = if urlnorm::is_cdn_host(&record.url) {
        "cdn host"
    } else {
        "origin host"
    };
    details.insert(
        "reliability".to_string(),
        ScoreDetail {
            score: scores.reliability,
            value: host_note.to_string(),
        },
    );
    details
}

fn quality_score(record: &ResourceRecord) -> u32 {
    let mut score = 50i64;

    if let Some(pixels) = record.pixel_area() {
        score += if pixels >= PIXELS_FULL_HD {
            25
        } else if pixels >= PIXELS_HD {
            20
        } else if pixels >= PIXELS_SD {
            10
        } else {
            -5
        };
    }

    if let Some(size) = record.size_bytes {
        if let Some(band) = quality::size_band(record.resource_type, size) {
            score += match band {
                SizeBand::High => 15,
                SizeBand::Medium => 5,
                SizeBand::Low => -5,
            };
        }
    }

    match quality::url_token_band(&record.url) {
        Some(SizeBand::High) => score += 15,
        Some(SizeBand::Low) => score -= 15,
        _ => {}
    }

    if urlnorm::is_cdn_host(&record.url) {
        score += 5;
    }
    if urlnorm::extract_platform(&record.url).is_some() {
        score += 5;
    }

    clamp(score)
}

fn relevance_score(record: &ResourceRecord) -> u32 {
    let mut score = 50i64;

    score += match record.source {
        ResourceSource::Dom => 15,
        ResourceSource::Network => 10,
        ResourceSource::Predicted => -10,
        _ => 0,
    };

    let lower = record.url.to_lowercase();
    if RELEVANT_PATH_TOKENS.iter().any(|t| lower.contains(t)) {
        score += 10;
    }
    if has_ad_token(&lower) {
        score -= 15;
    }
    if urlnorm::extract_platform(&record.url).is_some() {
        score += 10;
    }

    clamp(score)
}

fn reliability_score(record: &ResourceRecord) -> u32 {
    let mut score = 50i64;

    score += match record.source {
        ResourceSource::Dom => 20,
        ResourceSource::Network => 15,
        ResourceSource::Css => 10,
        ResourceSource::Predicted => -15,
        _ => 0,
    };

    if urlnorm::is_cdn_host(&record.url) {
        score += 15;
    }
    if urlnorm::extract_platform(&record.url).is_some() {
        score += 15;
    }
    if record.size_bytes.is_some_and(|s| s > 0) {
        score += 10;
    }

    clamp(score)
}

fn clamp(score: i64) -> u32 {
    score.clamp(0, 100) as u32
}
