//! Quality banding. Deterministic: dimensions first, byte size second,
//! URL vocabulary last.

use mediasniff_common::{QualityBand, ResourceRecord, ResourceType};

/// Full-HD pixel count (1920x1080).
pub const PIXELS_FULL_HD: u64 = 2_073_600;
/// HD-ready pixel count (1280x720).
pub const PIXELS_HD: u64 = 921_600;
/// VGA pixel count (640x480).
pub const PIXELS_SD: u64 = 307_200;

/// The high/medium/low vocabulary used by size and URL-token heuristics.
/// Maps onto [`QualityBand`] at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeBand {
    High,
    Medium,
    Low,
}

impl SizeBand {
    pub fn to_quality(self) -> QualityBand {
        match self {
            SizeBand::High => QualityBand::Hd,
            SizeBand::Medium => QualityBand::Sd,
            SizeBand::Low => QualityBand::Ld,
        }
    }
}

const HIGH_TOKENS: &[&str] = &["high", "hd", "large", "original", "full", "max"];
const MEDIUM_TOKENS: &[&str] = &["medium", "mid", "std"];
const LOW_TOKENS: &[&str] = &["low", "small", "thumb", "preview", "mini", "tiny"];

/// Band from pixel dimensions alone.
pub fn band_from_dimensions(width: u32, height: u32) -> QualityBand {
    let pixels = u64::from(width) * u64::from(height);
    if pixels >= PIXELS_HD {
        QualityBand::Hd
    } else if pixels >= PIXELS_SD {
        QualityBand::Sd
    } else {
        QualityBand::Ld
    }
}

/// Per-type byte thresholds: image 500k/100k, video 10M/2M, audio 5M/1M.
/// Other types have no meaningful size bands.
pub fn size_band(resource_type: ResourceType, size_bytes: u64) -> Option<SizeBand> {
    let (high, medium) = match resource_type {
        ResourceType::Image => (500_000, 100_000),
        ResourceType::Video => (10_000_000, 2_000_000),
        ResourceType::Audio => (5_000_000, 1_000_000),
        ResourceType::Document | ResourceType::Other => return None,
    };
    Some(if size_bytes >= high {
        SizeBand::High
    } else if size_bytes >= medium {
        SizeBand::Medium
    } else {
        SizeBand::Low
    })
}

/// Quality vocabulary found in the URL itself, if any.
pub fn url_token_band(url: &str) -> Option<SizeBand> {
    let lower = url.to_lowercase();
    if HIGH_TOKENS.iter().any(|t| lower.contains(t)) {
        return Some(SizeBand::High);
    }
    if MEDIUM_TOKENS.iter().any(|t| lower.contains(t)) {
        return Some(SizeBand::Medium);
    }
    if LOW_TOKENS.iter().any(|t| lower.contains(t)) {
        return Some(SizeBand::Low);
    }
    None
}

/// Estimate the quality band for a record: dimensions beat size beats URL
/// vocabulary; with none of the three the band stays unknown.
pub fn quality_band(record: &ResourceRecord) -> QualityBand {
    if let (Some(w), Some(h)) = (record.width, record.height) {
        return band_from_dimensions(w, h);
    }
    if let Some(size) = record.size_bytes {
        if let Some(band) = size_band(record.resource_type, size) {
            return band.to_quality();
        }
    }
    match url_token_band(&record.url) {
        Some(band) => band.to_quality(),
        None => QualityBand::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediasniff_common::ResourceSource;

    fn record(url: &str) -> ResourceRecord {
        ResourceRecord::new(url, ResourceType::Image, ResourceSource::Dom)
    }

    #[test]
    fn dimension_bands() {
        assert_eq!(band_from_dimensions(1920, 1080), QualityBand::Hd);
        assert_eq!(band_from_dimensions(1280, 720), QualityBand::Hd);
        assert_eq!(band_from_dimensions(800, 600), QualityBand::Sd);
        assert_eq!(band_from_dimensions(640, 480), QualityBand::Sd);
        assert_eq!(band_from_dimensions(320, 240), QualityBand::Ld);
    }

    #[test]
    fn quality_monotone_in_pixel_area() {
        // Ord on QualityBand: Hd < Sd < Ld < Unknown, so growing pixel
        // area must never move the band toward a larger variant.
        let mut last = QualityBand::Ld;
        for (w, h) in [(100, 100), (640, 480), (1280, 720), (3840, 2160)] {
            let band = band_from_dimensions(w, h);
            assert!(band <= last, "band regressed at {w}x{h}");
            last = band;
        }
    }

    #[test]
    fn size_bands_per_type() {
        assert_eq!(size_band(ResourceType::Image, 600_000), Some(SizeBand::High));
        assert_eq!(size_band(ResourceType::Image, 150_000), Some(SizeBand::Medium));
        assert_eq!(size_band(ResourceType::Image, 50_000), Some(SizeBand::Low));
        assert_eq!(size_band(ResourceType::Video, 12_000_000), Some(SizeBand::High));
        assert_eq!(size_band(ResourceType::Video, 3_000_000), Some(SizeBand::Medium));
        assert_eq!(size_band(ResourceType::Audio, 6_000_000), Some(SizeBand::High));
        assert_eq!(size_band(ResourceType::Document, 1_000_000), None);
    }

    #[test]
    fn url_tokens_rank() {
        assert_eq!(
            url_token_band("https://x.com/images/original/a.jpg"),
            Some(SizeBand::High)
        );
        assert_eq!(
            url_token_band("https://x.com/images/std/a.jpg"),
            Some(SizeBand::Medium)
        );
        assert_eq!(
            url_token_band("https://x.com/thumb/a.jpg"),
            Some(SizeBand::Low)
        );
        assert_eq!(url_token_band("https://x.com/a.jpg"), None);
    }

    #[test]
    fn band_precedence_dimensions_first() {
        let mut r = record("https://x.com/thumb/a.jpg");
        r.width = Some(1920);
        r.height = Some(1080);
        assert_eq!(quality_band(&r), QualityBand::Hd);
    }

    #[test]
    fn band_falls_back_to_size_then_tokens() {
        let mut r = record("https://x.com/a.jpg");
        r.size_bytes = Some(600_000);
        assert_eq!(quality_band(&r), QualityBand::Hd);

        let r = record("https://x.com/preview/a.jpg");
        assert_eq!(quality_band(&r), QualityBand::Ld);

        let r = record("https://x.com/a.jpg");
        assert_eq!(quality_band(&r), QualityBand::Unknown);
    }
}
