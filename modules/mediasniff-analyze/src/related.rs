//! Related-resource pattern templates. These are regex *strings* handed
//! back as informational metadata (gallery siblings for images, poster
//! frames for videos). Nothing in the core executes them.

use mediasniff_common::{ResourceRecord, ResourceType};
use regex::Regex;

/// Regex templates matching resources likely related to `record`.
pub fn related_patterns(record: &ResourceRecord) -> Vec<String> {
    let path = record.url.split(['?', '#']).next().unwrap_or(&record.url);
    let (dir, filename) = match path.rsplit_once('/') {
        Some(split) => split,
        None => return Vec::new(),
    };
    let (stem, ext) = match filename.rsplit_once('.') {
        Some(split) => split,
        None => return Vec::new(),
    };

    let mut patterns = Vec::new();
    let escaped_dir = regex::escape(dir);
    let escaped_stem = regex::escape(stem);
    let escaped_ext = regex::escape(ext);

    match record.resource_type {
        ResourceType::Image => {
            // Numbered gallery siblings: photo_03.jpg -> photo_\d+.jpg
            let trailing_digits = Regex::new(r"\d+$").expect("valid regex");
            if trailing_digits.is_match(stem) {
                let generic_stem = trailing_digits
                    .replace(&escaped_stem, r"\d+")
                    .into_owned();
                patterns.push(format!("{escaped_dir}/{generic_stem}\\.{escaped_ext}"));
            }
            // Same stem at any size suffix.
            patterns.push(format!(
                "{escaped_dir}/{escaped_stem}[-_](?:small|medium|large|thumb|\\d+x\\d+)\\.{escaped_ext}"
            ));
        }
        ResourceType::Video => {
            // Poster frame candidates alongside the video.
            patterns.push(format!(
                "{escaped_dir}/{escaped_stem}\\.(?:jpg|jpeg|png|webp)"
            ));
            patterns.push(format!(
                "{escaped_dir}/{escaped_stem}[-_](?:poster|cover|preview)\\.(?:jpg|jpeg|png|webp)"
            ));
        }
        _ => {}
    }

    patterns
}
