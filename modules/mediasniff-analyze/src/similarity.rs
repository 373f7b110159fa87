//! Pairwise similarity used by the deduplicator's clustering pass.

use mediasniff_common::ResourceRecord;
use regex::Regex;

/// Weighted similarity: URL shape dominates, dimensions refine, filename
/// breaks ties.
pub fn similarity(a: &ResourceRecord, b: &ResourceRecord) -> f64 {
    0.5 * affix_ratio(&a.url, &b.url)
        + 0.3 * dimension_similarity(a, b)
        + 0.2 * affix_ratio(&a.filename, &b.filename)
}

/// Normalized common-prefix-plus-suffix ratio: `2*(|cp|+|cs|)/(|a|+|b|)`.
/// Symmetric, in [0,1], and 1 exactly when the strings are equal.
pub fn affix_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();
    let min_len = a_bytes.len().min(b_bytes.len());

    let mut prefix = 0;
    while prefix < min_len && a_bytes[prefix] == b_bytes[prefix] {
        prefix += 1;
    }
    let mut suffix = 0;
    while suffix < min_len - prefix
        && a_bytes[a_bytes.len() - 1 - suffix] == b_bytes[b_bytes.len() - 1 - suffix]
    {
        suffix += 1;
    }

    2.0 * (prefix + suffix) as f64 / (a_bytes.len() + b_bytes.len()) as f64
}

/// Area ratio when both records carry dimensions; indifferent (1.0)
/// otherwise.
pub fn dimension_similarity(a: &ResourceRecord, b: &ResourceRecord) -> f64 {
    match (a.pixel_area(), b.pixel_area()) {
        (Some(area_a), Some(area_b)) if area_a > 0 && area_b > 0 => {
            let (small, large) = if area_a <= area_b {
                (area_a, area_b)
            } else {
                (area_b, area_a)
            };
            small as f64 / large as f64
        }
        _ => 1.0,
    }
}

/// Secondary-group key: hostname plus a path pattern that erases numeric
/// segments, long hex identifiers, size suffixes, and the extension, so
/// gallery siblings and size variants land in one bucket.
pub fn path_pattern(url: &str) -> (String, String) {
    let without_scheme = url.split("://").nth(1).unwrap_or(url);
    let without_query = without_scheme.split(['?', '#']).next().unwrap_or(without_scheme);
    let mut segments = without_query.split('/');
    let host = segments.next().unwrap_or("").to_lowercase();

    let numeric = Regex::new(r"^\d+$").expect("valid regex");
    let long_hex = Regex::new(r"^[0-9a-fA-F]{8,}$").expect("valid regex");
    let dim_suffix = Regex::new(r"-\d+x\d+").expect("valid regex");
    let size_suffix =
        Regex::new(r"-(?:small|medium|large|thumb|preview)").expect("valid regex");
    let extension = Regex::new(r"\.[A-Za-z0-9]+$").expect("valid regex");

    let normalized: Vec<String> = segments
        .map(|segment| {
            if numeric.is_match(segment) {
                "N".to_string()
            } else if long_hex.is_match(segment) {
                "ID".to_string()
            } else {
                let s = dim_suffix.replace_all(segment, "");
                let s = size_suffix.replace_all(&s, "");
                extension.replace(&s, ".EXT").into_owned()
            }
        })
        .collect();

    (host, format!("/{}", normalized.join("/")))
}
