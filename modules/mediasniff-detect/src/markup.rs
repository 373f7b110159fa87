//! Shared regex helpers for scanning raw markup. The extractors work over
//! serialized HTML handed across the host boundary; there is no live DOM
//! here, so tag and attribute scanning is pattern-based.

use regex::Regex;

/// All open-tag texts for `tag`, e.g. `<img src="...">` without children.
pub fn open_tags<'a>(html: &'a str, tag: &str) -> Vec<&'a str> {
    let re = Regex::new(&format!(r"(?is)<{tag}\b[^>]*>")).expect("valid regex");
    re.find_iter(html).map(|m| m.as_str()).collect()
}

/// First value of `name=` inside one tag text. Handles double-quoted,
/// single-quoted, and bare attribute values. The leading character class
/// keeps `src` from matching inside `data-src` (a word boundary alone
/// treats the hyphen as a break).
pub fn attr(tag_text: &str, name: &str) -> Option<String> {
    let re = Regex::new(&format!(
        r#"(?is)[^\w-]{name}\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>"']+))"#
    ))
    .expect("valid regex");
    let caps = re.captures(tag_text)?;
    let value = caps
        .get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))?
        .as_str()
        .trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Parse a `srcset` attribute into (url, width) candidates. Width comes
/// from `NNNw` descriptors; density descriptors (`2x`) yield no width.
pub fn parse_srcset(srcset: &str) -> Vec<(String, Option<u32>)> {
    srcset
        .split(',')
        .filter_map(|candidate| {
            let mut parts = candidate.split_whitespace();
            let url = parts.next()?.trim();
            if url.is_empty() {
                return None;
            }
            let width = parts.next().and_then(|descriptor| {
                descriptor
                    .strip_suffix('w')
                    .and_then(|n| n.parse::<u32>().ok())
            });
            Some((url.to_string(), width))
        })
        .collect()
}

/// Largest-width candidate from a srcset, falling back to the last entry
/// when no candidate carries a width descriptor.
pub fn best_srcset_candidate(srcset: &str) -> Option<(String, Option<u32>)> {
    let candidates = parse_srcset(srcset);
    candidates
        .iter()
        .filter(|(_, w)| w.is_some())
        .max_by_key(|(_, w)| w.unwrap_or(0))
        .cloned()
        .or_else(|| candidates.into_iter().last())
}

/// Numeric pixel dimension from a width/height attribute. Percentages and
/// other units are ignored.
pub fn parse_dimension(value: &str) -> Option<u32> {
    let trimmed = value.trim().trim_end_matches("px");
    trimmed.parse::<u32>().ok().filter(|v| *v > 0)
}

/// Every `url(...)` reference in a CSS fragment.
pub fn css_urls(css: &str) -> Vec<String> {
    let re = Regex::new(r#"(?i)url\(\s*['"]?([^'")\s]+)['"]?\s*\)"#).expect("valid regex");
    re.captures_iter(css)
        .map(|caps| caps[1].to_string())
        .collect()
}
