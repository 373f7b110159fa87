//! On-disk filename derivation: format templates, sanitization, and
//! conflict suffixes.

use chrono::Utc;
use mediasniff_common::{urlnorm, FilenameFormat, ResourceRecord, SnifferConfig};
use rand::Rng;

/// Characters that never reach the filesystem.
const FORBIDDEN: &[char] = &['/', '\\', '?', '%', '*', ':', '|', '"', '<', '>'];

/// Derive the on-disk filename for a record under the configured format.
/// `index` is the record's position within its batch (site-type-index
/// format and the `{index}` placeholder).
pub fn derive(record: &ResourceRecord, config: &SnifferConfig, index: usize) -> String {
    let basename = basename(&record.filename);
    let ext = extension(record);

    let raw = match config.filename_format {
        FilenameFormat::Original => format!("{basename}.{ext}"),
        FilenameFormat::TypeTimestamp => {
            format!("{}_{}.{ext}", record.resource_type, Utc::now().timestamp())
        }
        FilenameFormat::SiteTypeIndex => {
            format!("{}_{}_{index}.{ext}", site(&record.url), record.resource_type)
        }
        FilenameFormat::Custom => expand_template(
            &config.custom_filename_template,
            record,
            index,
            &basename,
            &ext,
        ),
    };

    let mut name = sanitize(&raw);
    if !name.contains('.') {
        name.push('.');
        name.push_str(&ext);
    }
    name
}

fn expand_template(
    template: &str,
    record: &ResourceRecord,
    index: usize,
    basename: &str,
    ext: &str,
) -> String {
    template
        .replace("{site}", &site(&record.url))
        .replace("{type}", &record.resource_type.to_string())
        .replace("{index}", &index.to_string())
        .replace("{timestamp}", &Utc::now().timestamp().to_string())
        .replace("{basename}", basename)
        .replace("{ext}", ext)
        .replace("{quality}", &record.quality.to_string())
        .replace("{score}", &record.score.unwrap_or(0).to_string())
}

/// Replace forbidden characters and collapse whitespace runs into `_`.
pub fn sanitize(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if FORBIDDEN.contains(&c) { '_' } else { c })
        .collect();
    let mut out = String::with_capacity(replaced.len());
    let mut in_whitespace = false;
    for c in replaced.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                out.push('_');
                in_whitespace = true;
            }
        } else {
            out.push(c);
            in_whitespace = false;
        }
    }
    out
}

/// Append `_{timestamp}_{random}` before the extension; used when the
/// target path already exists.
pub fn conflict_suffix(name: &str) -> String {
    let suffix = format!(
        "_{}_{:04}",
        Utc::now().timestamp(),
        rand::rng().random_range(0..10_000)
    );
    match name.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}{suffix}.{ext}"),
        None => format!("{name}{suffix}"),
    }
}

fn basename(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => filename.to_string(),
    }
}

fn extension(record: &ResourceRecord) -> String {
    if let Some(ext) = urlnorm::extension(&record.url) {
        return ext;
    }
    // Fall back on MIME, then on the coarse type.
    if let Some(mime) = record.content_type.as_deref() {
        if let Some(sub) = mime.split(';').next().and_then(|m| m.split('/').nth(1)) {
            let sub = sub.trim();
            if !sub.is_empty() && sub.len() <= 5 {
                return sub.to_lowercase();
            }
        }
    }
    match record.resource_type {
        mediasniff_common::ResourceType::Image => "jpg".to_string(),
        mediasniff_common::ResourceType::Video => "mp4".to_string(),
        mediasniff_common::ResourceType::Audio => "mp3".to_string(),
        _ => "bin".to_string(),
    }
}

fn site(url: &str) -> String {
    let host = url
        .split("://")
        .nth(1)
        .unwrap_or(url)
        .split('/')
        .next()
        .unwrap_or("site");
    host.trim_start_matches("www.").replace('.', "_")
}
