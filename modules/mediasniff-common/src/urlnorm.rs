//! URL normalization and fingerprinting. Pure functions, used everywhere.
//!
//! Normalization merges cosmetically different URLs that point at the same
//! resource: hostname case, tracking/session query parameters, fragments.
//! The fingerprint hash is deliberately weak (8 hex digits); collisions
//! are reconciled downstream by similarity clustering.

use crate::types::{Platform, ResourceType, StreamType};

/// Query parameter keys that never change the referenced resource.
const VOLATILE_QUERY_KEYS: &[&str] = &[
    "sid", "session", "timestamp", "time", "t", "rand", "r", "nonce", "_", "v",
];

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "svg", "bmp", "ico"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov", "avi", "mkv", "flv", "wmv", "m4v"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "aac", "flac", "m4a"];
const STREAM_EXTENSIONS: &[&str] = &["m3u8", "mpd"];
const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx"];

/// Normalize a URL for identity comparison: lowercase the hostname, keep
/// the path, drop volatile query parameters (preserving the order of the
/// rest), omit the fragment. Malformed URLs come back unchanged.
pub fn normalize(url: &str) -> String {
    let parsed = match url::Url::parse(url) {
        Ok(u) => u,
        Err(_) => return url.to_string(),
    };
    if parsed.scheme() == "data" || parsed.scheme() == "blob" {
        return url.to_string();
    }

    let mut out = format!("{}://", parsed.scheme());
    if let Some(host) = parsed.host_str() {
        out.push_str(&host.to_lowercase());
    }
    if let Some(port) = parsed.port() {
        out.push_str(&format!(":{port}"));
    }
    out.push_str(parsed.path());

    if let Some(query) = parsed.query() {
        let kept: Vec<&str> = query
            .split('&')
            .filter(|pair| {
                let key = pair.split('=').next().unwrap_or(pair);
                !VOLATILE_QUERY_KEYS
                    .iter()
                    .any(|vk| key.eq_ignore_ascii_case(vk))
            })
            .collect();
        if !kept.is_empty() {
            out.push('?');
            out.push_str(&kept.join("&"));
        }
    }

    out
}

/// Hash the normalized form of a URL into an 8-hex-digit string using the
/// `h = (h << 5) - h + codepoint` mix over a 32-bit accumulator. Falls
/// back to hashing the raw string when the URL does not parse.
pub fn url_fingerprint(url: &str) -> String {
    let normalized = normalize(url);
    let mut h: i32 = 0;
    for cp in normalized.chars() {
        h = h.wrapping_shl(5).wrapping_sub(h).wrapping_add(cp as i32);
    }
    format!("{:08x}", i64::from(h).unsigned_abs())
}

/// Resource-level fingerprint. A content hash, when known, dominates;
/// otherwise type, size, and dimensions disambiguate same-URL variants.
pub fn resource_fingerprint(record: &crate::types::ResourceRecord) -> String {
    let url_fp = url_fingerprint(&record.url);
    if let Some(hash) = &record.content_hash {
        return format!("{url_fp}:{hash}");
    }
    let dims = match (record.width, record.height) {
        (Some(w), Some(h)) => format!("{w}x{h}"),
        _ => String::new(),
    };
    let size = record.size_bytes.map(|s| format!("{s:x}")).unwrap_or_default();
    format!("{url_fp}:{}:{}:{}", record.resource_type, size, dims)
}

/// Resolve a possibly-relative URL against a base. data: and blob: URLs
/// pass through unchanged; anything unresolvable comes back as given.
pub fn resolve(url: &str, base_url: &str) -> String {
    if url.starts_with("data:") || url.starts_with("blob:") {
        return url.to_string();
    }
    if url::Url::parse(url).is_ok() {
        return url.to_string();
    }
    match url::Url::parse(base_url) {
        Ok(base) => match base.join(url) {
            Ok(joined) => joined.to_string(),
            Err(_) => url.to_string(),
        },
        Err(_) => url.to_string(),
    }
}

/// Lowercased extension of the URL path, if any.
pub fn extension(url: &str) -> Option<String> {
    let path = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .rsplit('/')
        .next()
        .unwrap_or("");
    let (stem, ext) = path.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > 5 {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Whether the URL's extension maps to a known media or document type.
pub fn is_media_url(url: &str) -> bool {
    match extension(url) {
        Some(ext) => {
            let ext = ext.as_str();
            IMAGE_EXTENSIONS.contains(&ext)
                || VIDEO_EXTENSIONS.contains(&ext)
                || AUDIO_EXTENSIONS.contains(&ext)
                || STREAM_EXTENSIONS.contains(&ext)
                || DOCUMENT_EXTENSIONS.contains(&ext)
        }
        None => false,
    }
}

/// Coarse media class from a MIME type and/or URL extension. The MIME
/// observation wins when both are available.
pub fn infer_type(url: &str, content_type: Option<&str>) -> ResourceType {
    if let Some(mime) = content_type {
        let mime = mime.split(';').next().unwrap_or(mime).trim().to_lowercase();
        if mime.starts_with("image/") {
            return ResourceType::Image;
        }
        if mime.starts_with("video/") || is_stream_mime(&mime) {
            return ResourceType::Video;
        }
        if mime.starts_with("audio/") {
            return ResourceType::Audio;
        }
        if mime == "application/pdf"
            || mime.starts_with("application/msword")
            || mime.starts_with("application/vnd.openxmlformats")
            || mime.starts_with("application/vnd.ms-")
        {
            return ResourceType::Document;
        }
    }
    match extension(url).as_deref() {
        Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => ResourceType::Image,
        Some(ext) if VIDEO_EXTENSIONS.contains(&ext) => ResourceType::Video,
        Some(ext) if STREAM_EXTENSIONS.contains(&ext) => ResourceType::Video,
        Some(ext) if AUDIO_EXTENSIONS.contains(&ext) => ResourceType::Audio,
        Some(ext) if DOCUMENT_EXTENSIONS.contains(&ext) => ResourceType::Document,
        _ => ResourceType::Other,
    }
}

fn is_stream_mime(mime: &str) -> bool {
    matches!(
        mime,
        "application/vnd.apple.mpegurl"
            | "application/x-mpegurl"
            | "audio/mpegurl"
            | "application/dash+xml"
            | "application/vnd.ms-sstr+xml"
    )
}

/// Streaming manifest classification from URL and MIME.
pub fn detect_stream(url: &str, content_type: Option<&str>) -> Option<StreamType> {
    if let Some(mime) = content_type {
        let mime = mime.split(';').next().unwrap_or(mime).trim().to_lowercase();
        match mime.as_str() {
            "application/vnd.apple.mpegurl" | "application/x-mpegurl" | "audio/mpegurl" => {
                return Some(StreamType::Hls)
            }
            "application/dash+xml" => return Some(StreamType::Dash),
            "application/vnd.ms-sstr+xml" => return Some(StreamType::Smooth),
            _ => {}
        }
    }
    match extension(url).as_deref() {
        Some("m3u8") => Some(StreamType::Hls),
        Some("mpd") => Some(StreamType::Dash),
        _ if url.to_lowercase().contains("/manifest") && url.to_lowercase().contains("smooth") => {
            Some(StreamType::Smooth)
        }
        _ => None,
    }
}

/// Recognize a hosting platform by hostname substring.
pub fn extract_platform(url: &str) -> Option<Platform> {
    let host = url
        .split("://")
        .nth(1)
        .unwrap_or(url)
        .split('/')
        .next()
        .unwrap_or("")
        .to_lowercase();

    const TABLE: &[(&str, Platform)] = &[
        ("youtube", Platform::Youtube),
        ("ytimg", Platform::Youtube),
        ("youtu.be", Platform::Youtube),
        ("vimeo", Platform::Vimeo),
        ("facebook", Platform::Facebook),
        ("fbcdn", Platform::Facebook),
        ("instagram", Platform::Instagram),
        ("cdninstagram", Platform::Instagram),
        ("twitter", Platform::Twitter),
        ("twimg", Platform::Twitter),
        ("x.com", Platform::Twitter),
        ("tiktok", Platform::Tiktok),
        ("pinterest", Platform::Pinterest),
        ("pinimg", Platform::Pinterest),
        ("imgur", Platform::Imgur),
        ("giphy", Platform::Giphy),
        ("unsplash", Platform::Unsplash),
        ("pexels", Platform::Pexels),
        ("flickr", Platform::Flickr),
        ("staticflickr", Platform::Flickr),
        ("500px", Platform::FiveHundredPx),
        ("shutterstock", Platform::Shutterstock),
        ("gettyimages", Platform::Getty),
    ];

    TABLE
        .iter()
        .find(|(needle, _)| host.contains(needle))
        .map(|(_, p)| *p)
}

/// Whether the host looks like a CDN or asset server.
pub fn is_cdn_host(url: &str) -> bool {
    let host = url
        .split("://")
        .nth(1)
        .unwrap_or(url)
        .split('/')
        .next()
        .unwrap_or("")
        .to_lowercase();
    ["cdn", "static", "media", "assets", "content"]
        .iter()
        .any(|needle| host.contains(needle))
}

/// Derive a filename from the URL path; "resource" when the path has none.
pub fn filename_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let candidate = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("")
        .trim();
    if candidate.is_empty() || candidate.contains("://") || !candidate.contains('.') {
        "resource".to_string()
    } else {
        candidate.to_string()
    }
}
