use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque per-tab identifier. The browser host assigns these; the core
/// only uses them as map keys.
pub type TabId = String;

// --- Coarse media classes ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Image,
    Video,
    Audio,
    Document,
    Other,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceType::Image => write!(f, "image"),
            ResourceType::Video => write!(f, "video"),
            ResourceType::Audio => write!(f, "audio"),
            ResourceType::Document => write!(f, "document"),
            ResourceType::Other => write!(f, "other"),
        }
    }
}

impl std::str::FromStr for ResourceType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            "document" => Ok(Self::Document),
            "other" => Ok(Self::Other),
            other => Err(format!("unknown ResourceType: {other}")),
        }
    }
}

// --- Discovery provenance ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceSource {
    Dom,
    Css,
    ShadowDom,
    Attribute,
    Nested,
    Streaming,
    Predicted,
    Network,
}

impl std::fmt::Display for ResourceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceSource::Dom => write!(f, "dom"),
            ResourceSource::Css => write!(f, "css"),
            ResourceSource::ShadowDom => write!(f, "shadow_dom"),
            ResourceSource::Attribute => write!(f, "attribute"),
            ResourceSource::Nested => write!(f, "nested"),
            ResourceSource::Streaming => write!(f, "streaming"),
            ResourceSource::Predicted => write!(f, "predicted"),
            ResourceSource::Network => write!(f, "network"),
        }
    }
}

impl std::str::FromStr for ResourceSource {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dom" => Ok(Self::Dom),
            "css" => Ok(Self::Css),
            "shadow_dom" => Ok(Self::ShadowDom),
            "attribute" => Ok(Self::Attribute),
            "nested" => Ok(Self::Nested),
            "streaming" => Ok(Self::Streaming),
            "predicted" => Ok(Self::Predicted),
            "network" => Ok(Self::Network),
            other => Err(format!("unknown ResourceSource: {other}")),
        }
    }
}

// --- Quality band ---

/// Coarse resolution/size band. Distinct from the 0-100 analyzer score.
/// This is the one canonical set; the high/medium/low vocabulary used by
/// byte-size and URL-token heuristics maps onto it at the boundary.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum QualityBand {
    Hd,
    Sd,
    Ld,
    #[default]
    Unknown,
}

impl std::fmt::Display for QualityBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualityBand::Hd => write!(f, "hd"),
            QualityBand::Sd => write!(f, "sd"),
            QualityBand::Ld => write!(f, "ld"),
            QualityBand::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for QualityBand {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hd" => Ok(Self::Hd),
            "sd" => Ok(Self::Sd),
            "ld" => Ok(Self::Ld),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown QualityBand: {other}")),
        }
    }
}

// --- Streaming manifests ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
    Hls,
    Dash,
    Smooth,
    #[default]
    Unknown,
}

impl std::fmt::Display for StreamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamType::Hls => write!(f, "hls"),
            StreamType::Dash => write!(f, "dash"),
            StreamType::Smooth => write!(f, "smooth"),
            StreamType::Unknown => write!(f, "unknown"),
        }
    }
}

// --- Recognized media platforms ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Youtube,
    Vimeo,
    Facebook,
    Instagram,
    Twitter,
    Tiktok,
    Pinterest,
    Imgur,
    Giphy,
    Unsplash,
    Pexels,
    Flickr,
    FiveHundredPx,
    Shutterstock,
    Getty,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Youtube => write!(f, "youtube"),
            Platform::Vimeo => write!(f, "vimeo"),
            Platform::Facebook => write!(f, "facebook"),
            Platform::Instagram => write!(f, "instagram"),
            Platform::Twitter => write!(f, "twitter"),
            Platform::Tiktok => write!(f, "tiktok"),
            Platform::Pinterest => write!(f, "pinterest"),
            Platform::Imgur => write!(f, "imgur"),
            Platform::Giphy => write!(f, "giphy"),
            Platform::Unsplash => write!(f, "unsplash"),
            Platform::Pexels => write!(f, "pexels"),
            Platform::Flickr => write!(f, "flickr"),
            Platform::FiveHundredPx => write!(f, "500px"),
            Platform::Shutterstock => write!(f, "shutterstock"),
            Platform::Getty => write!(f, "getty"),
        }
    }
}

// --- Score breakdown ---

/// One component of the analyzer score, with the observation that drove it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreDetail {
    pub score: u32,
    /// Human-readable note on what the component saw ("1920x1080", "cdn host").
    pub value: String,
}

// --- The canonical resource record ---

/// The canonical entity flowing through every pipeline. Created by an
/// extractor, mutated only by the analyzer and the deduplicator, destroyed
/// when the owning tab's graph is cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Absolute URL. Authoritative identity input: unique within a tab graph.
    pub url: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    /// MIME as observed from a header or inferred from the extension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub source: ResourceSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub quality: QualityBand,
    /// Derived from the URL path, or a substituted default.
    pub filename: String,
    /// First observation time.
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_type: Option<StreamType>,
    #[serde(default)]
    pub is_predicted: bool,
    #[serde(default)]
    pub is_predicted_variant: bool,
    /// Present on predicted records, in [0, 1].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    /// Analyzer output, 0-100. Pure function of the other fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub score_details: BTreeMap<String, ScoreDetail>,
    /// Non-null after analysis. Exactly one graph representative per value
    /// after dedup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    /// Back-links after dedup. Stored as URL strings, never owning pointers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similar_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<String>,
    /// Set when this record was synthesised as a variant of another.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,
    /// Links network-sourced records to their response events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Content hash when the body has been observed; strengthens fingerprints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl ResourceRecord {
    /// Create a record with bookkeeping defaults. The filename falls back
    /// to "resource" when the URL path has none.
    pub fn new(url: impl Into<String>, resource_type: ResourceType, source: ResourceSource) -> Self {
        let url = url.into();
        let filename = crate::urlnorm::filename_from_url(&url);
        Self {
            url,
            resource_type,
            content_type: None,
            source,
            width: None,
            height: None,
            size_bytes: None,
            quality: QualityBand::Unknown,
            filename,
            timestamp: Utc::now(),
            is_stream: false,
            stream_type: None,
            is_predicted: false,
            is_predicted_variant: false,
            confidence: None,
            score: None,
            score_details: BTreeMap::new(),
            fingerprint: None,
            similar_to: None,
            similarity: None,
            duplicate_of: None,
            original_url: None,
            request_id: None,
            content_hash: None,
        }
    }

    /// Pixel area when both dimensions are known.
    pub fn pixel_area(&self) -> Option<u64> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some(u64::from(w) * u64::from(h)),
            _ => None,
        }
    }

    /// Ranking weight used by the merge rule and the dedup representative
    /// rule. Base 50; quality band +30/+15/-10; pixel area >=1MP +20,
    /// >=0.25MP +10; large sizes +10; dom provenance +10; plus
    /// confidence * 10.
    pub fn quality_weight(&self) -> f64 {
        let mut w = 50.0;
        w += match self.quality {
            QualityBand::Hd => 30.0,
            QualityBand::Sd => 15.0,
            QualityBand::Ld => -10.0,
            QualityBand::Unknown => 0.0,
        };
        if let Some(area) = self.pixel_area() {
            if area >= 1_000_000 {
                w += 20.0;
            } else if area >= 250_000 {
                w += 10.0;
            }
        }
        if let Some(size) = self.size_bytes {
            match self.resource_type {
                ResourceType::Image if size >= 500_000 => w += 10.0,
                ResourceType::Video if size >= 5_000_000 => w += 10.0,
                _ => {}
            }
        }
        if self.source == ResourceSource::Dom {
            w += 10.0;
        }
        if let Some(c) = self.confidence {
            w += f64::from(c) * 10.0;
        }
        w
    }

    /// Fold `other` into `self` per the graph merge rule: copy fields the
    /// existing record lacks, never replace a present value with an empty
    /// one, and when both sides carry a value keep the one from the record
    /// with the higher quality weight.
    pub fn merge_from(&mut self, other: &ResourceRecord) {
        let prefer_other = other.quality_weight() > self.quality_weight();

        merge_opt(&mut self.content_type, &other.content_type, prefer_other);
        merge_opt(&mut self.width, &other.width, prefer_other);
        merge_opt(&mut self.height, &other.height, prefer_other);
        merge_opt(&mut self.size_bytes, &other.size_bytes, prefer_other);
        merge_opt(&mut self.stream_type, &other.stream_type, prefer_other);
        merge_opt(&mut self.confidence, &other.confidence, prefer_other);
        merge_opt(&mut self.score, &other.score, prefer_other);
        merge_opt(&mut self.fingerprint, &other.fingerprint, prefer_other);
        merge_opt(&mut self.content_hash, &other.content_hash, prefer_other);
        merge_opt(&mut self.original_url, &other.original_url, prefer_other);
        merge_opt(&mut self.request_id, &other.request_id, prefer_other);

        if self.quality == QualityBand::Unknown
            || (prefer_other && other.quality != QualityBand::Unknown)
        {
            if other.quality != QualityBand::Unknown {
                self.quality = other.quality;
            }
        }
        if self.score_details.is_empty() || (prefer_other && !other.score_details.is_empty()) {
            if !other.score_details.is_empty() {
                self.score_details = other.score_details.clone();
            }
        }
        if other.is_stream {
            self.is_stream = true;
        }
        // A concrete sighting outranks a prediction.
        if self.is_predicted && !other.is_predicted {
            self.is_predicted = false;
            self.source = other.source;
        }
        // First observation wins the timestamp.
        if other.timestamp < self.timestamp {
            self.timestamp = other.timestamp;
        }
    }
}

/// Copy `other` into `slot` when the slot is empty, or when the other
/// record ranks higher. A present value is never cleared.
fn merge_opt<T: Clone>(slot: &mut Option<T>, other: &Option<T>, prefer_other: bool) {
    match (slot.is_some(), other) {
        (false, Some(v)) => *slot = Some(v.clone()),
        (true, Some(v)) if prefer_other => *slot = Some(v.clone()),
        _ => {}
    }
}

// --- Network observations ---

/// A response header observation from the network layer, fed to the
/// network extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

// --- Graph statistics ---

/// Counts by type, source, and quality band for one tab's graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceStats {
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_source: BTreeMap<String, usize>,
    pub by_quality: BTreeMap<String, usize>,
}

// --- Download state machine ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    Queued,
    InProgress,
    Paused,
    Interrupted,
    Complete,
    Cancelled,
}

impl DownloadState {
    pub fn is_terminal(self) -> bool {
        matches!(self, DownloadState::Complete | DownloadState::Cancelled)
    }
}

impl std::fmt::Display for DownloadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadState::Queued => write!(f, "queued"),
            DownloadState::InProgress => write!(f, "in_progress"),
            DownloadState::Paused => write!(f, "paused"),
            DownloadState::Interrupted => write!(f, "interrupted"),
            DownloadState::Complete => write!(f, "complete"),
            DownloadState::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for DownloadState {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "in_progress" => Ok(Self::InProgress),
            "paused" => Ok(Self::Paused),
            "interrupted" => Ok(Self::Interrupted),
            "complete" => Ok(Self::Complete),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown DownloadState: {other}")),
        }
    }
}

// --- Download record ---

/// Tracks an in-flight or historical download through its state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub download_id: uuid::Uuid,
    pub resource: ResourceRecord,
    /// Scheduler priority: type factor x size factor x network factor.
    pub priority: f64,
    pub state: DownloadState,
    pub bytes_received: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    pub added_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub last_update: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename_on_disk: Option<String>,
    /// Byte offset to resume from after an interruption.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumable_offset: Option<u64>,
    /// Owning tab, when the download came through a tab graph.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<TabId>,
}

// --- Resumable store entries ---

/// Persisted fragment of an interrupted download, enough to issue a
/// Range-request continuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumableEntry {
    pub url: String,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    pub bytes_received: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    pub timestamp: DateTime<Utc>,
}
