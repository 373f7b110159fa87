use serde::{Deserialize, Serialize};

use crate::error::SniffError;

/// How downloaded files are named on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FilenameFormat {
    #[default]
    Original,
    TypeTimestamp,
    SiteTypeIndex,
    /// Uses `custom_filename_template` with `{site} {type} {index}
    /// {timestamp} {basename} {ext} {quality} {score}` placeholders.
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    #[default]
    TimeDesc,
    SizeDesc,
    QualityDesc,
}

/// Complete runtime configuration. Every recognized option is listed;
/// unknown keys in a stored blob are rejected at deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SnifferConfig {
    pub max_concurrent_downloads: u32,
    /// KB/s per download and aggregate; 0 = unlimited.
    pub download_speed_limit_kbs: u64,
    pub default_path: String,
    pub filename_format: FilenameFormat,
    pub custom_filename_template: String,
    pub categorize_by_website: bool,
    pub categorize_by_type: bool,
    pub default_sort: SortOrder,

    pub enable_dom_detection: bool,
    pub enable_css_detection: bool,
    pub enable_shadow_dom_detection: bool,
    pub enable_attribute_detection: bool,
    pub enable_nested_detection: bool,
    pub enable_streaming_detection: bool,
    pub enable_predicted_detection: bool,

    pub min_image_size_kb: u64,
    pub min_video_size_kb: u64,

    pub auto_detect_on_page_load: bool,
    pub show_notifications: bool,
    pub enable_context_menu: bool,
    pub enable_keyboard_shortcuts: bool,
}

impl Default for SnifferConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 2,
            download_speed_limit_kbs: 0,
            default_path: "downloads/resource-sniffer".to_string(),
            filename_format: FilenameFormat::Original,
            custom_filename_template: "{basename}.{ext}".to_string(),
            categorize_by_website: false,
            categorize_by_type: false,
            default_sort: SortOrder::TimeDesc,
            enable_dom_detection: true,
            enable_css_detection: true,
            enable_shadow_dom_detection: true,
            enable_attribute_detection: true,
            enable_nested_detection: true,
            enable_streaming_detection: true,
            enable_predicted_detection: true,
            min_image_size_kb: 0,
            min_video_size_kb: 0,
            auto_detect_on_page_load: true,
            show_notifications: true,
            enable_context_menu: true,
            enable_keyboard_shortcuts: true,
        }
    }
}

impl SnifferConfig {
    /// Parse a stored options blob. Unknown keys are an error, not a merge.
    pub fn from_json(raw: &serde_json::Value) -> Result<Self, SniffError> {
        let config: Self = serde_json::from_value(raw.clone())
            .map_err(|e| SniffError::Config(format!("invalid options: {e}")))?;
        config.validated()
    }

    /// Clamp out-of-range values instead of failing: a bad concurrency
    /// setting should degrade, not brick the scheduler.
    pub fn validated(mut self) -> Result<Self, SniffError> {
        self.max_concurrent_downloads = self.max_concurrent_downloads.clamp(1, 10);
        if self.filename_format == FilenameFormat::Custom
            && self.custom_filename_template.trim().is_empty()
        {
            return Err(SniffError::Config(
                "custom filename format requires a template".to_string(),
            ));
        }
        Ok(self)
    }

    /// Environment overrides for the service binary. Only operational
    /// knobs are env-visible; detection toggles stay in the stored blob.
    pub fn apply_env(mut self) -> Self {
        if let Ok(v) = std::env::var("MEDIASNIFF_MAX_CONCURRENT") {
            if let Ok(n) = v.parse::<u32>() {
                self.max_concurrent_downloads = n.clamp(1, 10);
            }
        }
        if let Ok(v) = std::env::var("MEDIASNIFF_SPEED_LIMIT_KBS") {
            if let Ok(n) = v.parse::<u64>() {
                self.download_speed_limit_kbs = n;
            }
        }
        if let Ok(v) = std::env::var("MEDIASNIFF_DOWNLOAD_PATH") {
            if !v.is_empty() {
                self.default_path = v;
            }
        }
        self
    }
}

/// Per-host overlay of the detection toggles. Hosts not present in the
/// overlay use the global config unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SiteConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_dom_detection: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_css_detection: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_shadow_dom_detection: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_attribute_detection: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_nested_detection: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_streaming_detection: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_predicted_detection: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_image_size_kb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_video_size_kb: Option<u64>,
}

impl SiteConfig {
    /// Produce the effective config for one host.
    pub fn overlay(&self, base: &SnifferConfig) -> SnifferConfig {
        let mut out = base.clone();
        if let Some(v) = self.enable_dom_detection {
            out.enable_dom_detection = v;
        }
        if let Some(v) = self.enable_css_detection {
            out.enable_css_detection = v;
        }
        if let Some(v) = self.enable_shadow_dom_detection {
            out.enable_shadow_dom_detection = v;
        }
        if let Some(v) = self.enable_attribute_detection {
            out.enable_attribute_detection = v;
        }
        if let Some(v) = self.enable_nested_detection {
            out.enable_nested_detection = v;
        }
        if let Some(v) = self.enable_streaming_detection {
            out.enable_streaming_detection = v;
        }
        if let Some(v) = self.enable_predicted_detection {
            out.enable_predicted_detection = v;
        }
        if let Some(v) = self.min_image_size_kb {
            out.min_image_size_kb = v;
        }
        if let Some(v) = self.min_video_size_kb {
            out.min_video_size_kb = v;
        }
        out
    }
}
