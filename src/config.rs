//! Configuration surface consumed by the pipeline components.
//!
//! These are plain value structs: wiring them up from files or the
//! environment is the embedding application's concern. Every struct
//! deserializes with defaults so partial documents work.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Container format for rendered videos.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp4,
    Webm,
}

impl OutputFormat {
    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Webm => "webm",
        }
    }
}

/// External renderer invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RendererConfig {
    /// Path to the renderer executable
    pub executable: PathBuf,
    /// Wall-clock budget for one render, in seconds
    pub execution_timeout_secs: u64,
    pub output_format: OutputFormat,
    pub out_width: u32,
    pub out_height: u32,
    pub fps: u32,
    /// Background map opacity, 0.0..=1.0
    pub background_map_visibility: f32,
    /// Tile server URL template for the background map
    pub tms_url_template: String,
    /// Attribution text drawn onto the video
    pub attribution: String,
    /// Icon style for the animated marker
    pub track_icon: String,
    /// Optional per-track colors (hex strings), applied positionally
    pub track_colors: Vec<String>,
}

impl RendererConfig {
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("gpx-animator"),
            execution_timeout_secs: 300,
            output_format: OutputFormat::default(),
            out_width: 1280,
            out_height: 720,
            fps: 25,
            background_map_visibility: 0.5,
            tms_url_template: "https://mt1.google.com/vt/lyrs=m&x={x}&y={y}&z={zoom}".to_string(),
            attribution: "Created with trackreel".to_string(),
            track_icon: "bicycle".to_string(),
            track_colors: Vec::new(),
        }
    }
}

/// One admission rule: `requests` admitted per `period_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitRule {
    pub requests: u64,
    pub period_secs: u64,
}

impl RateLimitRule {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

/// Admission-control settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Classic-bandwidth rules; a request must pass all of them
    pub limits: Vec<RateLimitRule>,
    /// Upper bound on distinct callers tracked at once
    pub max_tracked_keys: usize,
    /// Idle time after which a caller's bucket is evicted, in seconds
    pub idle_eviction_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limits: vec![RateLimitRule {
                requests: 5,
                period_secs: 3600,
            }],
            max_tracked_keys: 10_000,
            idle_eviction_secs: 7200,
        }
    }
}

/// Forecast calibration settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ForecastConfig {
    pub enabled: bool,
    /// Reference track file the calibration run is measured against
    pub reference_path: PathBuf,
}

/// Reverse-geocoding collaborator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeocoderConfig {
    pub base_url: String,
    pub lang: String,
    pub timeout_secs: u64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://photon.komoot.io".to_string(),
            lang: "en".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Top-level configuration consumed by [`crate::TrackPipeline`] and friends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    pub renderer: RendererConfig,
    pub rate_limit: RateLimitConfig,
    pub forecast: ForecastConfig,
    /// Largest accepted input file in bytes
    pub input_max_size_bytes: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            renderer: RendererConfig::default(),
            rate_limit: RateLimitConfig::default(),
            forecast: ForecastConfig::default(),
            input_max_size_bytes: 20 * 1024 * 1024,
        }
    }
}

impl PipelineConfig {
    /// Build a config from an already-loaded JSON document.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
