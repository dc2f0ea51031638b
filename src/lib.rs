//! # Trackreel
//!
//! GPS-track trip analysis and route video rendering.
//!
//! This library ingests a GPX recording and produces a structured trip
//! summary alongside a rendered route video:
//! - Trip summaries: endpoints, duration, distance, speed, ascent/descent
//!   decomposition with per-direction statistics
//! - Supervised subprocess rendering (wall-clock timeout, forced kill,
//!   pipe draining, single-flight execution)
//! - Per-key token-bucket admission control with a bounded bucket store
//! - Completion-time forecasting from a single calibration run
//!
//! ## Quick Start
//!
//! ```no_run
//! use trackreel::{PipelineConfig, RendererRunner, TrackAnalyzer, TrackPipeline};
//!
//! # async fn demo() -> trackreel::Result<()> {
//! let config = PipelineConfig::default();
//! let runner = RendererRunner::new(config.renderer.clone());
//! runner.health_check().await?;
//!
//! let pipeline = TrackPipeline::new(TrackAnalyzer::new(), runner, config);
//! let outcome = pipeline.process(std::path::Path::new("ride.gpx")).await?;
//! println!("{}", outcome.summary);
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{Result, TrackReelError};

// Configuration surface (consumed, not loaded)
pub mod config;
pub use config::{
    ForecastConfig, GeocoderConfig, OutputFormat, PipelineConfig, RateLimitConfig, RateLimitRule,
    RendererConfig,
};

// GPX file reading into the track model
pub mod gpx_io;

// Geographic primitives (geodesic distance, path length, bucketed speeds)
pub mod geo_utils;

// Trajectory analysis (trip summaries, ascent/descent decomposition)
pub mod analysis;
pub use analysis::{ElevationProfile, TrackAnalyzer, TripSummary};

// Reverse-geocoding collaborator seam
pub mod geocode;
pub use geocode::ReverseGeocoder;

// Bounded idle-expiring store backing the rate limiter
pub mod ttl_cache;

// Token-bucket admission control
pub mod rate_limit;
pub use rate_limit::RateLimiter;

// External renderer subprocess supervision
pub mod renderer;
pub use renderer::RendererRunner;

// Completion-time forecasting
pub mod forecast;
pub use forecast::Forecaster;

// Two-branch pipeline orchestration
pub mod pipeline;
pub use pipeline::{PipelineOutput, TrackPipeline};

// Per-job temp file helpers
pub mod fs_utils;

// ============================================================================
// Core Types
// ============================================================================

/// A single timestamped, geolocated sample.
///
/// # Example
/// ```
/// use trackreel::Waypoint;
/// let point = Waypoint::new(51.5074, -0.1278); // London
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Waypoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Elevation above sea level in meters, when recorded
    pub elevation: Option<f64>,
    /// Sample timestamp, when recorded
    pub time: Option<DateTime<Utc>>,
    /// Speed recorded by the device in m/s, when present
    pub speed: Option<f64>,
}

impl Waypoint {
    /// Create a bare coordinate sample.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            elevation: None,
            time: None,
            speed: None,
        }
    }

    /// Check if the sample has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }

    /// The sample as a `geo` point (x = longitude, y = latitude).
    pub fn point(&self) -> geo::Point<f64> {
        geo::Point::new(self.longitude, self.latitude)
    }
}

/// One continuous run of ordered waypoints.
///
/// Points are assumed non-decreasing in time; violations are tolerated
/// downstream (zero-duration buckets are skipped), never corrected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackSegment {
    pub points: Vec<Waypoint>,
}

/// An ordered group of segments from one recording.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub name: Option<String>,
    pub segments: Vec<TrackSegment>,
}

/// A parsed track file: one or more tracks in file order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackLog {
    pub tracks: Vec<Track>,
}

impl TrackLog {
    /// Iterate every waypoint in file order.
    pub fn waypoints(&self) -> impl Iterator<Item = &Waypoint> {
        self.tracks
            .iter()
            .flat_map(|track| track.segments.iter())
            .flat_map(|segment| segment.points.iter())
    }

    /// All waypoints flattened into one owned sequence.
    pub fn flattened(&self) -> Vec<Waypoint> {
        self.waypoints().copied().collect()
    }

    /// Total number of waypoints across all tracks.
    pub fn point_count(&self) -> usize {
        self.waypoints().count()
    }
}
