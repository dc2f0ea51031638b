//! Trajectory analysis: trip summaries and ascent/descent decomposition.
//!
//! The analyzer consumes a parsed [`TrackLog`] and produces an immutable
//! [`TripSummary`]. Metric-level gaps (missing timestamps, no usable speed
//! data, no elevation data) degrade the affected fields to `None`; only a
//! log without any waypoints is an error.

use std::fmt;
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackReelError};
use crate::geo_utils::{self, segment_speeds};
use crate::geocode::{format_coordinates, ReverseGeocoder};
use crate::{Track, TrackLog, TrackSegment, Waypoint};

const MPS_TO_KMH: f64 = 3.6;

// ============================================================================
// Result Types
// ============================================================================

/// Per-direction elevation-change statistics.
///
/// One instance describes ascent, one descent; each waypoint pair
/// contributes to exactly one of the two.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElevationProfile {
    /// Total elevation gained (ascent) or lost (descent), meters
    pub total_elevation_m: f64,
    /// Highest (ascent) or lowest (descent) elevation seen, meters
    pub extremum_m: Option<f64>,
    /// Path length over all runs in this direction, meters
    pub total_distance_m: f64,
    /// Longest single run, meters
    pub max_section_distance_m: Option<f64>,
    /// Time spent over all runs in this direction
    pub total_duration: Duration,
    /// Longest single run by time
    pub max_section_duration: Option<Duration>,
    /// Fastest bucket speed inside any run, km/h
    pub section_max_speed_kmh: Option<f64>,
    /// Duration-weighted mean bucket speed across runs, km/h
    pub section_avg_speed_kmh: Option<f64>,
}

impl ElevationProfile {
    /// True when no run in this direction contributed anything.
    pub fn is_empty(&self) -> bool {
        self.total_elevation_m == 0.0 && self.total_distance_m == 0.0
    }
}

/// Structured trip summary, created once per analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripSummary {
    /// Place label of the first waypoint
    pub from: Option<String>,
    /// Place label of the median waypoint (upper half for even counts)
    pub through: Option<String>,
    /// Place label of the last waypoint
    pub to: Option<String>,
    /// Elapsed time between first and last timestamp
    pub duration: Option<Duration>,
    /// Full flattened path length, kilometers
    pub distance_km: f64,
    pub avg_speed_kmh: Option<f64>,
    pub max_speed_kmh: Option<f64>,
    pub ascent: ElevationProfile,
    pub descent: ElevationProfile,
}

impl TripSummary {
    /// One-line route label: "Trip A -> B -> C", or "Trip around A" for a
    /// loop that starts, passes and ends in the same place.
    pub fn trip_name(&self) -> String {
        let (Some(from), Some(to)) = (&self.from, &self.to) else {
            return "Trip".to_string();
        };
        if from == to && self.through.as_deref() == Some(from.as_str()) {
            return format!("Trip around {from}");
        }
        match &self.through {
            Some(through) if through != from && through != to => {
                format!("Trip {from} -> {through} -> {to}")
            }
            _ => format!("Trip {from} -> {to}"),
        }
    }
}

impl fmt::Display for TripSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.trip_name())?;
        if let Some(from) = &self.from {
            writeln!(f, "From: {from}")?;
        }
        if let Some(to) = &self.to {
            writeln!(f, "To: {to}")?;
        }
        if let Some(duration) = self.duration {
            writeln!(f, "Duration: {}", fmt_duration(duration))?;
        }
        writeln!(f, "Distance: {:.3} km", self.distance_km)?;
        if let Some(avg) = self.avg_speed_kmh {
            writeln!(f, "Average speed: {avg:.2} km/h")?;
        }
        if let Some(max) = self.max_speed_kmh {
            writeln!(f, "Max speed: {max:.2} km/h")?;
        }
        write_profile(f, "Uphill", "Highest point", &self.ascent)?;
        write_profile(f, "Downhill", "Lowest point", &self.descent)
    }
}

fn write_profile(
    f: &mut fmt::Formatter<'_>,
    label: &str,
    extremum_label: &str,
    profile: &ElevationProfile,
) -> fmt::Result {
    if profile.is_empty() {
        return Ok(());
    }
    writeln!(f, "{label}: {:.2} m", profile.total_elevation_m)?;
    if let Some(extremum) = profile.extremum_m {
        writeln!(f, "{extremum_label}: {extremum:.2} m")?;
    }
    writeln!(f, "{label} distance: {:.2} m", profile.total_distance_m)?;
    if let Some(max) = profile.max_section_distance_m {
        writeln!(f, "{label} longest section: {max:.2} m")?;
    }
    writeln!(f, "{label} time: {}", fmt_duration(profile.total_duration))?;
    if let Some(max) = profile.max_section_duration {
        writeln!(f, "{label} longest section time: {}", fmt_duration(max))?;
    }
    if let Some(max) = profile.section_max_speed_kmh {
        writeln!(f, "{label} max speed: {max:.2} km/h")?;
    }
    if let Some(avg) = profile.section_avg_speed_kmh {
        writeln!(f, "{label} average speed: {avg:.2} km/h")?;
    }
    Ok(())
}

fn fmt_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h {minutes:02}m {seconds:02}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}

// ============================================================================
// Analyzer
// ============================================================================

/// Trajectory analyzer: turns a parsed [`TrackLog`] into a [`TripSummary`].
#[derive(Default)]
pub struct TrackAnalyzer {
    geocoder: Option<ReverseGeocoder>,
}

impl TrackAnalyzer {
    /// Analyzer that labels endpoints with formatted coordinates.
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyzer that resolves endpoint labels through a reverse geocoder,
    /// degrading to formatted coordinates when the lookup fails.
    pub fn with_geocoder(geocoder: ReverseGeocoder) -> Self {
        Self {
            geocoder: Some(geocoder),
        }
    }

    /// Produce the trip summary for a track log.
    pub async fn analyze(&self, log: &TrackLog) -> Result<TripSummary> {
        let points = log.flattened();
        if points.is_empty() {
            return Err(TrackReelError::EmptyTrack);
        }
        info!("starting analysis of {} waypoint(s)", points.len());

        let (ascent, descent) = elevation_profiles(&points);
        let summary = TripSummary {
            from: self.place_label(points.first()).await,
            through: self.place_label(points.get(points.len() / 2)).await,
            to: self.place_label(points.last()).await,
            duration: elapsed(&points),
            distance_km: geo_utils::path_length(&points) / 1000.0,
            avg_speed_kmh: average_speed(log),
            max_speed_kmh: maximum_speed(log),
            ascent,
            descent,
        };
        info!("finished analysis: {}", summary.trip_name());
        Ok(summary)
    }

    async fn place_label(&self, point: Option<&Waypoint>) -> Option<String> {
        let point = point?;
        if let Some(geocoder) = &self.geocoder {
            match geocoder.reverse(point.latitude, point.longitude).await {
                Ok(Some(place)) => return Some(place),
                Ok(None) => {}
                Err(err) => {
                    warn!("reverse geocoding failed, falling back to coordinates: {err}")
                }
            }
        }
        Some(format_coordinates(point.latitude, point.longitude))
    }
}

/// Elapsed time between the first and last timestamped point, when both
/// timestamps exist and are in order.
fn elapsed(points: &[Waypoint]) -> Option<Duration> {
    let first = points.first().and_then(|p| p.time)?;
    let last = points.last().and_then(|p| p.time)?;
    last.signed_duration_since(first).to_std().ok()
}

// ============================================================================
// Speed Derivation
// ============================================================================

fn recorded_speeds_kmh(segment: &TrackSegment) -> Vec<f64> {
    segment
        .points
        .iter()
        .filter_map(|p| p.speed)
        .map(|mps| mps * MPS_TO_KMH)
        .collect()
}

/// Mean speed of one segment, preferring recorded values over derived ones.
fn segment_avg_speed(segment: &TrackSegment) -> Option<f64> {
    let recorded = recorded_speeds_kmh(segment);
    if recorded.is_empty() {
        mean(segment_speeds(&segment.points))
    } else {
        mean(recorded)
    }
}

/// Peak speed of one segment, preferring recorded values over derived ones.
fn segment_max_speed(segment: &TrackSegment) -> Option<f64> {
    let recorded = recorded_speeds_kmh(segment);
    if recorded.is_empty() {
        fold_max(segment_speeds(&segment.points))
    } else {
        fold_max(recorded)
    }
}

fn track_avg_speed(track: &Track) -> Option<f64> {
    mean(track.segments.iter().filter_map(segment_avg_speed))
}

fn track_max_speed(track: &Track) -> Option<f64> {
    fold_max(track.segments.iter().filter_map(segment_max_speed))
}

/// Per-track averages, averaged across tracks.
fn average_speed(log: &TrackLog) -> Option<f64> {
    mean(log.tracks.iter().filter_map(track_avg_speed))
}

/// Per-track maxima, averaged across tracks.
fn maximum_speed(log: &TrackLog) -> Option<f64> {
    mean(log.tracks.iter().filter_map(track_max_speed))
}

/// Mean of the finite values; `None` when nothing usable remains.
fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (mut sum, mut count) = (0.0, 0u32);
    for value in values {
        if value.is_finite() {
            sum += value;
            count += 1;
        }
    }
    (count > 0).then(|| sum / f64::from(count))
}

/// Max of the finite values; `None` when nothing usable remains.
fn fold_max(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    values
        .into_iter()
        .filter(|value| value.is_finite())
        .fold(None, |acc, value| {
            Some(acc.map_or(value, |max: f64| max.max(value)))
        })
}

// ============================================================================
// Ascent / Descent Decomposition
// ============================================================================

#[derive(Default)]
struct ProfileAccumulator {
    profile: ElevationProfile,
    weighted_speed_sum: f64,
    speed_weight_secs: f64,
}

impl ProfileAccumulator {
    fn add_delta(&mut self, delta: f64) {
        self.profile.total_elevation_m += delta;
    }

    fn observe_extremum(&mut self, value: f64, pick: fn(f64, f64) -> f64) {
        self.profile.extremum_m = Some(match self.profile.extremum_m {
            Some(current) => pick(current, value),
            None => value,
        });
    }

    /// Fold a finished run (inclusive index range) into the profile totals.
    fn close_run(&mut self, points: &[Waypoint], start: usize, end: usize) {
        if end <= start {
            return;
        }
        let run = &points[start..=end];

        let length = geo_utils::path_length(run);
        self.profile.total_distance_m += length;
        self.profile.max_section_distance_m = Some(
            self.profile
                .max_section_distance_m
                .map_or(length, |max| max.max(length)),
        );

        let Some(duration) = elapsed(run) else {
            return;
        };
        self.profile.total_duration += duration;
        self.profile.max_section_duration = Some(
            self.profile
                .max_section_duration
                .map_or(duration, |max| max.max(duration)),
        );

        let speeds: Vec<f64> = segment_speeds(run).collect();
        if let Some(max) = fold_max(speeds.iter().copied()) {
            self.profile.section_max_speed_kmh = Some(
                self.profile
                    .section_max_speed_kmh
                    .map_or(max, |m| m.max(max)),
            );
        }
        if let Some(avg) = mean(speeds) {
            let weight = duration.as_secs_f64().max(1.0);
            self.weighted_speed_sum += avg * weight;
            self.speed_weight_secs += weight;
            self.profile.section_avg_speed_kmh =
                Some(self.weighted_speed_sum / self.speed_weight_secs);
        }
    }
}

/// Decompose the flattened sequence into ascent and descent statistics.
///
/// Walks the waypoint pairs keeping a direction flag and the index where
/// the current monotonic run started. A direction reversal closes the
/// finished run into its profile; the final in-progress run is closed at
/// the last point. Missing elevations compare as 0.0; a log with no
/// elevation data at all yields two empty profiles.
fn elevation_profiles(points: &[Waypoint]) -> (ElevationProfile, ElevationProfile) {
    if points.len() < 2 || points.iter().all(|p| p.elevation.is_none()) {
        return (ElevationProfile::default(), ElevationProfile::default());
    }

    let mut ascent = ProfileAccumulator::default();
    let mut descent = ProfileAccumulator::default();
    let mut ascending = true;
    let mut run_start = 0usize;

    for i in 0..points.len() - 1 {
        let ele_a = points[i].elevation.unwrap_or(0.0);
        let ele_b = points[i + 1].elevation.unwrap_or(0.0);

        ascent.observe_extremum(ele_a.max(ele_b), f64::max);
        descent.observe_extremum(ele_a.min(ele_b), f64::min);

        if ele_a > ele_b {
            descent.add_delta(ele_a - ele_b);
            if ascending {
                ascent.close_run(points, run_start, i);
                run_start = i;
                ascending = false;
            }
        } else {
            ascent.add_delta(ele_b - ele_a);
            if !ascending {
                descent.close_run(points, run_start, i);
                run_start = i;
                ascending = true;
            }
        }
    }

    let last = points.len() - 1;
    if ascending {
        ascent.close_run(points, run_start, last);
    } else {
        descent.close_run(points, run_start, last);
    }

    (ascent.profile, descent.profile)
}
