//! Geographic primitives: geodesic distance and bucketed speed derivation.

use chrono::TimeDelta;
use geo::{Distance, Geodesic};

use crate::Waypoint;

/// Minimum number of points folded into one speed bucket.
const MIN_BUCKET_STEP: usize = 100;

const MPS_TO_KMH: f64 = 3.6;

/// Great-circle distance between two waypoints in meters.
///
/// Uses the WGS84 ellipsoid, accurate to sub-meter level for distances
/// under a few hundred kilometers.
pub fn distance(a: &Waypoint, b: &Waypoint) -> f64 {
    Geodesic::distance(a.point(), b.point())
}

/// Total path length of an ordered waypoint sequence in meters.
pub fn path_length(points: &[Waypoint]) -> f64 {
    points.windows(2).map(|pair| distance(&pair[0], &pair[1])).sum()
}

/// Bucketed speeds (km/h) derived from an ordered waypoint sequence.
///
/// The sequence is split into buckets of roughly one elapsed minute (never
/// fewer than `MIN_BUCKET_STEP` points), and each bucket contributes its
/// path length over its elapsed time. Yields nothing when the sequence has
/// no elapsed duration, and skips zero-duration buckets (duplicate
/// timestamps) rather than dividing by zero.
pub fn segment_speeds(points: &[Waypoint]) -> impl Iterator<Item = f64> + '_ {
    let step = bucket_step(points);
    let last = points.len().saturating_sub(1);

    (0..last).filter_map(move |i| {
        let step = step?;
        let j = (i + step).min(last);
        let (Some(start), Some(end)) = (points[i].time, points[j].time) else {
            return None;
        };
        let secs = (end - start).num_milliseconds().abs() as f64 / 1000.0;
        if secs == 0.0 {
            return None;
        }
        let meters = path_length(&points[i..=j]);
        Some(meters / secs * MPS_TO_KMH)
    })
}

/// Points per bucket, or `None` when the sequence has no usable duration.
fn bucket_step(points: &[Waypoint]) -> Option<usize> {
    let first = points.first().and_then(|p| p.time)?;
    let last = points.last().and_then(|p| p.time)?;
    let elapsed = last.signed_duration_since(first);
    if elapsed <= TimeDelta::zero() {
        return None;
    }
    let minutes = elapsed.num_minutes().max(1) as usize;
    Some((points.len() / minutes).max(MIN_BUCKET_STEP))
}
