//! Reading GPX files into the track model.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::{DateTime, Utc};
use log::info;

use crate::error::{Result, TrackReelError};
use crate::{Track, TrackLog, TrackSegment, Waypoint};

/// Read a GPX file into a [`TrackLog`].
///
/// Unreadable or malformed files fail with [`TrackReelError::Parse`]; a
/// well-formed file without a single waypoint fails with
/// [`TrackReelError::EmptyTrack`].
pub fn read_track_log(path: &Path) -> Result<TrackLog> {
    let file = File::open(path)?;
    let gpx = gpx::read(BufReader::new(file)).map_err(|source| TrackReelError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let log = convert(gpx);
    if log.point_count() == 0 {
        return Err(TrackReelError::EmptyTrack);
    }
    info!(
        "read {} waypoint(s) in {} track(s) from '{}'",
        log.point_count(),
        log.tracks.len(),
        path.display()
    );
    Ok(log)
}

/// Count every waypoint in a GPX file without keeping the parse around.
pub fn count_points(path: &Path) -> Result<u64> {
    let log = read_track_log(path)?;
    Ok(log.point_count() as u64)
}

/// Admission checks applied to a candidate file before it enters the
/// pipeline: extension and size, nothing content-based.
pub fn validate_input_file(path: &Path, max_size_bytes: u64) -> Result<()> {
    let is_gpx = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gpx"));
    if !is_gpx {
        return Err(TrackReelError::InvalidInput {
            path: path.to_path_buf(),
            reason: "file must have a '.gpx' extension".to_string(),
        });
    }

    let size = std::fs::metadata(path)?.len();
    if size > max_size_bytes {
        return Err(TrackReelError::InvalidInput {
            path: path.to_path_buf(),
            reason: format!("file is {size} bytes, limit is {max_size_bytes} bytes"),
        });
    }
    Ok(())
}

fn convert(gpx: gpx::Gpx) -> TrackLog {
    let tracks = gpx
        .tracks
        .into_iter()
        .map(|track| Track {
            name: track.name,
            segments: track
                .segments
                .into_iter()
                .map(|segment| TrackSegment {
                    points: segment.points.into_iter().map(convert_waypoint).collect(),
                })
                .collect(),
        })
        .collect();
    TrackLog { tracks }
}

fn convert_waypoint(waypoint: gpx::Waypoint) -> Waypoint {
    let point = waypoint.point();
    Waypoint {
        latitude: point.y(),
        longitude: point.x(),
        elevation: waypoint.elevation,
        time: waypoint.time.and_then(to_utc),
        speed: waypoint.speed,
    }
}

/// `gpx` speaks the `time` crate; the rest of the pipeline speaks chrono.
fn to_utc(time: gpx::Time) -> Option<DateTime<Utc>> {
    let odt = time::OffsetDateTime::from(time);
    DateTime::from_timestamp(odt.unix_timestamp(), odt.nanosecond())
}
