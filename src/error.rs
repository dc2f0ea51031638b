//! Unified error handling for the trackreel pipeline.
//!
//! One error type covers every operation so callers can distinguish
//! admission decisions, analysis failures and the three renderer failure
//! kinds without digging through source chains.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Unified error type for pipeline operations.
#[derive(Debug, Error)]
pub enum TrackReelError {
    /// Track file could not be parsed
    #[error("failed to parse track file '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: gpx::errors::GpxError,
    },

    /// Track log contains no waypoints at all
    #[error("track log contains no waypoints")]
    EmptyTrack,

    /// Input file rejected before entering the pipeline
    #[error("input file '{}' rejected: {reason}", .path.display())]
    InvalidInput { path: PathBuf, reason: String },

    /// Underlying I/O failure
    #[error("i/o error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Renderer exceeded its wall-clock budget and was killed
    #[error("renderer was forcibly killed after its {timeout:?} budget expired")]
    RenderTimeout { timeout: Duration },

    /// Renderer exited with a non-zero status
    #[error("renderer returned unsuccessful exit code ({code:?})")]
    RenderExitFailure { code: Option<i32> },

    /// Renderer reported success but the output file does not exist
    #[error("renderer exited successfully but output file '{}' does not exist", .path.display())]
    RenderOutputMissing { path: PathBuf },

    /// Reverse-geocoding collaborator failed; callers degrade to raw
    /// coordinates and never propagate this out of analysis
    #[error("reverse geocoding failed: {message}")]
    Geocode { message: String },

    /// Admission control rejected the request for now
    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, TrackReelError>;
