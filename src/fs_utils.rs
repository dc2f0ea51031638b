//! Per-job temporary file helpers.
//!
//! Every job exclusively owns the temp files it allocates and removes
//! them on all exit paths; these helpers keep that traffic in one place.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::config::OutputFormat;
use crate::error::Result;

/// Allocate a unique output path for one render job.
///
/// The file is created up front so concurrent jobs can never collide on a
/// name; the renderer overwrites it.
pub fn temp_output_path(format: OutputFormat) -> Result<PathBuf> {
    let file = tempfile::Builder::new()
        .prefix("trackreel-")
        .suffix(&format!(".{}", format.extension()))
        .tempfile()?;
    let path = file
        .into_temp_path()
        .keep()
        .map_err(|err| err.error)?;
    Ok(path)
}

/// Best-effort removal of a job-owned file. A missing file is fine.
pub fn remove_file_if_exists(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => info!("file '{}' deleted", path.display()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!("could not remove file '{}': {err}", path.display()),
    }
}
