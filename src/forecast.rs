//! Completion-time forecasting from a single calibration run.
//!
//! The forecaster runs the full pipeline once against a known reference
//! file, stores the measured wall-clock duration and the file's point
//! count, and then extrapolates linearly by point count for candidate
//! files. The estimate is advisory only.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::info;
use once_cell::sync::OnceCell;

use crate::config::ForecastConfig;
use crate::error::Result;
use crate::fs_utils;
use crate::gpx_io;
use crate::pipeline::TrackPipeline;

/// A job forecast to take longer than this is worth warning the
/// requester about.
pub const LONG_JOB_THRESHOLD: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
struct Calibration {
    reference_points: u64,
    reference_duration: Duration,
}

/// Linear completion-time forecaster calibrated against one reference run.
pub struct Forecaster {
    enabled: bool,
    reference_path: PathBuf,
    // Set once at startup, read-only thereafter
    calibration: OnceCell<Calibration>,
}

impl Forecaster {
    pub fn new(config: &ForecastConfig) -> Self {
        Self {
            enabled: config.enabled,
            reference_path: config.reference_path.clone(),
            calibration: OnceCell::new(),
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.get().is_some()
    }

    /// Run the pipeline once against the reference file and store the
    /// measured duration and point count.
    ///
    /// A disabled or already-calibrated forecaster returns immediately;
    /// the calibration cell only ever holds its first value.
    pub async fn calibrate(&self, pipeline: &TrackPipeline) -> Result<()> {
        if !self.enabled || self.is_calibrated() {
            return Ok(());
        }
        info!(
            "forecast enabled, calibrating against '{}'",
            self.reference_path.display()
        );

        let reference_points = gpx_io::count_points(&self.reference_path)?;
        let started = Instant::now();
        let outcome = pipeline.process(&self.reference_path).await?;
        let reference_duration = started.elapsed();
        fs_utils::remove_file_if_exists(&outcome.video);

        let _ = self.calibration.set(Calibration {
            reference_points,
            reference_duration,
        });
        info!(
            "forecast calibrated: {reference_points} point(s) rendered in {reference_duration:?}"
        );
        Ok(())
    }

    /// Expected processing duration for `input`, scaled linearly by point
    /// count. `None` until calibration has completed.
    pub fn forecast(&self, input: &Path) -> Result<Option<Duration>> {
        let Some(calibration) = self.calibration.get() else {
            return Ok(None);
        };
        let points = gpx_io::count_points(input)?;
        let ratio = points as f64 / calibration.reference_points.max(1) as f64;
        Ok(Some(calibration.reference_duration.mul_f64(ratio)))
    }
}
