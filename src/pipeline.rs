//! Two-branch processing pipeline: analysis and rendering, joined.
//!
//! One `process()` call fans out into an analysis task (parse + analyze)
//! and a rendering task (subprocess) over the same input file, then joins
//! both. Either branch's failure fails the whole call, and the job's temp
//! output file is removed on every failure path. The branches run on the
//! runtime's bounded worker pool, and cancelling the call kills the
//! renderer through its kill-on-drop child handle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{error, info};
use tokio::task::JoinError;

use crate::analysis::{TrackAnalyzer, TripSummary};
use crate::config::PipelineConfig;
use crate::error::{Result, TrackReelError};
use crate::fs_utils;
use crate::gpx_io;
use crate::renderer::RendererRunner;

/// Joined result of one pipeline run.
#[derive(Debug)]
pub struct PipelineOutput {
    pub summary: TripSummary,
    /// Rendered video; owned by the caller from here on
    pub video: PathBuf,
}

/// Orchestrates the analysis and rendering branches over one input file.
pub struct TrackPipeline {
    analyzer: Arc<TrackAnalyzer>,
    runner: Arc<RendererRunner>,
    config: PipelineConfig,
}

impl TrackPipeline {
    pub fn new(analyzer: TrackAnalyzer, runner: RendererRunner, config: PipelineConfig) -> Self {
        Self {
            analyzer: Arc::new(analyzer),
            runner: Arc::new(runner),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Admission checks for a candidate input file.
    pub fn validate_input(&self, input: &Path) -> Result<()> {
        gpx_io::validate_input_file(input, self.config.input_max_size_bytes)
    }

    /// Run both branches concurrently over `input` and join them.
    ///
    /// A malformed file fails only the analysis branch; the renderer still
    /// gets its chance at the raw bytes. When both branches fail, the
    /// analysis error wins.
    pub async fn process(&self, input: &Path) -> Result<PipelineOutput> {
        let output = fs_utils::temp_output_path(self.config.renderer.output_format)?;
        info!(
            "processing '{}' into '{}'",
            input.display(),
            output.display()
        );

        let analyzer = Arc::clone(&self.analyzer);
        let analysis_input = input.to_path_buf();
        let analysis = tokio::spawn(async move {
            let log = gpx_io::read_track_log(&analysis_input)?;
            analyzer.analyze(&log).await
        });

        let runner = Arc::clone(&self.runner);
        let render_input = input.to_path_buf();
        let render_output = output.clone();
        let render =
            tokio::spawn(async move { runner.render(&render_input, &render_output).await });

        let (analysis, render) = tokio::join!(analysis, render);
        let analysis = flatten_branch(analysis);
        let render = flatten_branch(render);

        match (analysis, render) {
            (Ok(summary), Ok(video)) => {
                info!("processing of '{}' finished", input.display());
                Ok(PipelineOutput { summary, video })
            }
            (Err(err), _) | (_, Err(err)) => {
                fs_utils::remove_file_if_exists(&output);
                error!("processing of '{}' failed: {err}", input.display());
                Err(err)
            }
        }
    }
}

/// Collapse a spawned branch's join layer into the pipeline result.
fn flatten_branch<T>(joined: std::result::Result<Result<T>, JoinError>) -> Result<T> {
    match joined {
        Ok(result) => result,
        Err(join_error) => Err(TrackReelError::Io {
            source: std::io::Error::other(join_error),
        }),
    }
}
