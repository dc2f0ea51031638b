//! External renderer subprocess supervision.
//!
//! The renderer is an opaque executable invoked once per job with a fixed
//! argument template. Only one render runs at a time process-wide; stdout
//! and stderr are drained into the log by two tasks that are joined on
//! every exit path, and the child is killed once its wall-clock budget
//! expires.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::RendererConfig;
use crate::error::{Result, TrackReelError};

const LOG_TAG: &str = "RENDERER";

type DrainHandles = (JoinHandle<()>, JoinHandle<()>);

/// Runs the external route renderer with single-flight execution.
pub struct RendererRunner {
    config: RendererConfig,
    // One render subprocess at a time, process-wide
    run_lock: Mutex<()>,
}

impl RendererRunner {
    pub fn new(config: RendererConfig) -> Self {
        Self {
            config,
            run_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Render `input` into a video at `output`.
    ///
    /// Blocks while another render is in flight. Fails with
    /// [`TrackReelError::RenderTimeout`] when the wall-clock budget
    /// expires (the child is killed and reaped first),
    /// [`TrackReelError::RenderExitFailure`] on a non-zero exit, and
    /// [`TrackReelError::RenderOutputMissing`] when the tool claims
    /// success without producing the file.
    pub async fn render(&self, input: &Path, output: &Path) -> Result<PathBuf> {
        let _flight = self.run_lock.lock().await;

        let mut command = self.render_command(input, output);
        let (mut child, drains) = spawn_supervised(&mut command)?;
        let pid = child.id();
        info!("renderer is running with pid {pid:?}");

        let started = Instant::now();
        let budget = self.config.execution_timeout();
        let waited = timeout(budget, child.wait()).await;

        if waited.is_err() {
            warn!("renderer with pid {pid:?} exceeded its {budget:?} budget, killing it");
            child.kill().await.ok();
        }
        // Both pipes are fully drained before any verdict is produced,
        // timeout included
        join_drains(drains).await;

        let status = match waited {
            Ok(status) => status?,
            Err(_elapsed) => {
                return Err(TrackReelError::RenderTimeout { timeout: budget });
            }
        };
        info!(
            "renderer with pid {:?} finished in {:.1?}",
            pid,
            started.elapsed()
        );

        if !status.success() {
            return Err(TrackReelError::RenderExitFailure {
                code: status.code(),
            });
        }
        if tokio::fs::metadata(output).await.is_err() {
            return Err(TrackReelError::RenderOutputMissing {
                path: output.to_path_buf(),
            });
        }
        info!("output file '{}' was created", output.display());
        Ok(output.to_path_buf())
    }

    /// Probe the renderer executable, typically at startup.
    ///
    /// Invokes the version flag and fails fast when the tool is missing
    /// or reports a non-zero status.
    pub async fn health_check(&self) -> Result<()> {
        let _flight = self.run_lock.lock().await;

        let mut command = Command::new(&self.config.executable);
        command.arg("--version");
        let (mut child, drains) = spawn_supervised(&mut command)?;
        let status = child.wait().await;
        join_drains(drains).await;

        let status = status?;
        if status.success() {
            info!(
                "renderer '{}' was found and returned success",
                self.config.executable.display()
            );
            Ok(())
        } else {
            Err(TrackReelError::RenderExitFailure {
                code: status.code(),
            })
        }
    }

    /// Fixed argument template with the per-job paths substituted.
    fn render_command(&self, input: &Path, output: &Path) -> Command {
        let config = &self.config;
        let mut command = Command::new(&config.executable);
        command
            .arg("--input")
            .arg(input)
            .arg("--output")
            .arg(output)
            .arg("--tms-url-template")
            .arg(&config.tms_url_template)
            .arg("--width")
            .arg(config.out_width.to_string())
            .arg("--height")
            .arg(config.out_height.to_string())
            .arg("--attribution")
            .arg(&config.attribution)
            .arg("--background-map-visibility")
            .arg(config.background_map_visibility.to_string())
            .arg("--fps")
            .arg(config.fps.to_string())
            .arg("--track-icon")
            .arg(&config.track_icon);
        for color in &config.track_colors {
            command.arg("--color").arg(color);
        }
        command
    }
}

/// Spawn the child with piped output and one drain task per stream.
///
/// The drains forward every line to the log tagged with the child pid and
/// finish once the pipes close, so they are joinable on every exit path.
/// Kill-on-drop guards against a cancelled caller orphaning the process.
fn spawn_supervised(command: &mut Command) -> Result<(Child, DrainHandles)> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let pid = child.id().unwrap_or_default();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let out = tokio::spawn(drain_lines(stdout, pid, false));
    let err = tokio::spawn(drain_lines(stderr, pid, true));
    Ok((child, (out, err)))
}

/// Forward one pipe line by line into the log, preserving stream order.
async fn drain_lines<R: AsyncRead + Unpin>(stream: Option<R>, pid: u32, is_stderr: bool) {
    let Some(stream) = stream else { return };
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if is_stderr {
            error!("[{LOG_TAG}-{pid}] {line}");
        } else {
            info!("[{LOG_TAG}-{pid}] {line}");
        }
    }
}

async fn join_drains((out, err): DrainHandles) {
    let _ = out.await;
    let _ = err.await;
}
