//! End-to-end pipeline tests driven by a fake renderer executable.
//!
//! The fake renderer is a small shell script written into a temp dir; it
//! understands the real argument template, so these tests exercise the
//! whole subprocess surface: spawn, pipe draining, timeout and kill, exit
//! codes, output-file verification and single-flight execution.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use trackreel::{
    ForecastConfig, Forecaster, PipelineConfig, RendererConfig, RendererRunner, TrackAnalyzer,
    TrackPipeline, TrackReelError,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Write an executable fake renderer into `dir`.
///
/// The script answers `--version` immediately and otherwise runs `body`
/// with the value of the `--output` argument in `$out`.
fn fake_renderer(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-renderer.sh");
    let script = format!(
        "#!/bin/sh\n\
         if [ \"$1\" = \"--version\" ]; then\n\
           echo \"fake-renderer 1.0\"\n\
           exit 0\n\
         fi\n\
         out=\"\"\n\
         while [ $# -gt 0 ]; do\n\
           if [ \"$1\" = \"--output\" ]; then\n\
             out=\"$2\"\n\
             shift\n\
           fi\n\
           shift\n\
         done\n\
         {body}\n"
    );
    std::fs::write(&path, script).expect("write fake renderer");
    let mut permissions = std::fs::metadata(&path)
        .expect("stat fake renderer")
        .permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(&path, permissions).expect("mark fake renderer executable");
    path
}

/// Synthetic ten-point track: ~1 km eastwards over ten minutes, climbing
/// for the first half and descending for the second.
fn write_synthetic_track(path: &Path) {
    let offsets_secs = [0, 67, 133, 200, 267, 333, 400, 467, 533, 600];
    let elevations = [
        100.0, 110.0, 120.0, 130.0, 140.0, 150.0, 140.0, 130.0, 120.0, 110.0,
    ];

    let mut body = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="trackreel-tests" xmlns="http://www.topografix.com/GPX/1/1">
<trk><name>synthetic ride</name><trkseg>
"#,
    );
    for i in 0..10 {
        body.push_str(&format!(
            "<trkpt lat=\"51.000000\" lon=\"{:.6}\"><ele>{:.1}</ele><time>2024-05-04T10:{:02}:{:02}Z</time></trkpt>\n",
            13.4 + 0.0015827 * i as f64,
            elevations[i],
            offsets_secs[i] / 60,
            offsets_secs[i] % 60,
        ));
    }
    body.push_str("</trkseg></trk></gpx>\n");
    std::fs::write(path, body).expect("write synthetic track");
}

fn runner_for(executable: PathBuf, timeout_secs: u64) -> RendererRunner {
    RendererRunner::new(RendererConfig {
        executable,
        execution_timeout_secs: timeout_secs,
        ..RendererConfig::default()
    })
}

fn pipeline_for(executable: PathBuf, timeout_secs: u64) -> TrackPipeline {
    let config = PipelineConfig {
        renderer: RendererConfig {
            executable,
            execution_timeout_secs: timeout_secs,
            ..RendererConfig::default()
        },
        ..PipelineConfig::default()
    };
    let runner = RendererRunner::new(config.renderer.clone());
    TrackPipeline::new(TrackAnalyzer::new(), runner, config)
}

// ============================================================================
// End-to-end
// ============================================================================

#[tokio::test]
async fn test_pipeline_end_to_end() {
    init_logging();
    let tmp = TempDir::new().expect("temp dir");
    let track = tmp.path().join("ride.gpx");
    write_synthetic_track(&track);

    let renderer = fake_renderer(
        tmp.path(),
        "echo \"rendering into $out\"\necho \"tile warnings\" >&2\n: > \"$out\"\nexit 0",
    );
    let pipeline = pipeline_for(renderer, 30);
    pipeline.validate_input(&track).expect("valid input");

    let outcome = pipeline.process(&track).await.expect("pipeline succeeds");

    assert!(outcome.video.exists(), "output file must exist");

    let summary = &outcome.summary;
    assert!(summary.from.is_some());
    assert!(summary.to.is_some());
    assert_eq!(summary.duration, Some(Duration::from_secs(600)));
    assert!(
        (summary.distance_km - 1.0).abs() < 0.1,
        "got {} km",
        summary.distance_km
    );
    assert!(!summary.ascent.is_empty());
    assert!(!summary.descent.is_empty());
    assert!(summary.avg_speed_kmh.is_some());

    let caption = summary.to_string();
    assert!(caption.contains("Trip"));
    assert!(caption.contains("km"));

    std::fs::remove_file(&outcome.video).expect("cleanup output");
}

#[tokio::test]
async fn test_pipeline_fails_on_malformed_input_and_cleans_up() {
    init_logging();
    let tmp = TempDir::new().expect("temp dir");
    let track = tmp.path().join("broken.gpx");
    std::fs::write(&track, "definitely not xml").expect("write broken input");

    // The renderer itself would succeed; the analysis branch must fail
    let renderer = fake_renderer(tmp.path(), ": > \"$out\"\nexit 0");
    let pipeline = pipeline_for(renderer, 30);

    let err = pipeline.process(&track).await.unwrap_err();
    assert!(matches!(err, TrackReelError::Parse { .. }), "got {err}");
}

// ============================================================================
// Renderer failure kinds
// ============================================================================

#[tokio::test]
async fn test_timeout_kills_renderer_within_grace() {
    init_logging();
    let tmp = TempDir::new().expect("temp dir");
    let track = tmp.path().join("ride.gpx");
    write_synthetic_track(&track);

    // `exec` keeps the sleep as the direct child so the kill closes the pipes
    let renderer = fake_renderer(tmp.path(), "exec sleep 10");
    let runner = runner_for(renderer, 1);
    let output = tmp.path().join("out.mp4");

    let started = Instant::now();
    let err = runner.render(&track, &output).await.unwrap_err();
    let elapsed = started.elapsed();

    match err {
        TrackReelError::RenderTimeout { timeout } => {
            assert_eq!(timeout, Duration::from_secs(1));
        }
        other => panic!("expected timeout, got {other}"),
    }
    assert!(
        elapsed >= Duration::from_secs(1) && elapsed < Duration::from_secs(4),
        "kill took {elapsed:?}"
    );
    assert!(!output.exists());
}

#[tokio::test]
async fn test_nonzero_exit_is_distinct_failure() {
    init_logging();
    let tmp = TempDir::new().expect("temp dir");
    let track = tmp.path().join("ride.gpx");
    write_synthetic_track(&track);

    let renderer = fake_renderer(tmp.path(), "echo \"boom\" >&2\nexit 3");
    let runner = runner_for(renderer, 30);

    let err = runner
        .render(&track, &tmp.path().join("out.mp4"))
        .await
        .unwrap_err();
    assert!(
        matches!(err, TrackReelError::RenderExitFailure { code: Some(3) }),
        "got {err}"
    );
}

#[tokio::test]
async fn test_missing_output_is_contract_violation() {
    init_logging();
    let tmp = TempDir::new().expect("temp dir");
    let track = tmp.path().join("ride.gpx");
    write_synthetic_track(&track);

    // Exit code 0 but no output file: the tool lied about success
    let renderer = fake_renderer(tmp.path(), "exit 0");
    let runner = runner_for(renderer, 30);

    let err = runner
        .render(&track, &tmp.path().join("out.mp4"))
        .await
        .unwrap_err();
    assert!(
        matches!(err, TrackReelError::RenderOutputMissing { .. }),
        "got {err}"
    );
}

// ============================================================================
// Single-flight execution
// ============================================================================

#[tokio::test]
async fn test_concurrent_renders_run_serially() {
    init_logging();
    let tmp = TempDir::new().expect("temp dir");
    let track = tmp.path().join("ride.gpx");
    write_synthetic_track(&track);

    let renderer = fake_renderer(tmp.path(), "sleep 0.4\n: > \"$out\"");
    let runner = Arc::new(runner_for(renderer, 30));

    let first_out = tmp.path().join("first.mp4");
    let second_out = tmp.path().join("second.mp4");

    let started = Instant::now();
    let (first, second) = tokio::join!(
        runner.render(&track, &first_out),
        runner.render(&track, &second_out),
    );
    let elapsed = started.elapsed();

    first.expect("first render succeeds");
    second.expect("second render succeeds");
    // Two 0.4 s renders through one lock cannot overlap
    assert!(
        elapsed >= Duration::from_millis(800),
        "renders overlapped: {elapsed:?}"
    );
}

// ============================================================================
// Health check
// ============================================================================

#[tokio::test]
async fn test_health_check_passes_for_working_tool() {
    init_logging();
    let tmp = TempDir::new().expect("temp dir");
    let renderer = fake_renderer(tmp.path(), "exit 0");

    runner_for(renderer, 30)
        .health_check()
        .await
        .expect("healthy renderer");
}

#[tokio::test]
async fn test_health_check_fails_for_missing_tool() {
    init_logging();
    let tmp = TempDir::new().expect("temp dir");
    let missing = tmp.path().join("no-such-renderer");

    let err = runner_for(missing, 30).health_check().await.unwrap_err();
    assert!(matches!(err, TrackReelError::Io { .. }), "got {err}");
}

// ============================================================================
// Forecast through the pipeline
// ============================================================================

#[tokio::test]
async fn test_forecaster_calibrates_through_pipeline() {
    init_logging();
    let tmp = TempDir::new().expect("temp dir");
    let track = tmp.path().join("reference.gpx");
    write_synthetic_track(&track);

    let renderer = fake_renderer(tmp.path(), ": > \"$out\"\nexit 0");
    let pipeline = pipeline_for(renderer, 30);

    let forecaster = Forecaster::new(&ForecastConfig {
        enabled: true,
        reference_path: track.clone(),
    });
    assert!(!forecaster.is_calibrated());
    assert_eq!(forecaster.forecast(&track).expect("readable"), None);

    forecaster
        .calibrate(&pipeline)
        .await
        .expect("calibration run succeeds");
    assert!(forecaster.is_calibrated());

    // Same file as the reference: the estimate is the reference duration
    let estimate = forecaster
        .forecast(&track)
        .expect("readable")
        .expect("calibrated");
    assert!(estimate < Duration::from_secs(30));

    // Calibration is one-shot
    forecaster
        .calibrate(&pipeline)
        .await
        .expect("second calibrate is a no-op");
}
