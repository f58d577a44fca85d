//! Loudness Pipeline Tests
//!
//! End-to-end tests for the normalize path: temp files, the external filter
//! invocation and the peak-normalize fallback.

use std::fs;
use std::path::{Path, PathBuf};

use approx::assert_relative_eq;
use podrescue::loudness::{
    sweep_orphans, ExternalFilterInvoker, FilterSpec, LoudnessNormalizationPipeline,
    NormalizationPath,
    TempResourceScope, TEMP_PREFIX,
};
use podrescue::AudioBuffer;
use tempfile::{tempdir, TempDir};
use test_case::test_case;

/// A stand-in for ffmpeg that copies its input (`$3`) to its output (`$8`)
#[cfg(unix)]
fn fake_ffmpeg(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-ffmpeg.sh");
    fs::write(&path, "#!/bin/sh\ncp \"$3\" \"$8\"\n").unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A tool that exits cleanly but writes bytes no WAV reader accepts
#[cfg(unix)]
fn garbage_ffmpeg(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("garbage-ffmpeg.sh");
    fs::write(&path, "#!/bin/sh\nprintf garbage > \"$8\"\n").unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Entries left in the temp dir, ignoring the fake tool itself
fn leftovers(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(TEMP_PREFIX))
        .collect()
}

fn pipeline_with(tool: impl Into<PathBuf>) -> (LoudnessNormalizationPipeline, TempDir) {
    let temp = tempdir().unwrap();
    let pipeline =
        LoudnessNormalizationPipeline::new(ExternalFilterInvoker::new(tool), temp.path());
    (pipeline, temp)
}

// === Fallback Path ===

#[test_case("false" ; "tool exits non-zero")]
#[test_case("/nonexistent/bin/ffmpeg" ; "tool missing")]
#[test_case("true" ; "tool writes nothing")]
fn test_failing_tool_falls_back(tool: &str) {
    let (pipeline, temp) = pipeline_with(tool);
    let input = AudioBuffer::sine(220.0, 0.25, 1.0, 2, 22050);

    let report = pipeline.normalize_report(&input);

    assert!(report.is_degraded());
    assert!(matches!(
        report.path,
        NormalizationPath::Fallback { ref reason } if !reason.is_empty()
    ));
    assert!(!report.buffer.is_empty());
    assert!(report.buffer.peak() < 1.0);
    assert!(report.buffer.peak() > input.peak());
    assert!(leftovers(temp.path()).is_empty());
}

#[test]
fn test_fallback_scenario_keeps_original_rate() {
    let (pipeline, _temp) = pipeline_with("false");
    let input = AudioBuffer::sine(440.0, 0.3, 2.0, 2, 48000);

    let out = pipeline.normalize(&input);

    assert_eq!(out.num_channels(), 2);
    assert_eq!(out.sample_rate(), 48000);
    assert_relative_eq!(out.duration(), 2.0, epsilon = 1e-6);
}

#[test]
fn test_fallback_leaves_silence_alone() {
    let (pipeline, _temp) = pipeline_with("false");
    let input = AudioBuffer::new(1, 4410, 44100);
    let out = pipeline.normalize(&input);
    assert_eq!(out, input);
}

#[cfg(unix)]
#[test]
fn test_undecodable_output_falls_back() {
    let tools = tempdir().unwrap();
    let (pipeline, temp) = pipeline_with(garbage_ffmpeg(tools.path()));
    let input = AudioBuffer::sine(220.0, 0.25, 0.5, 2, 22050);

    let report = pipeline.normalize_report(&input);

    assert!(report.is_degraded());
    assert_eq!(report.buffer.num_channels(), 2);
    assert_eq!(report.buffer.num_samples(), input.num_samples());
    assert!(report.buffer.peak() > input.peak());
    assert!(leftovers(temp.path()).is_empty());
}

// === External Path ===

#[cfg(unix)]
#[test]
fn test_external_scenario_two_seconds_stereo() {
    let tools = tempdir().unwrap();
    let (pipeline, temp) = pipeline_with(fake_ffmpeg(tools.path()));
    let input = AudioBuffer::sine(440.0, 0.3, 2.0, 2, 44100);

    let report = pipeline.normalize_report(&input);

    assert_eq!(report.path, NormalizationPath::External);
    assert_eq!(report.buffer.num_channels(), 2);
    assert_eq!(report.buffer.sample_rate(), 44100);
    assert_relative_eq!(report.buffer.duration(), 2.0, epsilon = 1e-6);
    assert!(leftovers(temp.path()).is_empty());
}

#[cfg(unix)]
#[test]
fn test_external_path_passes_audio_through_float_wav() {
    let tools = tempdir().unwrap();
    let (pipeline, _temp) = pipeline_with(fake_ffmpeg(tools.path()));
    let input = AudioBuffer::sine(1000.0, 0.123, 0.5, 1, 44100);

    let out = pipeline.normalize(&input);

    // The fake tool copies bytes, so the float intermediate must be lossless
    assert_eq!(out.samples(), input.samples());
}

#[cfg(unix)]
#[test]
fn test_custom_targets_reach_the_tool() {
    let tools = tempdir().unwrap();
    let (pipeline, _temp) = pipeline_with(fake_ffmpeg(tools.path()));
    let spec = FilterSpec {
        integrated_lufs: -23.0,
        loudness_range: 7.0,
        true_peak_db: -2.0,
        ..FilterSpec::default()
    };
    let pipeline = pipeline.with_spec(spec);
    assert_eq!(pipeline.spec().expression(), "loudnorm=I=-23:LRA=7:TP=-2");

    let input = AudioBuffer::sine(440.0, 0.3, 0.25, 1, 44100);
    let report = pipeline.normalize_report(&input);
    assert!(!report.is_degraded());
}

// === Temp Resources ===

#[test]
fn test_back_to_back_calls_never_share_paths() {
    let temp = tempdir().unwrap();
    let mut first = TempResourceScope::new(temp.path());
    let mut second = TempResourceScope::new(temp.path());

    let a = first.acquire(".wav").unwrap();
    let b = first.acquire(".wav").unwrap();
    let c = second.acquire(".wav").unwrap();

    assert_ne!(a.path(), b.path());
    assert_ne!(a.path(), c.path());
    assert_ne!(b.path(), c.path());
    assert_eq!(leftovers(temp.path()).len(), 3);

    drop(first);
    drop(second);
    assert!(leftovers(temp.path()).is_empty());
}

#[test]
fn test_repeated_normalize_cleans_up_every_time() {
    let (pipeline, temp) = pipeline_with("false");
    let input = AudioBuffer::sine(330.0, 0.2, 0.2, 1, 16000);
    for _ in 0..5 {
        let out = pipeline.normalize(&input);
        assert_eq!(out.num_samples(), input.num_samples());
        assert!(leftovers(temp.path()).is_empty());
    }
}

#[test]
fn test_unwritable_temp_dir_still_returns_audio() {
    let pipeline = LoudnessNormalizationPipeline::new(
        ExternalFilterInvoker::default(),
        "/nonexistent/podrescue-temp",
    );
    let input = AudioBuffer::sine(330.0, 0.2, 0.2, 2, 16000);
    let report = pipeline.normalize_report(&input);
    assert!(report.is_degraded());
    assert_eq!(report.buffer.num_channels(), 2);
}

#[test]
fn test_sweep_ignores_fresh_and_foreign_files() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("notes.txt"), b"keep").unwrap();
    let mut scope = TempResourceScope::new(temp.path());
    let _held = scope.acquire(".wav").unwrap();

    let removed = sweep_orphans(temp.path(), std::time::Duration::from_secs(3600));

    assert_eq!(removed, 0);
    assert!(temp.path().join("notes.txt").exists());
    assert_eq!(leftovers(temp.path()).len(), 1);
}
