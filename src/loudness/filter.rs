//! External loudness filter invocation
//!
//! Runs `ffmpeg -y -i <in> -af loudnorm=I=..:LRA=..:TP=.. -ar 44100 <out>`
//! with every stdio stream silenced. The result is always a value: a missing
//! binary, a non-zero exit or an empty output file all come back as
//! `FilterOutcome::Failure` so the caller can decide on a fallback.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Output sample rate forced by the filter invocation
pub const FILTER_SAMPLE_RATE: u32 = 44100;

/// Run a tool with stdin/stdout/stderr all attached to the null device
pub(crate) fn run_quiet(program: &Path, args: &[OsString]) -> io::Result<ExitStatus> {
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
}

/// EBU R128 targets for the `loudnorm` filter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Integrated loudness target in LUFS
    pub integrated_lufs: f32,
    /// Loudness range target in LU
    pub loudness_range: f32,
    /// True-peak ceiling in dBTP
    pub true_peak_db: f32,
    /// Output sample rate in Hz
    pub sample_rate: u32,
}

impl Default for FilterSpec {
    /// Podcast standard: -16 LUFS, 11 LU, -1.5 dBTP
    fn default() -> Self {
        Self {
            integrated_lufs: -16.0,
            loudness_range: 11.0,
            true_peak_db: -1.5,
            sample_rate: FILTER_SAMPLE_RATE,
        }
    }
}

impl FilterSpec {
    /// The `-af` filter expression
    pub fn expression(&self) -> String {
        format!(
            "loudnorm=I={}:LRA={}:TP={}",
            self.integrated_lufs, self.loudness_range, self.true_peak_db
        )
    }
}

/// What happened when the tool ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    Success,
    Failure(String),
}

/// Record of a single subprocess call
#[derive(Debug, Clone)]
pub struct FilterInvocation {
    program: PathBuf,
    args: Vec<OsString>,
    exit_code: Option<i32>,
    outcome: FilterOutcome,
}

impl FilterInvocation {
    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Exit code, if the process ran and exited normally
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn outcome(&self) -> &FilterOutcome {
        &self.outcome
    }

    pub fn is_success(&self) -> bool {
        self.outcome == FilterOutcome::Success
    }

    /// Failure reason, `None` on success
    pub fn failure_reason(&self) -> Option<&str> {
        match &self.outcome {
            FilterOutcome::Success => None,
            FilterOutcome::Failure(reason) => Some(reason),
        }
    }
}

/// Invokes the loudness filter tool
#[derive(Debug, Clone)]
pub struct ExternalFilterInvoker {
    program: PathBuf,
}

impl Default for ExternalFilterInvoker {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl ExternalFilterInvoker {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Argument vector for one invocation, in the exact order the tool gets it
    pub fn command_args(&self, input: &Path, output: &Path, spec: &FilterSpec) -> Vec<OsString> {
        vec![
            "-y".into(),
            "-i".into(),
            input.into(),
            "-af".into(),
            spec.expression().into(),
            "-ar".into(),
            spec.sample_rate.to_string().into(),
            output.into(),
        ]
    }

    pub fn invoke(&self, input: &Path, output: &Path, spec: &FilterSpec) -> FilterInvocation {
        let args = self.command_args(input, output, spec);
        debug!(
            program = %self.program.display(),
            filter = %spec.expression(),
            "invoking loudness filter"
        );

        let (exit_code, outcome) = match run_quiet(&self.program, &args) {
            Err(e) => (
                None,
                FilterOutcome::Failure(format!("could not run {}: {}", self.program.display(), e)),
            ),
            Ok(status) if !status.success() => (
                status.code(),
                FilterOutcome::Failure(format!(
                    "{} exited with {}",
                    self.program.display(),
                    status
                )),
            ),
            Ok(status) => {
                let has_data = fs::metadata(output).map(|m| m.len() > 0).unwrap_or(false);
                let outcome = if has_data {
                    FilterOutcome::Success
                } else {
                    FilterOutcome::Failure(format!("no output written to {}", output.display()))
                };
                (status.code(), outcome)
            }
        };

        FilterInvocation {
            program: self.program.clone(),
            args,
            exit_code,
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_default_expression() {
        assert_eq!(
            FilterSpec::default().expression(),
            "loudnorm=I=-16:LRA=11:TP=-1.5"
        );
    }

    #[test]
    fn test_command_line_layout() {
        let invoker = ExternalFilterInvoker::default();
        let args =
            invoker.command_args(Path::new("in.wav"), Path::new("out.wav"), &FilterSpec::default());
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "-y",
                "-i",
                "in.wav",
                "-af",
                "loudnorm=I=-16:LRA=11:TP=-1.5",
                "-ar",
                "44100",
                "out.wav"
            ]
        );
    }

    #[test]
    fn test_missing_binary_is_a_failure_value() {
        let dir = tempdir().unwrap();
        let invoker = ExternalFilterInvoker::new("/nonexistent/podrescue-ffmpeg");
        let inv = invoker.invoke(
            &dir.path().join("in.wav"),
            &dir.path().join("out.wav"),
            &FilterSpec::default(),
        );
        assert!(!inv.is_success());
        assert_eq!(inv.exit_code(), None);
        assert!(inv.failure_reason().unwrap().contains("could not run"));
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_a_failure_value() {
        let dir = tempdir().unwrap();
        let inv = ExternalFilterInvoker::new("false").invoke(
            &dir.path().join("in.wav"),
            &dir.path().join("out.wav"),
            &FilterSpec::default(),
        );
        assert!(!inv.is_success());
        assert_eq!(inv.exit_code(), Some(1));
    }

    #[cfg(unix)]
    #[test]
    fn test_clean_exit_without_output_is_a_failure() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("out.wav");
        fs::write(&output, b"").unwrap();
        let inv = ExternalFilterInvoker::new("true").invoke(
            &dir.path().join("in.wav"),
            &output,
            &FilterSpec::default(),
        );
        assert!(!inv.is_success());
        assert!(inv.failure_reason().unwrap().contains("no output"));
    }
}
