//! Loudness normalization pipeline
//!
//! `normalize` never fails. When the external filter works, the result is
//! EBU R128 normalized and resampled to the filter's output rate. When it
//! does not (tool missing, bad exit, unreadable output, temp file trouble),
//! the original buffer is peak-normalized in memory instead. That fallback
//! has no loudness-range or true-peak control and is a degraded result;
//! `normalize_report` tells callers which path was taken.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::audio::codec::{read_wav, write_wav};
use crate::audio::dynamics::{peak_normalize, DEFAULT_HEADROOM_DB};
use crate::audio::{AudioBuffer, WavEncoding};
use crate::config::RescueConfig;
use crate::error::{RescueError, Result};
use crate::loudness::{ExternalFilterInvoker, FilterSpec, TempResourceScope};

/// Which route produced a normalized buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizationPath {
    /// The external loudness filter ran successfully
    External,
    /// Peak normalization in memory; `reason` says why the filter was skipped
    Fallback { reason: String },
}

/// A normalized buffer plus how it was made
#[derive(Debug, Clone)]
pub struct NormalizationReport {
    pub buffer: AudioBuffer,
    pub path: NormalizationPath,
}

impl NormalizationReport {
    pub fn is_degraded(&self) -> bool {
        matches!(self.path, NormalizationPath::Fallback { .. })
    }
}

#[derive(Debug, Clone)]
pub struct LoudnessNormalizationPipeline {
    invoker: ExternalFilterInvoker,
    temp_dir: PathBuf,
    spec: FilterSpec,
}

impl LoudnessNormalizationPipeline {
    pub fn new(invoker: ExternalFilterInvoker, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            invoker,
            temp_dir: temp_dir.into(),
            spec: FilterSpec::default(),
        }
    }

    pub fn from_config(config: &RescueConfig) -> Self {
        Self::new(ExternalFilterInvoker::new(&config.ffmpeg_path), &config.temp_dir)
            .with_spec(config.loudness)
    }

    pub fn with_spec(mut self, spec: FilterSpec) -> Self {
        self.spec = spec;
        self
    }

    pub fn spec(&self) -> &FilterSpec {
        &self.spec
    }

    /// Normalize with the configured targets
    pub fn normalize(&self, buffer: &AudioBuffer) -> AudioBuffer {
        self.normalize_report(buffer).buffer
    }

    pub fn normalize_report(&self, buffer: &AudioBuffer) -> NormalizationReport {
        self.normalize_with(buffer, &self.spec)
    }

    /// Normalize with one-off targets
    pub fn normalize_with(&self, buffer: &AudioBuffer, spec: &FilterSpec) -> NormalizationReport {
        match self.run_external(buffer, spec) {
            Ok(normalized) => {
                info!(
                    target_lufs = spec.integrated_lufs,
                    duration = normalized.duration(),
                    "loudness normalized by external filter"
                );
                NormalizationReport {
                    buffer: normalized,
                    path: NormalizationPath::External,
                }
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "loudness filter unavailable, falling back to peak normalization"
                );
                NormalizationReport {
                    buffer: peak_normalize(buffer, DEFAULT_HEADROOM_DB),
                    path: NormalizationPath::Fallback {
                        reason: e.to_string(),
                    },
                }
            }
        }
    }

    fn run_external(&self, buffer: &AudioBuffer, spec: &FilterSpec) -> Result<AudioBuffer> {
        if buffer.is_empty() {
            return Err(RescueError::EmptyAudio);
        }

        // Both files are removed when `scope` drops, on every return below.
        let mut scope = TempResourceScope::new(&self.temp_dir);
        let input = scope.acquire(".wav")?;
        let output = scope.acquire(".wav")?;

        write_wav(buffer, input.path(), WavEncoding::Float32)?;

        let invocation = self.invoker.invoke(input.path(), output.path(), spec);
        if let Some(reason) = invocation.failure_reason() {
            return Err(RescueError::FilterFailed {
                reason: reason.to_string(),
            });
        }

        let normalized = read_wav(output.path())?;
        if normalized.num_channels() != buffer.num_channels() {
            return Err(RescueError::FilterFailed {
                reason: format!(
                    "filter changed channel count from {} to {}",
                    buffer.num_channels(),
                    normalized.num_channels()
                ),
            });
        }
        Ok(normalized)
    }
}
