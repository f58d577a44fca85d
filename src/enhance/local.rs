//! Providers that run in-process
//!
//! They go through the same submit/fetch contract as the remote ones so the
//! job runner can treat every provider alike.

use tracing::info;

use crate::audio::{sound_rescue, AudioBuffer};
use crate::enhance::params::{ProviderKind, ProviderParams};
use crate::enhance::provider::{params_mismatch, EnhancementProvider, RawResult};
use crate::error::{RescueError, Result};
use crate::loudness::{LoudnessNormalizationPipeline, TempResourceScope};

/// Loudness balance through the normalization pipeline
pub struct BalanceProvider {
    pipeline: LoudnessNormalizationPipeline,
}

impl BalanceProvider {
    pub fn new(pipeline: LoudnessNormalizationPipeline) -> Self {
        Self { pipeline }
    }
}

impl EnhancementProvider for BalanceProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::LoudnessBalance
    }

    /// Resampling to the filter rate can shift the length by a frame or two
    fn duration_tolerance(&self) -> f64 {
        0.05
    }

    fn submit(
        &self,
        input: &AudioBuffer,
        params: &ProviderParams,
        _scope: &mut TempResourceScope,
    ) -> Result<RawResult> {
        let ProviderParams::LoudnessBalance(balance) = params else {
            return Err(params_mismatch(self.kind(), params));
        };
        params.validate()?;
        let spec = balance.filter_spec(self.pipeline.spec().sample_rate);
        let report = self.pipeline.normalize_with(input, &spec);
        if report.is_degraded() {
            info!("loudness balance used the peak-normalize fallback");
        }
        Ok(RawResult::Local(report.buffer))
    }

    fn fetch(&self, raw: RawResult) -> Result<AudioBuffer> {
        local_only(self.kind(), raw)
    }
}

/// Peak normalize, then compress
pub struct SoundRescueProvider;

impl EnhancementProvider for SoundRescueProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::SoundRescue
    }

    fn duration_tolerance(&self) -> f64 {
        0.001
    }

    fn submit(
        &self,
        input: &AudioBuffer,
        params: &ProviderParams,
        _scope: &mut TempResourceScope,
    ) -> Result<RawResult> {
        let ProviderParams::SoundRescue(compressor) = params else {
            return Err(params_mismatch(self.kind(), params));
        };
        compressor.validate()?;
        Ok(RawResult::Local(sound_rescue(input, compressor)))
    }

    fn fetch(&self, raw: RawResult) -> Result<AudioBuffer> {
        local_only(self.kind(), raw)
    }
}

fn local_only(kind: ProviderKind, raw: RawResult) -> Result<AudioBuffer> {
    match raw {
        RawResult::Local(buffer) => Ok(buffer),
        _ => Err(RescueError::Provider {
            provider: kind.to_string(),
            reason: "local provider received a remote result".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loudness::ExternalFilterInvoker;
    use tempfile::tempdir;

    #[test]
    fn test_balance_provider_survives_missing_tool() {
        let dir = tempdir().unwrap();
        let pipeline = LoudnessNormalizationPipeline::new(
            ExternalFilterInvoker::new("/nonexistent/podrescue-ffmpeg"),
            dir.path(),
        );
        let provider = BalanceProvider::new(pipeline);
        let input = AudioBuffer::sine(440.0, 0.1, 0.5, 2, 44100);
        let mut scope = TempResourceScope::new(dir.path());

        let raw = provider
            .submit(&input, &ProviderParams::defaults(ProviderKind::LoudnessBalance), &mut scope)
            .unwrap();
        let out = provider.fetch(raw).unwrap();
        assert_eq!(out.num_samples(), input.num_samples());
        assert!(out.peak() > input.peak());
    }

    #[test]
    fn test_sound_rescue_rejects_wrong_params() {
        let dir = tempdir().unwrap();
        let mut scope = TempResourceScope::new(dir.path());
        let input = AudioBuffer::sine(440.0, 0.1, 0.1, 1, 44100);
        let denoise = ProviderParams::defaults(ProviderKind::Denoise);
        let result = SoundRescueProvider.submit(&input, &denoise, &mut scope);
        assert!(matches!(result, Err(RescueError::InvalidParameter { .. })));
    }

    #[test]
    fn test_sound_rescue_keeps_shape() {
        let dir = tempdir().unwrap();
        let mut scope = TempResourceScope::new(dir.path());
        let input = AudioBuffer::sine(440.0, 0.3, 0.25, 2, 22050);
        let raw = SoundRescueProvider
            .submit(&input, &ProviderParams::defaults(ProviderKind::SoundRescue), &mut scope)
            .unwrap();
        let out = SoundRescueProvider.fetch(raw).unwrap();
        assert_eq!(out.num_channels(), 2);
        assert_eq!(out.num_samples(), input.num_samples());
        assert!(out.peak() < 1.0);
    }
}
