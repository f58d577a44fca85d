//! Remote diffusion denoiser/enhancer

use crate::audio::AudioBuffer;
use crate::enhance::params::{ProviderKind, ProviderParams};
use crate::enhance::provider::{params_mismatch, EnhancementProvider, RawResult};
use crate::enhance::remote::RemoteClient;
use crate::error::Result;
use crate::loudness::TempResourceScope;

/// The model may trim leading/trailing silence by up to half a second
const DURATION_TOLERANCE_SECS: f64 = 0.5;

pub struct DenoiseProvider {
    client: RemoteClient,
}

impl DenoiseProvider {
    pub fn new(client: RemoteClient) -> Self {
        Self { client }
    }
}

impl EnhancementProvider for DenoiseProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Denoise
    }

    fn duration_tolerance(&self) -> f64 {
        DURATION_TOLERANCE_SECS
    }

    fn submit(
        &self,
        input: &AudioBuffer,
        params: &ProviderParams,
        scope: &mut TempResourceScope,
    ) -> Result<RawResult> {
        let ProviderParams::Denoise(denoise) = params else {
            return Err(params_mismatch(self.kind(), params));
        };
        tracing::debug!(
            temperature = denoise.temperature,
            nfe = denoise.nfe,
            "submitting to denoise provider"
        );
        params.validate()?;
        self.client.submit(input, params, scope)
    }

    fn fetch(&self, raw: RawResult) -> Result<AudioBuffer> {
        self.client.fetch(raw)
    }
}
