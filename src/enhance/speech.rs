//! Remote speech enhancer

use crate::audio::AudioBuffer;
use crate::enhance::params::{ProviderKind, ProviderParams};
use crate::enhance::provider::{params_mismatch, EnhancementProvider, RawResult};
use crate::enhance::remote::RemoteClient;
use crate::error::Result;
use crate::loudness::TempResourceScope;

/// 16 kHz models round the length to their hop size
const DURATION_TOLERANCE_SECS: f64 = 0.25;

pub struct SpeechEnhanceProvider {
    client: RemoteClient,
}

impl SpeechEnhanceProvider {
    pub fn new(client: RemoteClient) -> Self {
        Self { client }
    }
}

impl EnhancementProvider for SpeechEnhanceProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::SpeechEnhance
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
        let ProviderParams::SpeechEnhance(speech) = params else {
            return Err(params_mismatch(self.kind(), params));
        };
        tracing::debug!(model = ?speech.model, "submitting to speech enhancer");
        params.validate()?;
        self.client.submit(input, params, scope)
    }

    fn fetch(&self, raw: RawResult) -> Result<AudioBuffer> {
        self.client.fetch(raw)
    }
}
