//! Provider abstraction
//!
//! A provider turns one input buffer plus its parameters into one output
//! buffer in two strictly sequential steps: `submit` hands the audio over and
//! returns a raw result, `fetch` turns that raw result back into audio.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::audio::{AudioBuffer, Codec};
use crate::config::RescueConfig;
use crate::enhance::local::{BalanceProvider, SoundRescueProvider};
use crate::enhance::params::{ProviderKind, ProviderParams};
use crate::enhance::remote::RemoteClient;
use crate::enhance::{DenoiseProvider, SpeechEnhanceProvider};
use crate::error::{RescueError, Result};
use crate::loudness::{LoudnessNormalizationPipeline, TempResourceScope};

/// What `submit` hands back
#[derive(Debug, Clone)]
pub enum RawResult {
    /// Encoded audio returned directly in the response
    Inline(Vec<u8>),
    /// A handle to download the result from
    Remote { url: String },
    /// Already-decoded audio from a local provider
    Local(AudioBuffer),
}

/// Trait that every enhancement provider implements
pub trait EnhancementProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// How far, in seconds, the output duration may drift from the input.
    /// Remote models may trim silence or pad frames.
    fn duration_tolerance(&self) -> f64;

    /// Hand the audio to the provider. Hand-off files go in `scope`.
    fn submit(
        &self,
        input: &AudioBuffer,
        params: &ProviderParams,
        scope: &mut TempResourceScope,
    ) -> Result<RawResult>;

    /// Turn a raw result into audio
    fn fetch(&self, raw: RawResult) -> Result<AudioBuffer>;
}

/// Error for a provider that was handed another provider's parameters
pub(crate) fn params_mismatch(expected: ProviderKind, params: &ProviderParams) -> RescueError {
    RescueError::InvalidParameter {
        param: "provider".to_string(),
        value: params.kind().to_string(),
        expected: expected.to_string(),
    }
}

/// Providers available to a session, one per kind
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<ProviderKind, Arc<dyn EnhancementProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the real providers described by the configuration
    pub fn from_config(config: &RescueConfig) -> Result<Self> {
        let codec = Codec::from_config(config);
        let pipeline = LoudnessNormalizationPipeline::from_config(config);

        let mut registry = Self::new();
        registry.register(Arc::new(DenoiseProvider::new(RemoteClient::new(
            ProviderKind::Denoise,
            config.denoise.clone(),
            codec.clone(),
        )?)));
        registry.register(Arc::new(SpeechEnhanceProvider::new(RemoteClient::new(
            ProviderKind::SpeechEnhance,
            config.speech.clone(),
            codec,
        )?)));
        registry.register(Arc::new(BalanceProvider::new(pipeline)));
        registry.register(Arc::new(SoundRescueProvider));
        Ok(registry)
    }

    /// Register a provider, replacing any previous one of the same kind
    pub fn register(&mut self, provider: Arc<dyn EnhancementProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    pub fn get(&self, kind: ProviderKind) -> Result<Arc<dyn EnhancementProvider>> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or_else(|| RescueError::UnknownProvider {
                provider: kind.to_string(),
            })
    }

    pub fn has(&self, kind: ProviderKind) -> bool {
        self.providers.contains_key(&kind)
    }

    pub fn kinds(&self) -> Vec<ProviderKind> {
        self.providers.keys().copied().collect()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.kinds())
            .finish()
    }
}
