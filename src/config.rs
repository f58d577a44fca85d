//! Runtime configuration
//!
//! Everything comes from `PODRESCUE_*` environment variables with sensible
//! defaults, so a bare `podrescue-cli balance in.wav out.wav` works as long as
//! ffmpeg is on the PATH.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::loudness::FilterSpec;

const DEFAULT_DENOISE_URL: &str = "http://localhost:8001";
const DEFAULT_SPEECH_URL: &str = "http://localhost:8002";
const DEFAULT_TIMEOUT_MS: u64 = 300_000; // 5 minutes

/// Where and how to reach one remote enhancement provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    pub base_url: String,
    /// Bearer credential; never serialized
    #[serde(skip)]
    pub token: Option<String>,
    pub timeout_ms: u64,
}

impl ProviderEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// Session-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RescueConfig {
    /// ffmpeg binary used for loudnorm and transcoding
    pub ffmpeg_path: PathBuf,
    /// Directory for ephemeral hand-off files
    pub temp_dir: PathBuf,
    /// Loudness target for the balance pipeline
    pub loudness: FilterSpec,
    /// Remote denoise/enhance provider
    pub denoise: ProviderEndpoint,
    /// Remote speech enhancer
    pub speech: ProviderEndpoint,
}

impl Default for RescueConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            temp_dir: env::temp_dir(),
            loudness: FilterSpec::default(),
            denoise: ProviderEndpoint::new(DEFAULT_DENOISE_URL),
            speech: ProviderEndpoint::new(DEFAULT_SPEECH_URL),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

impl RescueConfig {
    /// Build configuration from the environment
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = env::var("PODRESCUE_FFMPEG") {
            config.ffmpeg_path = PathBuf::from(path);
        }
        if let Ok(dir) = env::var("PODRESCUE_TEMP_DIR") {
            config.temp_dir = PathBuf::from(dir);
        }

        if let Some(v) = env_parse("PODRESCUE_TARGET_LUFS") {
            config.loudness.integrated_lufs = v;
        }
        if let Some(v) = env_parse("PODRESCUE_TARGET_LRA") {
            config.loudness.loudness_range = v;
        }
        if let Some(v) = env_parse("PODRESCUE_TARGET_TP") {
            config.loudness.true_peak_db = v;
        }

        if let Ok(url) = env::var("PODRESCUE_DENOISE_URL") {
            config.denoise.base_url = url;
        }
        if let Ok(url) = env::var("PODRESCUE_SPEECH_URL") {
            config.speech.base_url = url;
        }

        let token = env::var("PODRESCUE_API_TOKEN").ok().filter(|t| !t.is_empty());
        config.denoise.token = token.clone();
        config.speech.token = token;

        let timeout_ms = env_parse("PODRESCUE_TIMEOUT_MS").unwrap_or(DEFAULT_TIMEOUT_MS);
        config.denoise.timeout_ms = timeout_ms;
        config.speech.timeout_ms = timeout_ms;

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RescueConfig::default();
        assert_eq!(config.ffmpeg_path, PathBuf::from("ffmpeg"));
        assert_eq!(config.loudness.integrated_lufs, -16.0);
        assert_eq!(config.denoise.timeout_ms, 300_000);
        assert!(config.denoise.token.is_none());
    }

    #[test]
    fn test_token_is_not_serialized() {
        let mut config = RescueConfig::default();
        config.denoise = config.denoise.with_token("secret");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
