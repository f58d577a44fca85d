//! HTTP client shared by the remote providers
//!
//! Protocol: `POST {base_url}/v1/enhance/{provider}` with a multipart body
//! holding the audio file (`audio`) and a JSON parameter object (`params`).
//! The response is either the enhanced audio itself, or JSON naming a URL to
//! download it from, or JSON carrying an error message.

use std::path::Path;
use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::debug;

use crate::audio::codec::{write_wav, AudioFormat};
use crate::audio::{AudioBuffer, Codec, WavEncoding};
use crate::config::ProviderEndpoint;
use crate::enhance::params::{ProviderKind, ProviderParams};
use crate::enhance::provider::RawResult;
use crate::error::{RescueError, Result};
use crate::loudness::TempResourceScope;

const MAX_ERROR_BODY: usize = 200;

/// JSON body a provider answers with when it does not return audio directly
#[derive(Debug, Deserialize)]
struct ProviderResponse {
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Decide what a provider response means
pub fn interpret_response(
    provider: ProviderKind,
    base_url: &str,
    status: u16,
    content_type: Option<&str>,
    body: &[u8],
) -> Result<RawResult> {
    let provider_error = |reason: String| RescueError::Provider {
        provider: provider.to_string(),
        reason,
    };

    if !(200..300).contains(&status) {
        let excerpt: String = String::from_utf8_lossy(body).chars().take(MAX_ERROR_BODY).collect();
        return Err(provider_error(format!("HTTP {}: {}", status, excerpt.trim())));
    }

    let content_type = content_type.unwrap_or("").to_lowercase();
    if content_type.starts_with("audio/") || content_type.starts_with("application/octet-stream") {
        if body.is_empty() {
            return Err(provider_error("empty audio response".to_string()));
        }
        return Ok(RawResult::Inline(body.to_vec()));
    }

    let response: ProviderResponse = serde_json::from_slice(body)
        .map_err(|e| provider_error(format!("Invalid response from provider: {}", e)))?;

    if let Some(error) = response.error.filter(|e| !e.is_empty()) {
        return Err(provider_error(error));
    }
    match response.output.filter(|o| !o.is_empty()) {
        Some(url) if url.starts_with('/') => Ok(RawResult::Remote {
            url: format!("{}{}", base_url.trim_end_matches('/'), url),
        }),
        Some(url) => Ok(RawResult::Remote { url }),
        None => Err(provider_error("response carried neither audio nor an output URL".to_string())),
    }
}

/// Blocking HTTP client for one remote provider
#[derive(Debug, Clone)]
pub struct RemoteClient {
    provider: ProviderKind,
    endpoint: ProviderEndpoint,
    http: Client,
    codec: Codec,
}

impl RemoteClient {
    pub fn new(provider: ProviderKind, endpoint: ProviderEndpoint, codec: Codec) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(endpoint.timeout_ms))
            .build()
            .map_err(|e| RescueError::ProviderUnavailable {
                provider: provider.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            provider,
            endpoint,
            http,
            codec,
        })
    }

    pub fn endpoint(&self) -> &ProviderEndpoint {
        &self.endpoint
    }

    pub fn enhance_url(&self) -> String {
        format!(
            "{}/v1/enhance/{}",
            self.endpoint.base_url.trim_end_matches('/'),
            self.provider
        )
    }

    fn map_send_error(&self, e: reqwest::Error) -> RescueError {
        if e.is_timeout() {
            RescueError::ProviderTimeout {
                provider: self.provider.to_string(),
                timeout_ms: self.endpoint.timeout_ms,
            }
        } else if e.is_connect() {
            RescueError::ProviderUnavailable {
                provider: self.provider.to_string(),
                reason: format!("Cannot connect to {}: {}", self.endpoint.base_url, e),
            }
        } else {
            RescueError::Provider {
                provider: self.provider.to_string(),
                reason: e.to_string(),
            }
        }
    }

    fn authorize(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        match &self.endpoint.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Write the input to a temp WAV and post it with its parameters
    pub fn submit(
        &self,
        input: &AudioBuffer,
        params: &ProviderParams,
        scope: &mut TempResourceScope,
    ) -> Result<RawResult> {
        let upload = scope.acquire(".wav")?;
        write_wav(input, upload.path(), WavEncoding::Pcm16)?;
        self.post_file(upload.path(), params)
    }

    fn post_file(&self, audio: &Path, params: &ProviderParams) -> Result<RawResult> {
        let provider_error = |reason: String| RescueError::Provider {
            provider: self.provider.to_string(),
            reason,
        };

        let audio_part = Part::file(audio)
            .map_err(|source| RescueError::TempResource {
                path: audio.to_path_buf(),
                source,
            })?
            .mime_str(AudioFormat::Wav.mime_type())
            .map_err(|e| provider_error(e.to_string()))?;
        let params_part = Part::text(serde_json::to_string(&params.values())?)
            .mime_str("application/json")
            .map_err(|e| provider_error(e.to_string()))?;
        let form = Form::new().part("audio", audio_part).part("params", params_part);

        let url = self.enhance_url();
        debug!(provider = %self.provider, url = %url, "posting audio to provider");

        let response = self
            .authorize(self.http.post(&url))
            .multipart(form)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().map_err(|e| self.map_send_error(e))?;

        interpret_response(
            self.provider,
            &self.endpoint.base_url,
            status,
            content_type.as_deref(),
            &body,
        )
    }

    /// Download a result handle
    pub fn download(&self, url: &str) -> Result<Vec<u8>> {
        debug!(provider = %self.provider, url = %url, "fetching provider result");
        let response = self
            .authorize(self.http.get(url))
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RescueError::Provider {
                provider: self.provider.to_string(),
                reason: format!("download failed with HTTP {}", status.as_u16()),
            });
        }
        Ok(response.bytes().map_err(|e| self.map_send_error(e))?.to_vec())
    }

    /// Resolve a raw result into audio
    pub fn fetch(&self, raw: RawResult) -> Result<AudioBuffer> {
        let bytes = match raw {
            RawResult::Inline(bytes) => bytes,
            RawResult::Remote { url } => self.download(&url)?,
            RawResult::Local(buffer) => return Ok(buffer),
        };
        self.codec.decode(&bytes, None).map_err(|e| RescueError::Provider {
            provider: self.provider.to_string(),
            reason: format!("could not decode result: {}", e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::codec::encode_wav;

    const BASE: &str = "http://enhancer.local:8001";
    const JSON: &str = "application/json";

    #[test]
    fn test_inline_audio_response() {
        let wav = encode_wav(&AudioBuffer::new(1, 10, 16000), WavEncoding::Pcm16).unwrap();
        let raw =
            interpret_response(ProviderKind::Denoise, BASE, 200, Some("audio/wav"), &wav).unwrap();
        assert!(matches!(raw, RawResult::Inline(bytes) if bytes == wav));
    }

    #[test]
    fn test_output_url_response() {
        let body = br#"{"output": "https://cdn.example/out.wav"}"#;
        let raw = interpret_response(ProviderKind::Denoise, BASE, 200, Some(JSON), body).unwrap();
        assert!(matches!(raw, RawResult::Remote { url } if url == "https://cdn.example/out.wav"));
    }

    #[test]
    fn test_relative_output_url_joins_base() {
        let body = br#"{"output": "/files/abc.wav"}"#;
        let raw = interpret_response(ProviderKind::SpeechEnhance, "http://h:1/", 200, None, body)
            .unwrap();
        assert!(matches!(raw, RawResult::Remote { url } if url == "http://h:1/files/abc.wav"));
    }

    #[test]
    fn test_error_body_becomes_provider_error() {
        let body = br#"{"error": "model overloaded"}"#;
        let err =
            interpret_response(ProviderKind::Denoise, BASE, 200, Some(JSON), body).unwrap_err();
        assert!(err.to_string().contains("model overloaded"));
    }

    #[test]
    fn test_http_failure_status() {
        let err = interpret_response(ProviderKind::Denoise, BASE, 503, Some("text/plain"), b"busy")
            .unwrap_err();
        assert!(matches!(err, RescueError::Provider { ref reason, .. } if reason.contains("503")));
    }

    #[test]
    fn test_malformed_json() {
        assert!(
            interpret_response(ProviderKind::Denoise, BASE, 200, Some(JSON), b"<html>").is_err()
        );
        assert!(interpret_response(ProviderKind::Denoise, BASE, 200, Some(JSON), b"{}").is_err());
    }

    #[test]
    fn test_enhance_url() {
        let client = RemoteClient::new(
            ProviderKind::SpeechEnhance,
            ProviderEndpoint::new("http://localhost:8002/"),
            Codec::new("ffmpeg", std::env::temp_dir()),
        )
        .unwrap();
        assert_eq!(client.enhance_url(), "http://localhost:8002/v1/enhance/speech_enhance");
    }
}
