//! Per-session context
//!
//! A [`Session`] owns everything one user works with: configuration, the
//! codec, the loudness pipeline, the job runner, the provider settings the UI
//! edits and the project history. It is passed around explicitly; there is
//! no process-wide state.

pub mod history;

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use crate::audio::{AudioBuffer, AudioFormat, Codec};
use crate::config::RescueConfig;
use crate::enhance::{
    EnhancementJob, JobEvent, JobId, JobRunner, JobState, ProviderKind, ProviderRegistry,
    ProviderSettings, SourceId,
};
use crate::error::Result;
use crate::loudness::{LoudnessNormalizationPipeline, NormalizationPath};

pub use history::{AudioVersion, ProjectHistory, VersionSummary};

#[derive(Debug)]
pub struct Session {
    config: RescueConfig,
    codec: Codec,
    pipeline: LoudnessNormalizationPipeline,
    runner: JobRunner,
    settings: ProviderSettings,
    history: ProjectHistory,
    /// Job id -> name of the version it was submitted for
    pending: HashMap<JobId, String>,
    /// Job id -> name of the version it produced
    produced: HashMap<JobId, String>,
}

impl Session {
    /// Session with the real providers described by `config`
    pub fn new(config: RescueConfig) -> Result<Self> {
        let registry = ProviderRegistry::from_config(&config)?;
        Ok(Self::with_registry(config, registry))
    }

    /// Session with a caller-supplied set of providers
    pub fn with_registry(config: RescueConfig, registry: ProviderRegistry) -> Self {
        Self {
            codec: Codec::from_config(&config),
            pipeline: LoudnessNormalizationPipeline::from_config(&config),
            runner: JobRunner::new(registry, config.temp_dir.clone()),
            settings: ProviderSettings::default(),
            history: ProjectHistory::new(),
            pending: HashMap::new(),
            produced: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &RescueConfig {
        &self.config
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn history(&self) -> &ProjectHistory {
        &self.history
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut ProviderSettings {
        &mut self.settings
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    /// Decode uploaded bytes and add them as an original version
    ///
    /// Returns the stored name, which gets a suffix if `name` is taken.
    pub fn load_original(
        &mut self,
        name: &str,
        bytes: &[u8],
        hint: Option<AudioFormat>,
    ) -> Result<String> {
        let buffer = self.codec.decode(bytes, hint)?;
        let source = SourceId::from_bytes(bytes);
        let name = self.history.unique_name(name);
        info!(
            name = %name,
            source = %source,
            seconds = buffer.duration(),
            channels = buffer.num_channels(),
            "loaded original"
        );
        self.history.append_original(name.clone(), source, buffer)?;
        Ok(name)
    }

    /// Read a file from disk and add it as an original version
    pub fn load_file(&mut self, path: &Path) -> Result<String> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        self.load_original(&name, &bytes, AudioFormat::from_path(path))
    }

    /// Add an already-decoded buffer as an original version
    pub fn add_original_buffer(&mut self, name: &str, buffer: AudioBuffer) -> Result<String> {
        let name = self.history.unique_name(name);
        self.history.append_original(name.clone(), SourceId::random(), buffer)?;
        Ok(name)
    }

    /// Loudness-balance a version synchronously with the configured target
    ///
    /// Never fails on the filter itself; the returned path says whether the
    /// degraded peak-normalize fallback was used.
    pub fn balance(&mut self, version: &str) -> Result<(String, NormalizationPath)> {
        let input = self.history.get(version)?.buffer();
        let report = self.pipeline.normalize_report(input);
        if let NormalizationPath::Fallback { reason } = &report.path {
            warn!(
                version = %version,
                reason = %reason,
                "loudness balance fell back to peak normalization"
            );
        }
        let name = self.history.unique_name(&format!("balanced_{}", version));
        self.history
            .append_derived(name.clone(), version, ProviderKind::LoudnessBalance, report.buffer)?;
        Ok((name, report.path))
    }

    /// Start a job on a version with the currently selected provider
    ///
    /// The parameters are frozen at this point; later edits to the settings
    /// only affect later submissions.
    pub fn submit(&mut self, version: &str) -> Result<JobId> {
        self.pump();
        let stored = self.history.get(version)?;
        let job = EnhancementJob::new(
            stored.source().clone(),
            stored.buffer().clone(),
            self.settings.freeze(),
        );
        let job_id = self.runner.submit(job)?;
        self.pending.insert(job_id, version.to_string());
        Ok(job_id)
    }

    pub fn is_busy(&self, version: &str) -> bool {
        self.history
            .get(version)
            .map(|v| self.runner.is_busy(v.source()))
            .unwrap_or(false)
    }

    pub fn job_state(&self, job_id: JobId) -> Option<JobState> {
        self.runner.job(job_id).map(|j| j.state())
    }

    pub fn job_error(&self, job_id: JobId) -> Option<String> {
        self.runner.job(job_id).and_then(|j| j.error().map(str::to_string))
    }

    /// Apply finished jobs: successful results become new versions
    pub fn pump(&mut self) -> Vec<JobEvent> {
        let events = self.runner.poll();
        for event in &events {
            let Some(parent) = self.pending.remove(&event.job_id) else {
                continue;
            };
            let Some(buffer) = event.result.clone().filter(|_| event.succeeded()) else {
                continue;
            };
            let name = self.history.unique_name(&format!("{}_{}", event.provider, parent));
            match self.history.append_derived(name.clone(), &parent, event.provider, buffer) {
                Ok(_) => {
                    info!(version = %name, parent = %parent, "added rescued version");
                    self.produced.insert(event.job_id, name);
                }
                Err(e) => warn!(parent = %parent, error = %e, "could not record job result"),
            }
        }
        events
    }

    /// Block until a job finishes, then apply its result
    pub fn wait(&mut self, job_id: JobId, timeout: Duration) -> Result<JobState> {
        let state = self.runner.wait(job_id, timeout)?;
        self.pump();
        Ok(state)
    }

    /// The version a succeeded job produced, once pumped
    pub fn version_for_job(&self, job_id: JobId) -> Option<&AudioVersion> {
        let name = self.produced.get(&job_id)?;
        self.history.get(name).ok()
    }

    /// Encode a version to disk; the format follows the extension
    pub fn export(&self, version: &str, path: &Path) -> Result<()> {
        let buffer = self.history.get(version)?.buffer();
        self.codec.write_file(buffer, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enhance::mock::MockProvider;
    use crate::error::RescueError;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::tempdir;

    const WAIT: Duration = Duration::from_secs(10);

    fn session(dir: &Path, provider: MockProvider) -> Session {
        let mut config = RescueConfig::default();
        config.temp_dir = dir.to_path_buf();
        config.ffmpeg_path = "/nonexistent/podrescue-ffmpeg".into();
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(provider));
        Session::with_registry(config, registry)
    }

    #[test]
    fn test_successful_job_adds_version() {
        let dir = tempdir().unwrap();
        let mut session = session(dir.path(), MockProvider::new(ProviderKind::Denoise));
        let original = session
            .add_original_buffer("talk.wav", AudioBuffer::sine(200.0, 0.4, 0.5, 1, 16000))
            .unwrap();

        let job = session.submit(&original).unwrap();
        assert_eq!(session.wait(job, WAIT).unwrap(), JobState::Succeeded);

        assert_eq!(session.history().len(), 2);
        let derived = session.history().latest().unwrap();
        assert_eq!(derived.name(), "denoise_talk.wav");
        assert_eq!(session.version_for_job(job).unwrap().name(), "denoise_talk.wav");
        assert_eq!(derived.parent(), Some("talk.wav"));
        assert!(session.history().get("talk.wav").unwrap().is_rescued());
    }

    #[test]
    fn test_failed_job_leaves_history_alone() {
        let dir = tempdir().unwrap();
        let provider = MockProvider::new(ProviderKind::Denoise).failing("503");
        let mut session = session(dir.path(), provider);
        let original = session
            .add_original_buffer("talk.wav", AudioBuffer::sine(200.0, 0.4, 0.5, 1, 16000))
            .unwrap();

        let job = session.submit(&original).unwrap();
        assert_eq!(session.wait(job, WAIT).unwrap(), JobState::Failed);
        assert_eq!(session.history().len(), 1);
        assert!(!session.history().get("talk.wav").unwrap().is_rescued());
        assert!(!session.is_busy(&original));
    }

    #[test]
    fn test_settings_edits_do_not_reach_submitted_job() {
        let dir = tempdir().unwrap();
        let (provider, gate) = MockProvider::gated(ProviderKind::Denoise);
        let mut session = session(dir.path(), provider);
        let original = session
            .add_original_buffer("talk.wav", AudioBuffer::sine(200.0, 0.4, 0.5, 1, 16000))
            .unwrap();

        session.settings_mut().set("nfe", json!(32)).unwrap();
        let job = session.submit(&original).unwrap();
        session.settings_mut().set("nfe", json!(100)).unwrap();

        let submitted = session.runner().job(job).unwrap().params().get("nfe");
        assert_eq!(submitted, Some(json!(32)));
        assert!(matches!(session.submit(&original), Err(RescueError::Busy { .. })));

        drop(gate);
        session.wait(job, WAIT).unwrap();
    }

    #[test]
    fn test_balance_records_fallback() {
        let dir = tempdir().unwrap();
        let mut session = session(dir.path(), MockProvider::new(ProviderKind::Denoise));
        let original = session
            .add_original_buffer("quiet.wav", AudioBuffer::sine(300.0, 0.1, 0.25, 2, 22050))
            .unwrap();

        let (name, path) = session.balance(&original).unwrap();
        assert!(matches!(path, NormalizationPath::Fallback { .. }));
        let balanced = session.history().get(&name).unwrap();
        assert_eq!(balanced.buffer().num_channels(), 2);
        let input = session.history().get(&original).unwrap().buffer();
        assert_eq!(balanced.buffer().num_samples(), input.num_samples());
    }

    #[test]
    fn test_unknown_version() {
        let dir = tempdir().unwrap();
        let mut session = session(dir.path(), MockProvider::new(ProviderKind::Denoise));
        assert!(matches!(session.submit("nope"), Err(RescueError::UnknownVersion { .. })));
    }
}
