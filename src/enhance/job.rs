//! Enhancement jobs and their lifecycle
//!
//! A job is created `Queued`, moves to `Running` when the runner accepts it,
//! and ends `Succeeded` or `Failed`. Nothing else is allowed.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::audio::AudioBuffer;
use crate::enhance::params::{ProviderKind, ProviderParams};
use crate::error::{RescueError, Result};

const SOURCE_ID_LEN: usize = 16;

/// Unique job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Short form used in thread names and logs
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a source buffer, the key of the busy check
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(String);

impl SourceId {
    /// Content hash of uploaded bytes; identical uploads share an id
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let digest = format!("{:x}", Sha256::digest(bytes));
        Self(digest[..SOURCE_ID_LEN].to_string())
    }

    pub fn random() -> Self {
        Self(Uuid::new_v4().simple().to_string()[..SOURCE_ID_LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request to run a provider over a source buffer
#[derive(Debug, Clone)]
pub struct EnhancementJob {
    id: JobId,
    source: SourceId,
    input: AudioBuffer,
    params: ProviderParams,
    state: JobState,
    result: Option<AudioBuffer>,
    error: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl EnhancementJob {
    pub fn new(source: SourceId, input: AudioBuffer, params: ProviderParams) -> Self {
        Self {
            id: JobId::new(),
            source,
            input,
            params,
            state: JobState::Queued,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn source(&self) -> &SourceId {
        &self.source
    }

    pub fn input(&self) -> &AudioBuffer {
        &self.input
    }

    pub fn provider(&self) -> ProviderKind {
        self.params.kind()
    }

    pub fn params(&self) -> &ProviderParams {
        &self.params
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn result(&self) -> Option<&AudioBuffer> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn is_running(&self) -> bool {
        self.state == JobState::Running
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Edit one parameter; only allowed while queued
    pub fn set_param(&mut self, name: &str, value: Value) -> Result<()> {
        if self.state != JobState::Queued {
            return Err(RescueError::ParametersFrozen);
        }
        self.params.set(name, value)
    }

    /// Replace the whole parameter set; only allowed while queued
    pub fn replace_params(&mut self, params: ProviderParams) -> Result<()> {
        if self.state != JobState::Queued {
            return Err(RescueError::ParametersFrozen);
        }
        self.params = params;
        Ok(())
    }

    fn transition(&mut self, to: JobState) -> Result<()> {
        let allowed = matches!(
            (self.state, to),
            (JobState::Queued, JobState::Running)
                | (JobState::Running, JobState::Succeeded)
                | (JobState::Running, JobState::Failed)
        );
        if !allowed {
            return Err(RescueError::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        self.state = to;
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        self.transition(JobState::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn succeed(&mut self, result: AudioBuffer) -> Result<()> {
        self.transition(JobState::Succeeded)?;
        self.result = Some(result);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(JobState::Failed)?;
        let reason = reason.into();
        self.error = Some(if reason.is_empty() {
            "unknown provider failure".to_string()
        } else {
            reason
        });
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn take_result(&mut self) -> Option<AudioBuffer> {
        self.result.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job() -> EnhancementJob {
        EnhancementJob::new(
            SourceId::random(),
            AudioBuffer::sine(440.0, 0.5, 0.1, 1, 8000),
            ProviderParams::defaults(ProviderKind::Denoise),
        )
    }

    #[test]
    fn test_source_id_is_content_hash() {
        let a = SourceId::from_bytes(b"episode-42");
        let b = SourceId::from_bytes(b"episode-42");
        let c = SourceId::from_bytes(b"episode-43");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 16);
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut job = job();
        assert_eq!(job.state(), JobState::Queued);
        job.start().unwrap();
        assert!(job.is_running());
        assert!(job.started_at().is_some());
        let out = job.input().clone();
        job.succeed(out).unwrap();
        assert_eq!(job.state(), JobState::Succeeded);
        assert!(job.result().is_some());
        assert!(job.finished_at().is_some());
    }

    #[test]
    fn test_rejected_transitions() {
        let mut job = job();
        assert!(matches!(
            job.succeed(AudioBuffer::new(1, 1, 8000)),
            Err(RescueError::InvalidTransition { .. })
        ));
        job.start().unwrap();
        assert!(job.start().is_err());
        job.fail("timeout").unwrap();
        assert!(job.fail("again").is_err());
        assert!(job.start().is_err());
        assert_eq!(job.error(), Some("timeout"));
    }

    #[test]
    fn test_params_frozen_after_queued() {
        let mut job = job();
        job.set_param("nfe", json!(32)).unwrap();
        job.start().unwrap();
        assert!(matches!(
            job.set_param("nfe", json!(8)),
            Err(RescueError::ParametersFrozen)
        ));
        assert_eq!(job.params().get("nfe"), Some(json!(32)));
    }

    #[test]
    fn test_empty_failure_reason_is_replaced() {
        let mut job = job();
        job.start().unwrap();
        job.fail("").unwrap();
        assert!(!job.error().unwrap_or_default().is_empty());
    }
}
