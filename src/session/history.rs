//! Project history
//!
//! An append-only list of named audio versions: the uploaded originals and
//! every result derived from them. Names are unique within a session and a
//! version's `rescued` flag only ever goes from false to true.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audio::AudioBuffer;
use crate::enhance::{ProviderKind, SourceId};
use crate::error::{RescueError, Result};

/// One named version of the audio
#[derive(Debug, Clone)]
pub struct AudioVersion {
    name: String,
    source: SourceId,
    buffer: AudioBuffer,
    parent: Option<String>,
    provider: Option<ProviderKind>,
    rescued: bool,
    created_at: DateTime<Utc>,
}

impl AudioVersion {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &SourceId {
        &self.source
    }

    pub fn buffer(&self) -> &AudioBuffer {
        &self.buffer
    }

    /// Name of the version this one was derived from
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Provider that produced this version; `None` for originals
    pub fn provider(&self) -> Option<ProviderKind> {
        self.provider
    }

    /// Whether a rescue has been derived from this version
    pub fn is_rescued(&self) -> bool {
        self.rescued
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn summary(&self) -> VersionSummary {
        VersionSummary {
            name: self.name.clone(),
            source: self.source.to_string(),
            parent: self.parent.clone(),
            provider: self.provider,
            duration_secs: self.buffer.duration(),
            sample_rate: self.buffer.sample_rate(),
            channels: self.buffer.num_channels(),
            rescued: self.rescued,
            created_at: self.created_at,
        }
    }
}

/// Serializable listing entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionSummary {
    pub name: String,
    pub source: String,
    pub parent: Option<String>,
    pub provider: Option<ProviderKind>,
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub channels: usize,
    pub rescued: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectHistory {
    versions: Vec<AudioVersion>,
}

impl ProjectHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.versions.iter().any(|v| v.name == name)
    }

    fn ensure_free(&self, name: &str) -> Result<()> {
        if self.contains(name) {
            return Err(RescueError::DuplicateVersion {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Add an uploaded original
    pub fn append_original(
        &mut self,
        name: impl Into<String>,
        source: SourceId,
        buffer: AudioBuffer,
    ) -> Result<&AudioVersion> {
        let name = name.into();
        self.ensure_free(&name)?;
        self.versions.push(AudioVersion {
            name,
            source,
            buffer,
            parent: None,
            provider: None,
            rescued: false,
            created_at: Utc::now(),
        });
        Ok(&self.versions[self.versions.len() - 1])
    }

    /// Add a provider result and mark its parent rescued
    ///
    /// A derived version gets a fresh source id so it can be processed again
    /// while its parent is still busy.
    pub fn append_derived(
        &mut self,
        name: impl Into<String>,
        parent: &str,
        provider: ProviderKind,
        buffer: AudioBuffer,
    ) -> Result<&AudioVersion> {
        let name = name.into();
        self.ensure_free(&name)?;
        self.mark_rescued(parent)?;
        self.versions.push(AudioVersion {
            name,
            source: SourceId::random(),
            buffer,
            parent: Some(parent.to_string()),
            provider: Some(provider),
            rescued: false,
            created_at: Utc::now(),
        });
        Ok(&self.versions[self.versions.len() - 1])
    }

    /// Set the rescued flag; it never goes back
    pub fn mark_rescued(&mut self, name: &str) -> Result<()> {
        let version = self
            .versions
            .iter_mut()
            .find(|v| v.name == name)
            .ok_or_else(|| RescueError::UnknownVersion {
                name: name.to_string(),
            })?;
        version.rescued = true;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&AudioVersion> {
        self.versions
            .iter()
            .find(|v| v.name == name)
            .ok_or_else(|| RescueError::UnknownVersion {
                name: name.to_string(),
            })
    }

    /// Most recent version carrying this source id
    pub fn find_by_source(&self, source: &SourceId) -> Option<&AudioVersion> {
        self.versions.iter().rev().find(|v| &v.source == source)
    }

    pub fn latest(&self) -> Option<&AudioVersion> {
        self.versions.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AudioVersion> {
        self.versions.iter()
    }

    /// `base` if free, otherwise `base (2)`, `base (3)`, ...
    pub fn unique_name(&self, base: &str) -> String {
        if !self.contains(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{} ({})", base, n))
            .find(|candidate| !self.contains(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    pub fn summaries(&self) -> Vec<VersionSummary> {
        self.versions.iter().map(AudioVersion::summary).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn buffer() -> AudioBuffer {
        AudioBuffer::sine(440.0, 0.5, 0.1, 1, 8000)
    }

    #[test]
    fn test_insertion_order_is_kept() {
        let mut history = ProjectHistory::new();
        history.append_original("a.wav", SourceId::random(), buffer()).unwrap();
        history.append_original("b.wav", SourceId::random(), buffer()).unwrap();
        history
            .append_derived("denoise_a.wav", "a.wav", ProviderKind::Denoise, buffer())
            .unwrap();

        let names: Vec<&str> = history.iter().map(|v| v.name()).collect();
        assert_eq!(names, vec!["a.wav", "b.wav", "denoise_a.wav"]);
        assert_eq!(history.latest().unwrap().name(), "denoise_a.wav");
    }

    #[test]
    fn test_names_are_unique() {
        let mut history = ProjectHistory::new();
        history.append_original("a.wav", SourceId::random(), buffer()).unwrap();
        assert!(matches!(
            history.append_original("a.wav", SourceId::random(), buffer()),
            Err(RescueError::DuplicateVersion { .. })
        ));
        assert_eq!(history.unique_name("a.wav"), "a.wav (2)");
        assert_eq!(history.unique_name("b.wav"), "b.wav");
    }

    #[test]
    fn test_rescued_flag_is_monotonic() {
        let mut history = ProjectHistory::new();
        history.append_original("a.wav", SourceId::random(), buffer()).unwrap();
        assert!(!history.get("a.wav").unwrap().is_rescued());

        history
            .append_derived("rescue_a.wav", "a.wav", ProviderKind::SoundRescue, buffer())
            .unwrap();
        assert!(history.get("a.wav").unwrap().is_rescued());

        history.mark_rescued("a.wav").unwrap();
        assert!(history.get("a.wav").unwrap().is_rescued());
        assert!(!history.get("rescue_a.wav").unwrap().is_rescued());
    }

    #[test]
    fn test_derived_needs_known_parent() {
        let mut history = ProjectHistory::new();
        assert!(matches!(
            history.append_derived("x", "missing", ProviderKind::Denoise, buffer()),
            Err(RescueError::UnknownVersion { .. })
        ));
        assert!(history.is_empty());
    }

    #[test]
    fn test_summary_serializes() {
        let mut history = ProjectHistory::new();
        let source = SourceId::from_bytes(b"abc");
        history.append_original("a.wav", source.clone(), buffer()).unwrap();
        let json = serde_json::to_value(history.summaries()).unwrap();
        assert_eq!(json[0]["name"], "a.wav");
        assert_eq!(json[0]["source"], source.as_str());
        assert_eq!(json[0]["rescued"], false);
        assert_eq!(json[0]["channels"], 1);
    }
}
