//! Mock provider for testing
//!
//! Does no enhancement. It echoes the input back (optionally with a gain, a
//! length change or a forced failure) so job and session behavior can be
//! checked without a network service.

use std::sync::{mpsc, Mutex};
use std::time::Duration;

use crate::audio::AudioBuffer;
use crate::enhance::params::{ProviderKind, ProviderParams};
use crate::enhance::provider::{params_mismatch, EnhancementProvider, RawResult};
use crate::error::{RescueError, Result};
use crate::loudness::TempResourceScope;

/// Sender half returned by [`MockProvider::gated`]; one message lets one
/// submission through, dropping it releases all of them
pub type Gate = mpsc::Sender<()>;

pub struct MockProvider {
    kind: ProviderKind,
    gain: f32,
    delay: Option<Duration>,
    failure: Option<String>,
    trim_frames: usize,
    tolerance: f64,
    gate: Option<Mutex<mpsc::Receiver<()>>>,
}

impl MockProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            gain: 1.0,
            delay: None,
            failure: None,
            trim_frames: 0,
            tolerance: 0.5,
            gate: None,
        }
    }

    /// A provider whose submissions block until the returned gate opens
    pub fn gated(kind: ProviderKind) -> (Self, Gate) {
        let (tx, rx) = mpsc::channel();
        let mut provider = Self::new(kind);
        provider.gate = Some(Mutex::new(rx));
        (provider, tx)
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.failure = Some(reason.into());
        self
    }

    /// Drop frames from the end of every result
    pub fn trimming(mut self, frames: usize) -> Self {
        self.trim_frames = frames;
        self
    }

    pub fn with_tolerance(mut self, seconds: f64) -> Self {
        self.tolerance = seconds;
        self
    }

    fn wait_for_gate(&self) {
        if let Some(gate) = &self.gate {
            if let Ok(rx) = gate.lock() {
                // A closed channel opens the gate for good
                let _ = rx.recv();
            }
        }
    }
}

impl EnhancementProvider for MockProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn duration_tolerance(&self) -> f64 {
        self.tolerance
    }

    fn submit(
        &self,
        input: &AudioBuffer,
        params: &ProviderParams,
        _scope: &mut TempResourceScope,
    ) -> Result<RawResult> {
        if params.kind() != self.kind {
            return Err(params_mismatch(self.kind, params));
        }
        self.wait_for_gate();
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if let Some(reason) = &self.failure {
            return Err(RescueError::Provider {
                provider: self.kind.to_string(),
                reason: reason.clone(),
            });
        }

        let mut output = input.clone();
        output.apply_gain(self.gain);
        if self.trim_frames > 0 {
            let keep =
                output.num_samples().saturating_sub(self.trim_frames) * output.num_channels();
            let mut samples = output.samples().to_vec();
            samples.truncate(keep);
            output = AudioBuffer::from_interleaved(
                samples,
                output.num_channels(),
                output.sample_rate(),
            )?;
        }
        Ok(RawResult::Local(output))
    }

    fn fetch(&self, raw: RawResult) -> Result<AudioBuffer> {
        match raw {
            RawResult::Local(buffer) => Ok(buffer),
            _ => Err(RescueError::Provider {
                provider: self.kind.to_string(),
                reason: "mock provider only produces local results".to_string(),
            }),
        }
    }
}
