//! In-memory decoded audio

use crate::error::{RescueError, Result};

/// Interleaved audio buffer
///
/// Samples are stored in interleaved format: [L0, R0, L1, R1, ...]
/// This matches WAV layout and keeps encode/decode a straight copy.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioBuffer {
    /// Interleaved sample data
    samples: Vec<f32>,
    /// Number of channels (1 = mono, 2 = stereo)
    num_channels: usize,
    /// Sample rate in Hz
    sample_rate: u32,
}

impl AudioBuffer {
    /// Create a silent buffer with the given shape (at least one channel)
    pub fn new(num_channels: usize, num_samples: usize, sample_rate: u32) -> Self {
        let num_channels = num_channels.max(1);
        Self {
            samples: vec![0.0; num_channels * num_samples],
            num_channels,
            sample_rate,
        }
    }

    /// Create a buffer from existing interleaved samples
    pub fn from_interleaved(
        samples: Vec<f32>,
        num_channels: usize,
        sample_rate: u32,
    ) -> Result<Self> {
        if num_channels == 0 {
            return Err(RescueError::codec("channel count must be at least 1"));
        }
        if sample_rate == 0 {
            return Err(RescueError::codec("sample rate must be positive"));
        }
        if samples.len() % num_channels != 0 {
            return Err(RescueError::codec(format!(
                "Sample count {} is not divisible by channel count {}",
                samples.len(),
                num_channels
            )));
        }
        Ok(Self {
            samples,
            num_channels,
            sample_rate,
        })
    }

    /// Number of channels
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Number of samples per channel (frames)
    pub fn num_samples(&self) -> usize {
        self.samples.len() / self.num_channels
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.num_samples() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Get a reference to all interleaved samples
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Get a mutable reference to all interleaved samples
    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    /// Get a sample at the given frame and channel
    pub fn get(&self, frame: usize, channel: usize) -> Option<f32> {
        if frame < self.num_samples() && channel < self.num_channels {
            Some(self.samples[frame * self.num_channels + channel])
        } else {
            None
        }
    }

    /// Set a sample at the given frame and channel
    pub fn set(&mut self, frame: usize, channel: usize, value: f32) {
        if frame < self.num_samples() && channel < self.num_channels {
            self.samples[frame * self.num_channels + channel] = value;
        }
    }

    /// Multiply every sample by a linear gain
    pub fn apply_gain(&mut self, gain: f32) {
        for sample in &mut self.samples {
            *sample *= gain;
        }
    }

    /// Check buffer contains finite audio
    pub fn is_valid(&self) -> bool {
        self.samples.iter().all(|s| s.is_finite())
    }

    /// Largest absolute sample value across all channels
    pub fn peak(&self) -> f32 {
        self.samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
    }

    /// Peak level in dBFS across all channels
    pub fn peak_db(&self) -> f64 {
        let peak = self.peak();
        if peak > 0.0 {
            20.0 * (peak as f64).log10()
        } else {
            f64::NEG_INFINITY
        }
    }

    /// Calculate RMS level in dB for a channel
    pub fn rms_db(&self, channel: usize) -> f64 {
        if channel >= self.num_channels || self.is_empty() {
            return f64::NEG_INFINITY;
        }

        let sum_sq: f64 = self
            .samples
            .iter()
            .skip(channel)
            .step_by(self.num_channels)
            .map(|&s| (s as f64).powi(2))
            .sum();

        let rms = (sum_sq / self.num_samples() as f64).sqrt();

        if rms > 0.0 {
            20.0 * rms.log10()
        } else {
            f64::NEG_INFINITY
        }
    }

    /// Generate a sine tone on every channel, mostly for tests and dry runs
    pub fn sine(
        frequency: f32,
        amplitude: f32,
        duration_secs: f64,
        num_channels: usize,
        sample_rate: u32,
    ) -> Self {
        let frames = (duration_secs * sample_rate as f64).round() as usize;
        let mut buffer = Self::new(num_channels.max(1), frames, sample_rate);
        let step = 2.0 * std::f32::consts::PI * frequency / sample_rate as f32;
        for frame in 0..frames {
            let value = amplitude * (step * frame as f32).sin();
            for ch in 0..buffer.num_channels {
                buffer.set(frame, ch, value);
            }
        }
        buffer
    }
}
