//! Peak normalization and the "sound rescue" compression preset
//!
//! Peak normalization is the degraded fallback for the loudness pipeline: it
//! scales the whole buffer so its largest sample sits just under full scale.
//! It knows nothing about perceived loudness, loudness range or inter-sample
//! peaks, so callers should treat its output as a best effort.

use serde::{Deserialize, Serialize};

use crate::audio::AudioBuffer;
use crate::error::{RescueError, Result};

/// Headroom used when nothing else is specified, in dB below full scale
pub const DEFAULT_HEADROOM_DB: f32 = 0.1;

fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

fn linear_to_db(linear: f32) -> f32 {
    if linear > 0.0 {
        20.0 * linear.log10()
    } else {
        -96.0
    }
}

/// Scale a buffer so its peak magnitude lands `headroom_db` below full scale.
///
/// Silent buffers are returned unchanged.
pub fn peak_normalize(buffer: &AudioBuffer, headroom_db: f32) -> AudioBuffer {
    let mut out = buffer.clone();
    let peak = buffer.peak();
    if peak <= 0.0 || !peak.is_finite() {
        return out;
    }
    let target = db_to_linear(-headroom_db.abs());
    out.apply_gain(target / peak);
    out
}

/// Compressor settings (threshold in dBFS, times in milliseconds)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressorParams {
    /// Threshold level in dB (-60 to 0 dB)
    pub threshold_db: f32,
    /// Compression ratio (1.0 to 20.0, representing 1:1 to 20:1)
    pub ratio: f32,
    /// Attack time in milliseconds (0.1 to 100 ms)
    pub attack_ms: f32,
    /// Release time in milliseconds (10 to 1000 ms)
    pub release_ms: f32,
}

impl Default for CompressorParams {
    /// The original "Sound Rescue" button: -20 dBFS, 3:1, 5 ms / 50 ms
    fn default() -> Self {
        Self {
            threshold_db: -20.0,
            ratio: 3.0,
            attack_ms: 5.0,
            release_ms: 50.0,
        }
    }
}

impl CompressorParams {
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("threshold_db", self.threshold_db, -60.0, 0.0),
            ("ratio", self.ratio, 1.0, 20.0),
            ("attack_ms", self.attack_ms, 0.1, 100.0),
            ("release_ms", self.release_ms, 10.0, 1000.0),
        ];
        for (param, value, min, max) in checks {
            if !(min..=max).contains(&value) {
                return Err(RescueError::InvalidParameter {
                    param: param.to_string(),
                    value: value.to_string(),
                    expected: format!("{} to {}", min, max),
                });
            }
        }
        Ok(())
    }

    /// Gain change in dB for a given detector level (hard knee)
    fn gain_reduction_db(&self, input_db: f32) -> f32 {
        if input_db <= self.threshold_db {
            0.0
        } else {
            (self.threshold_db + (input_db - self.threshold_db) / self.ratio) - input_db
        }
    }
}

/// Feed-forward compressor with linked stereo detection and one-pole
/// attack/release smoothing. No makeup gain.
pub fn compress(buffer: &AudioBuffer, params: &CompressorParams) -> AudioBuffer {
    let mut out = buffer.clone();
    let sample_rate = buffer.sample_rate() as f32;
    let coeff = |ms: f32| {
        let samples = ms / 1000.0 * sample_rate;
        if samples > 0.0 {
            (-1.0 / samples).exp()
        } else {
            0.0
        }
    };
    let attack_coeff = coeff(params.attack_ms);
    let release_coeff = coeff(params.release_ms);

    let channels = buffer.num_channels();
    let mut gain = 1.0f32;
    for frame in 0..buffer.num_samples() {
        let level = (0..channels)
            .filter_map(|ch| buffer.get(frame, ch))
            .fold(0.0f32, |acc, s| acc.max(s.abs()));

        let target = db_to_linear(params.gain_reduction_db(linear_to_db(level)));
        gain = if target < gain {
            attack_coeff * gain + (1.0 - attack_coeff) * target
        } else {
            release_coeff * gain + (1.0 - release_coeff) * target
        };

        for ch in 0..channels {
            if let Some(sample) = buffer.get(frame, ch) {
                out.set(frame, ch, sample * gain);
            }
        }
    }
    out
}

/// Peak-normalize with a little headroom, then compress
pub fn sound_rescue(buffer: &AudioBuffer, params: &CompressorParams) -> AudioBuffer {
    compress(&peak_normalize(buffer, DEFAULT_HEADROOM_DB), params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_peak_normalize_hits_target() {
        let quiet = AudioBuffer::sine(440.0, 0.1, 0.5, 2, 44100);
        let out = peak_normalize(&quiet, DEFAULT_HEADROOM_DB);
        assert_relative_eq!(out.peak(), db_to_linear(-0.1), epsilon = 1e-4);
        assert!(out.peak() < 1.0);
        assert_eq!(out.num_samples(), quiet.num_samples());
    }

    #[test]
    fn test_peak_normalize_tames_hot_input() {
        let mut hot = AudioBuffer::sine(440.0, 1.0, 0.1, 1, 44100);
        hot.apply_gain(1.8);
        assert!(peak_normalize(&hot, 1.0).peak() < 1.0);
    }

    #[test]
    fn test_peak_normalize_leaves_silence_alone() {
        let silent = AudioBuffer::new(2, 1000, 44100);
        assert_eq!(peak_normalize(&silent, DEFAULT_HEADROOM_DB), silent);
    }

    #[test]
    fn test_compress_reduces_loud_signal() {
        let loud = AudioBuffer::sine(220.0, 0.9, 0.5, 1, 44100);
        let out = compress(&loud, &CompressorParams::default());
        assert!(out.rms_db(0) < loud.rms_db(0) - 3.0);
    }

    #[test]
    fn test_compress_passes_signal_below_threshold() {
        let quiet = AudioBuffer::sine(220.0, 0.01, 0.2, 1, 44100);
        let out = compress(&quiet, &CompressorParams::default());
        assert!((out.rms_db(0) - quiet.rms_db(0)).abs() < 0.01);
    }

    #[test]
    fn test_compressor_params_validation() {
        assert!(CompressorParams::default().validate().is_ok());
        let bad = CompressorParams {
            ratio: 0.5,
            ..CompressorParams::default()
        };
        assert!(bad.validate().is_err());
    }
}
