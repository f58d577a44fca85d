//! Audio codec layer
//!
//! WAV is handled in-process with `hound`, both in memory and on disk. It is
//! the uncompressed intermediate format used at every process boundary.
//! Compressed formats (MP3 for delivery, plus FLAC/OGG/M4A uploads) are
//! transcoded through the same ffmpeg binary the loudness filter uses.

use std::ffi::OsString;
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::audio::AudioBuffer;
use crate::config::RescueConfig;
use crate::error::{RescueError, Result};
use crate::loudness::filter::run_quiet;
use crate::loudness::TempResourceScope;

/// Container formats the codec layer understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Mp3,
    Flac,
    Ogg,
    M4a,
}

impl AudioFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "wav" | "wave" => Some(Self::Wav),
            "mp3" => Some(Self::Mp3),
            "flac" => Some(Self::Flac),
            "ogg" | "oga" => Some(Self::Ogg),
            "m4a" | "mp4" | "aac" => Some(Self::M4a),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Guess the format from the first bytes of a file
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
            Some(Self::Wav)
        } else if bytes.starts_with(b"fLaC") {
            Some(Self::Flac)
        } else if bytes.starts_with(b"OggS") {
            Some(Self::Ogg)
        } else if bytes.len() >= 8 && &bytes[4..8] == b"ftyp" {
            Some(Self::M4a)
        } else if bytes.starts_with(b"ID3")
            || (bytes.len() >= 2 && bytes[0] == 0xFF && (bytes[1] & 0xE0) == 0xE0)
        {
            Some(Self::Mp3)
        } else {
            None
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::Flac => "flac",
            Self::Ogg => "ogg",
            Self::M4a => "m4a",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Wav => "audio/wav",
            Self::Mp3 => "audio/mpeg",
            Self::Flac => "audio/flac",
            Self::Ogg => "audio/ogg",
            Self::M4a => "audio/mp4",
        }
    }

    pub fn is_compressed(&self) -> bool {
        !matches!(self, Self::Wav)
    }

    fn encoder_args(&self) -> &'static [&'static str] {
        match self {
            Self::Wav => &["-codec:a", "pcm_s16le"],
            Self::Mp3 => &["-codec:a", "libmp3lame", "-b:a", "192k"],
            Self::Flac => &["-codec:a", "flac"],
            Self::Ogg => &["-codec:a", "libvorbis", "-q:a", "5"],
            Self::M4a => &["-codec:a", "aac", "-b:a", "192k"],
        }
    }
}

/// Sample encoding for WAV output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WavEncoding {
    /// 16-bit integer PCM, what most players expect
    Pcm16,
    /// 32-bit float, lossless for our internal samples
    #[default]
    Float32,
}

impl WavEncoding {
    fn spec(&self, buffer: &AudioBuffer) -> WavSpec {
        let (bits_per_sample, sample_format) = match self {
            WavEncoding::Pcm16 => (16, SampleFormat::Int),
            WavEncoding::Float32 => (32, SampleFormat::Float),
        };
        WavSpec {
            channels: buffer.num_channels() as u16,
            sample_rate: buffer.sample_rate(),
            bits_per_sample,
            sample_format,
        }
    }
}

fn hound_error(context: &str, e: hound::Error) -> RescueError {
    RescueError::Codec {
        reason: format!("{}: {}", context, e),
        source: Some(Box::new(e)),
    }
}

fn write_samples<W: std::io::Write + std::io::Seek>(
    mut writer: WavWriter<W>,
    buffer: &AudioBuffer,
    encoding: WavEncoding,
) -> Result<()> {
    match encoding {
        WavEncoding::Pcm16 => {
            for &sample in buffer.samples() {
                let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                writer
                    .write_sample(scaled)
                    .map_err(|e| hound_error("Failed to write sample", e))?;
            }
        }
        WavEncoding::Float32 => {
            for &sample in buffer.samples() {
                writer
                    .write_sample(sample)
                    .map_err(|e| hound_error("Failed to write sample", e))?;
            }
        }
    }
    writer
        .finalize()
        .map_err(|e| hound_error("Failed to finalize WAV", e))
}

fn read_samples<R: Read>(reader: WavReader<R>) -> Result<AudioBuffer> {
    let spec = reader.spec();
    let channels = spec.channels as usize;

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| hound_error("Failed to read float samples", e))?,
        SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| hound_error("Failed to read integer samples", e))?
        }
    };

    AudioBuffer::from_interleaved(samples, channels, spec.sample_rate)
}

/// Encode a buffer as an in-memory WAV file
pub fn encode_wav(buffer: &AudioBuffer, encoding: WavEncoding) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let writer = WavWriter::new(Cursor::new(&mut bytes), encoding.spec(buffer))
        .map_err(|e| hound_error("Failed to start WAV", e))?;
    write_samples(writer, buffer, encoding)?;
    Ok(bytes)
}

/// Decode an in-memory WAV file
pub fn decode_wav(bytes: &[u8]) -> Result<AudioBuffer> {
    let reader =
        WavReader::new(Cursor::new(bytes)).map_err(|e| hound_error("Invalid WAV data", e))?;
    read_samples(reader)
}

/// Write a buffer to a WAV file on disk
pub fn write_wav(buffer: &AudioBuffer, path: &Path, encoding: WavEncoding) -> Result<()> {
    let writer = WavWriter::create(path, encoding.spec(buffer))
        .map_err(|e| hound_error(&format!("Failed to create {}", path.display()), e))?;
    write_samples(writer, buffer, encoding)
}

/// Read a WAV file from disk
pub fn read_wav(path: &Path) -> Result<AudioBuffer> {
    let reader = WavReader::open(path)
        .map_err(|e| hound_error(&format!("Failed to open {}", path.display()), e))?;
    read_samples(reader)
}

/// Codec front door: WAV in-process, everything else via ffmpeg
#[derive(Debug, Clone)]
pub struct Codec {
    ffmpeg_path: PathBuf,
    temp_dir: PathBuf,
}

impl Codec {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            temp_dir: temp_dir.into(),
        }
    }

    pub fn from_config(config: &RescueConfig) -> Self {
        Self::new(&config.ffmpeg_path, &config.temp_dir)
    }

    /// Decode uploaded bytes. The hint wins over sniffing when both exist.
    pub fn decode(&self, bytes: &[u8], hint: Option<AudioFormat>) -> Result<AudioBuffer> {
        if bytes.is_empty() {
            return Err(RescueError::EmptyAudio);
        }
        let format = hint
            .or_else(|| AudioFormat::sniff(bytes))
            .ok_or_else(|| RescueError::UnsupportedFormat {
                format: "unrecognized container".to_string(),
            })?;

        let buffer = match format {
            AudioFormat::Wav => decode_wav(bytes)?,
            other => {
                let wav = self.transcode(bytes, other, AudioFormat::Wav)?;
                decode_wav(&wav)?
            }
        };

        if buffer.is_empty() {
            return Err(RescueError::EmptyAudio);
        }
        Ok(buffer)
    }

    /// Encode a buffer for delivery
    pub fn encode(&self, buffer: &AudioBuffer, format: AudioFormat) -> Result<Vec<u8>> {
        match format {
            AudioFormat::Wav => encode_wav(buffer, WavEncoding::Pcm16),
            other => {
                let wav = encode_wav(buffer, WavEncoding::Float32)?;
                self.transcode(&wav, AudioFormat::Wav, other)
            }
        }
    }

    /// Read and decode a file, using its extension as the format hint
    pub fn read_file(&self, path: &Path) -> Result<AudioBuffer> {
        let bytes = fs::read(path)?;
        self.decode(&bytes, AudioFormat::from_path(path))
    }

    /// Encode and write a file, picking the format from its extension (WAV if unknown)
    pub fn write_file(&self, buffer: &AudioBuffer, path: &Path) -> Result<()> {
        let format = AudioFormat::from_path(path).unwrap_or(AudioFormat::Wav);
        let bytes = self.encode(buffer, format)?;
        fs::write(path, bytes)?;
        Ok(())
    }

    fn transcode(&self, bytes: &[u8], from: AudioFormat, to: AudioFormat) -> Result<Vec<u8>> {
        let mut scope = TempResourceScope::new(&self.temp_dir);
        let input = scope.acquire(&format!(".{}", from.extension()))?;
        let output = scope.acquire(&format!(".{}", to.extension()))?;
        fs::write(input.path(), bytes).map_err(|source| RescueError::TempResource {
            path: input.path().to_path_buf(),
            source,
        })?;

        let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), input.path().into()];
        args.extend(to.encoder_args().iter().map(OsString::from));
        args.push(output.path().into());

        debug!(from = from.extension(), to = to.extension(), "transcoding through ffmpeg");
        let status = run_quiet(&self.ffmpeg_path, &args).map_err(|e| RescueError::Codec {
            reason: format!("Could not run {}: {}", self.ffmpeg_path.display(), e),
            source: Some(Box::new(e)),
        })?;
        if !status.success() {
            return Err(RescueError::codec(format!(
                "ffmpeg could not convert {} to {} ({})",
                from.extension(),
                to.extension(),
                status
            )));
        }

        let out = fs::read(output.path())?;
        if out.is_empty() {
            return Err(RescueError::codec("ffmpeg produced an empty file"));
        }
        Ok(out)
    }
}
