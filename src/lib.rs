//! Podrescue - podcast audio rescue
//!
//! Two processing paths over in-memory audio:
//! 1. Loudness balance - a blocking EBU R128 normalization through an external
//!    `ffmpeg loudnorm` invocation, with an in-memory peak-normalize fallback
//!    so it never fails.
//! 2. Enhancement jobs - a provider (remote denoiser, remote speech enhancer,
//!    or a local one) runs on a background worker; the owner of the session
//!    observes terminal states through a channel.
//!
//! # Architecture
//!
//! - `audio`: buffers, WAV/ffmpeg codec, peak normalize and compressor
//! - `loudness`: temp resource scopes, filter invocation, the pipeline
//! - `enhance`: provider trait, parameter schemas, jobs and the runner
//! - `session`: per-session context and the project history

pub mod audio;
pub mod cli;
pub mod config;
pub mod enhance;
pub mod error;
pub mod loudness;
pub mod session;

pub use audio::{AudioBuffer, AudioFormat, Codec};
pub use config::{ProviderEndpoint, RescueConfig};
pub use enhance::{
    EnhancementJob, EnhancementProvider, JobEvent, JobId, JobRunner, JobState, ProviderKind,
    ProviderParams,
    ProviderRegistry, ProviderSettings, SourceId,
};
pub use error::{RescueError, Result};
pub use loudness::{
    ExternalFilterInvoker, FilterSpec, LoudnessNormalizationPipeline, TempResourceScope,
};
pub use session::{ProjectHistory, Session};
