//! Loudness normalization through an external filter tool
//!
//! - `temp`: scoped ephemeral files for crossing the process boundary
//! - `filter`: one-shot ffmpeg `loudnorm` invocations that never error
//! - `pipeline`: encode → filter → decode, with a peak-normalize fallback

pub mod filter;
pub mod pipeline;
pub mod temp;

pub use filter::{ExternalFilterInvoker, FilterInvocation, FilterOutcome, FilterSpec};
pub use pipeline::{LoudnessNormalizationPipeline, NormalizationPath, NormalizationReport};
pub use temp::{sweep_orphans, TempResource, TempResourceScope, TEMP_PREFIX};
