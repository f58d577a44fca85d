//! Enhancement providers and asynchronous jobs
//!
//! Providers sit behind the [`EnhancementProvider`] trait and are chosen by
//! [`ProviderKind`]. Jobs run on worker threads owned by a [`JobRunner`].

pub mod denoise;
pub mod job;
pub mod local;
pub mod mock;
pub mod params;
pub mod provider;
pub mod remote;
pub mod runner;
pub mod speech;

pub use denoise::DenoiseProvider;
pub use job::{EnhancementJob, JobId, JobState, SourceId};
pub use local::{BalanceProvider, SoundRescueProvider};
pub use params::{
    schema, BalanceParams, DenoiseParams, ParamSpec, ParamType, ProviderKind, ProviderParams,
    ProviderSettings, Solver, SpeechModel, SpeechParams,
};
pub use provider::{EnhancementProvider, ProviderRegistry, RawResult};
pub use remote::RemoteClient;
pub use runner::{JobEvent, JobRunner};
pub use speech::SpeechEnhanceProvider;
