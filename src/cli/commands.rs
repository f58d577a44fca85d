//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::config::RescueConfig;
use crate::enhance::{schema, JobState, ParamType, ProviderKind};
use crate::error::{RescueError, Result};
use crate::loudness::{sweep_orphans, NormalizationPath};
use crate::session::Session;

/// `processed_<name>` next to the input
pub fn default_output(input: &Path) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio.wav".to_string());
    input.with_file_name(format!("processed_{}", name))
}

/// Loudness-normalize a file.
pub fn balance(
    mut config: RescueConfig,
    input: &Path,
    output: Option<&Path>,
    lufs: Option<f32>,
    lra: Option<f32>,
    true_peak: Option<f32>,
) -> Result<()> {
    if let Some(v) = lufs {
        config.loudness.integrated_lufs = v;
    }
    if let Some(v) = lra {
        config.loudness.loudness_range = v;
    }
    if let Some(v) = true_peak {
        config.loudness.true_peak_db = v;
    }
    info!("Balancing {} with {}", input.display(), config.loudness.expression());

    let mut session = Session::new(config)?;
    let original = session.load_file(input)?;
    let (balanced, path) = session.balance(&original)?;

    let output = output.map(Path::to_path_buf).unwrap_or_else(|| default_output(input));
    session.export(&balanced, &output)?;

    match path {
        NormalizationPath::External => println!("Loudness normalized: {}", output.display()),
        NormalizationPath::Fallback { reason } => {
            println!("Loudness filter unavailable ({}).", reason);
            println!("Applied peak normalization instead: {}", output.display());
        }
    }
    Ok(())
}

/// Peak normalize and compress a file.
pub fn rescue(config: RescueConfig, input: &Path, output: Option<&Path>) -> Result<()> {
    enhance(config, input, "sound_rescue", &[], output, Duration::from_secs(60))
}

/// Run one provider as a background job and wait for it.
pub fn enhance(
    config: RescueConfig,
    input: &Path,
    provider: &str,
    params: &[String],
    output: Option<&Path>,
    timeout: Duration,
) -> Result<()> {
    let kind: ProviderKind = provider.parse()?;
    let mut session = Session::new(config)?;
    let original = session.load_file(input)?;

    session.settings_mut().select(kind);
    for assignment in params {
        let (name, value) = assignment.split_once('=').ok_or_else(|| RescueError::InvalidParameter {
            param: assignment.clone(),
            value: String::new(),
            expected: "KEY=VALUE".to_string(),
        })?;
        session.settings_mut().set_str(name.trim(), value.trim())?;
    }

    println!("{}: {}", kind.display_name(), input.display());
    println!("Processing in progress, please wait...");

    let job = session.submit(&original)?;
    let state = session.wait(job, timeout)?;

    if state == JobState::Failed {
        let reason = session.job_error(job).unwrap_or_default();
        println!("Processing failed: {}", reason);
        return Err(RescueError::Provider {
            provider: kind.to_string(),
            reason,
        });
    }

    let version = session
        .version_for_job(job)
        .map(|v| v.name().to_string())
        .ok_or_else(|| RescueError::UnknownJob {
            job_id: job.to_string(),
        })?;
    let output = output.map(Path::to_path_buf).unwrap_or_else(|| default_output(input));
    session.export(&version, &output)?;

    println!("Processing complete!");
    println!("  Output: {}", output.display());
    Ok(())
}

/// List providers and their parameter schemas.
pub fn providers(json: bool) -> Result<()> {
    if json {
        let schemas: BTreeMap<&str, _> = ProviderKind::ALL
            .iter()
            .map(|kind| (kind.as_str(), schema(*kind)))
            .collect();
        println!("{}", serde_json::to_string_pretty(&schemas)?);
        return Ok(());
    }

    for kind in ProviderKind::ALL {
        let location = if kind.is_remote() { "remote" } else { "local" };
        println!("{} ({}, {})", kind, kind.display_name(), location);
        for spec in schema(kind) {
            let range = match &spec.param_type {
                ParamType::Float { min, max } => format!("{} to {}", min, max),
                ParamType::Int { min, max } => format!("{} to {}", min, max),
                ParamType::Bool => "true/false".to_string(),
                ParamType::Enum { options } => options.join(" | "),
            };
            println!("  {:<14} {:<44} default {}", spec.name, range, spec.default);
            println!("  {:<14} {}", "", spec.description);
        }
        println!();
    }
    Ok(())
}

/// Remove leftover temp files.
pub fn sweep(config: RescueConfig, older_than: Duration) -> Result<()> {
    let removed = sweep_orphans(&config.temp_dir, older_than);
    if removed > 0 {
        warn!("Removed {} orphaned temp files", removed);
    }
    println!("Removed {} files from {}", removed, config.temp_dir.display());
    Ok(())
}
