//! CLI Module
//!
//! Command-line interface for podrescue.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::RescueConfig;

/// Podrescue - loudness balance and AI rescue for podcast audio
#[derive(Parser, Debug)]
#[command(name = "podrescue")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// ffmpeg binary used for loudnorm and transcoding
    #[arg(long, global = true, env = "PODRESCUE_FFMPEG")]
    pub ffmpeg: Option<PathBuf>,

    /// Directory for ephemeral hand-off files
    #[arg(long, global = true, env = "PODRESCUE_TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Environment configuration with command-line overrides applied
    pub fn config(&self) -> RescueConfig {
        let mut config = RescueConfig::from_env();
        if let Some(ffmpeg) = &self.ffmpeg {
            config.ffmpeg_path = ffmpeg.clone();
        }
        if let Some(dir) = &self.temp_dir {
            config.temp_dir = dir.clone();
        }
        config
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Normalize loudness (EBU R128 via ffmpeg loudnorm)
    #[command(name = "balance")]
    Balance {
        /// Input audio file
        input: PathBuf,

        /// Output file (defaults to processed_<input>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Target integrated loudness in LUFS
        #[arg(long)]
        lufs: Option<f32>,

        /// Target loudness range in LU
        #[arg(long)]
        lra: Option<f32>,

        /// True-peak ceiling in dBTP
        #[arg(long)]
        true_peak: Option<f32>,
    },

    /// Peak normalize, then compress
    #[command(name = "rescue")]
    Rescue {
        /// Input audio file
        input: PathBuf,

        /// Output file (defaults to processed_<input>)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run an enhancement provider in the background and wait for it
    #[command(name = "enhance")]
    Enhance {
        /// Input audio file
        input: PathBuf,

        /// Provider: denoise, speech_enhance, loudness_balance, sound_rescue
        #[arg(short, long, default_value = "denoise")]
        provider: String,

        /// Parameter override, repeatable (e.g. --set nfe=32)
        #[arg(short, long = "set", value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// Output file (defaults to processed_<input>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Seconds to wait for the job before giving up
        #[arg(long, default_value_t = 600)]
        timeout: u64,
    },

    /// List providers and their parameters
    #[command(name = "providers")]
    Providers {
        /// Print the schemas as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove leftover temp files from interrupted runs
    #[command(name = "sweep")]
    Sweep {
        /// Minimum age in seconds of files to remove
        #[arg(long, default_value_t = 3600)]
        older_than: u64,
    },
}
