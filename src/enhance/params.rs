//! Provider parameter schemas
//!
//! Each provider owns a typed parameter struct. `ProviderParams` is the
//! tagged union the rest of the crate passes around; `ParamSpec` describes
//! every knob so a UI can render it and map slider positions onto it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::audio::CompressorParams;
use crate::error::{RescueError, Result};
use crate::loudness::FilterSpec;

/// Every enhancement the tool offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Remote diffusion denoiser/enhancer
    Denoise,
    /// Remote speech enhancement model
    SpeechEnhance,
    /// Local EBU R128 loudness balance
    LoudnessBalance,
    /// Local peak-normalize + compression preset
    SoundRescue,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Denoise,
        ProviderKind::SpeechEnhance,
        ProviderKind::LoudnessBalance,
        ProviderKind::SoundRescue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Denoise => "denoise",
            Self::SpeechEnhance => "speech_enhance",
            Self::LoudnessBalance => "loudness_balance",
            Self::SoundRescue => "sound_rescue",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Denoise => "AI Rescue (denoise + enhance)",
            Self::SpeechEnhance => "Speech Enhancer",
            Self::LoudnessBalance => "Dynamic Balance",
            Self::SoundRescue => "Sound Rescue",
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Denoise | Self::SpeechEnhance)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = RescueError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "denoise" | "enhance" | "ai_rescue" => Ok(Self::Denoise),
            "speech_enhance" | "speech" => Ok(Self::SpeechEnhance),
            "loudness_balance" | "balance" | "loudnorm" => Ok(Self::LoudnessBalance),
            "sound_rescue" | "rescue" => Ok(Self::SoundRescue),
            _ => Err(RescueError::UnknownProvider {
                provider: s.to_string(),
            }),
        }
    }
}

/// ODE solver used by the diffusion enhancer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Solver {
    #[default]
    Midpoint,
    Rk4,
    Euler,
}

/// Models the speech enhancer can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpeechModel {
    #[default]
    #[serde(rename = "MossFormer2_SE_48K")]
    MossFormer2Se48k,
    #[serde(rename = "FRCRN_SE_16K")]
    FrcrnSe16k,
    #[serde(rename = "MossFormerGAN_SE_16K")]
    MossFormerGanSe16k,
}

pub const SPEECH_MODELS: [&str; 3] = ["MossFormer2_SE_48K", "FRCRN_SE_16K", "MossFormerGAN_SE_16K"];
pub const SOLVERS: [&str; 3] = ["midpoint", "rk4", "euler"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DenoiseParams {
    /// Prior temperature, 0 to 1
    pub temperature: f32,
    /// Number of function evaluations, 1 to 128
    pub nfe: u32,
    pub solver: Solver,
    /// Run the denoiser before the enhancer
    pub denoise_first: bool,
}

impl Default for DenoiseParams {
    fn default() -> Self {
        Self {
            temperature: 0.5,
            nfe: 64,
            solver: Solver::Midpoint,
            denoise_first: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SpeechParams {
    pub model: SpeechModel,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalanceParams {
    pub target_lufs: f32,
    pub lra: f32,
    pub true_peak: f32,
}

impl Default for BalanceParams {
    fn default() -> Self {
        let spec = FilterSpec::default();
        Self {
            target_lufs: spec.integrated_lufs,
            lra: spec.loudness_range,
            true_peak: spec.true_peak_db,
        }
    }
}

impl BalanceParams {
    pub fn filter_spec(&self, sample_rate: u32) -> FilterSpec {
        FilterSpec {
            integrated_lufs: self.target_lufs,
            loudness_range: self.lra,
            true_peak_db: self.true_peak,
            sample_rate,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ParamType {
    Float { min: f32, max: f32 },
    Int { min: i64, max: i64 },
    Bool,
    Enum { options: Vec<String> },
}

/// Specification for one provider parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub param_type: ParamType,
    pub description: String,
    pub default: Value,
}

impl ParamSpec {
    fn float(name: &str, min: f32, max: f32, default: f32, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type: ParamType::Float { min, max },
            description: description.to_string(),
            default: Value::from(default),
        }
    }

    fn int(name: &str, min: i64, max: i64, default: i64, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type: ParamType::Int { min, max },
            description: description.to_string(),
            default: Value::from(default),
        }
    }

    fn boolean(name: &str, default: bool, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type: ParamType::Bool,
            description: description.to_string(),
            default: Value::from(default),
        }
    }

    fn choice(name: &str, options: &[&str], description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type: ParamType::Enum {
                options: options.iter().map(|s| s.to_string()).collect(),
            },
            description: description.to_string(),
            default: Value::from(options[0]),
        }
    }

    fn invalid(&self, value: impl fmt::Display) -> RescueError {
        let expected = match &self.param_type {
            ParamType::Float { min, max } => format!("number between {} and {}", min, max),
            ParamType::Int { min, max } => format!("integer between {} and {}", min, max),
            ParamType::Bool => "true or false".to_string(),
            ParamType::Enum { options } => format!("one of {}", options.join(", ")),
        };
        RescueError::InvalidParameter {
            param: self.name.clone(),
            value: value.to_string(),
            expected,
        }
    }

    /// Validate a value against this spec, returning it in canonical form
    pub fn check(&self, value: &Value) -> Result<Value> {
        match &self.param_type {
            // Bounds are f32; compare at that precision so 0.1 accepts 0.1
            ParamType::Float { min, max } => match value.as_f64() {
                Some(v) if (v as f32) >= *min && (v as f32) <= *max => Ok(Value::from(v)),
                _ => Err(self.invalid(value)),
            },
            ParamType::Int { min, max } => {
                let as_int = value
                    .as_i64()
                    .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64));
                match as_int {
                    Some(v) if v >= *min && v <= *max => Ok(Value::from(v)),
                    _ => Err(self.invalid(value)),
                }
            }
            ParamType::Bool => value.as_bool().map(Value::from).ok_or_else(|| self.invalid(value)),
            ParamType::Enum { options } => match value.as_str() {
                Some(s) if options.iter().any(|o| o == s) => Ok(Value::from(s)),
                _ => Err(self.invalid(value)),
            },
        }
    }

    /// Parse a raw string (from a form field or the command line)
    pub fn parse(&self, raw: &str) -> Result<Value> {
        let raw = raw.trim();
        let value = match &self.param_type {
            ParamType::Float { .. } => raw
                .parse::<f64>()
                .map(Value::from)
                .map_err(|_| self.invalid(raw))?,
            ParamType::Int { .. } => raw
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| self.invalid(raw))?,
            ParamType::Bool => match raw.to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Value::from(true),
                "false" | "no" | "off" | "0" => Value::from(false),
                _ => return Err(self.invalid(raw)),
            },
            ParamType::Enum { .. } => Value::from(raw),
        };
        self.check(&value)
    }

    /// Map a slider position in [0, 1] linearly onto this parameter's range
    pub fn from_slider(&self, position: f32) -> Result<Value> {
        if !(0.0..=1.0).contains(&position) {
            return Err(RescueError::InvalidParameter {
                param: self.name.clone(),
                value: position.to_string(),
                expected: "slider position between 0 and 1".to_string(),
            });
        }
        let value = match &self.param_type {
            ParamType::Float { min, max } => Value::from((min + (max - min) * position) as f64),
            ParamType::Int { min, max } => {
                Value::from(*min + ((max - min) as f64 * position as f64).round() as i64)
            }
            ParamType::Bool => Value::from(position >= 0.5),
            ParamType::Enum { options } => {
                let idx = ((options.len() - 1) as f32 * position).round() as usize;
                Value::from(options[idx].as_str())
            }
        };
        self.check(&value)
    }
}

/// Parameter schema for a provider
pub fn schema(kind: ProviderKind) -> Vec<ParamSpec> {
    match kind {
        ProviderKind::Denoise => vec![
            ParamSpec::float("temperature", 0.0, 1.0, 0.5, "Prior temperature; higher is bolder"),
            ParamSpec::int("nfe", 1, 128, 64, "Function evaluations; higher is slower and cleaner"),
            ParamSpec::choice("solver", &SOLVERS, "ODE solver"),
            ParamSpec::boolean("denoise_first", false, "Denoise before enhancing"),
        ],
        ProviderKind::SpeechEnhance => {
            vec![ParamSpec::choice("model", &SPEECH_MODELS, "Enhancement model")]
        }
        ProviderKind::LoudnessBalance => vec![
            ParamSpec::float(
                "target_lufs",
                -40.0,
                -5.0,
                -16.0,
                "Integrated loudness target (LUFS)",
            ),
            ParamSpec::float("lra", 1.0, 20.0, 11.0, "Loudness range target (LU)"),
            ParamSpec::float("true_peak", -9.0, 0.0, -1.5, "True-peak ceiling (dBTP)"),
        ],
        ProviderKind::SoundRescue => vec![
            ParamSpec::float("threshold_db", -60.0, 0.0, -20.0, "Compressor threshold (dBFS)"),
            ParamSpec::float("ratio", 1.0, 20.0, 3.0, "Compression ratio"),
            ParamSpec::float("attack_ms", 0.1, 100.0, 5.0, "Attack (ms)"),
            ParamSpec::float("release_ms", 10.0, 1000.0, 50.0, "Release (ms)"),
        ],
    }
}

fn find_spec(kind: ProviderKind, name: &str) -> Result<ParamSpec> {
    let specs = schema(kind);
    let known: Vec<String> = specs.iter().map(|s| s.name.clone()).collect();
    specs
        .into_iter()
        .find(|s| s.name == name)
        .ok_or_else(|| RescueError::InvalidParameter {
            param: name.to_string(),
            value: "<unknown>".to_string(),
            expected: format!("a {} parameter: {}", kind, known.join(", ")),
        })
}

/// Parameters for exactly one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", content = "params", rename_all = "snake_case")]
pub enum ProviderParams {
    Denoise(DenoiseParams),
    SpeechEnhance(SpeechParams),
    LoudnessBalance(BalanceParams),
    SoundRescue(CompressorParams),
}

impl ProviderParams {
    pub fn defaults(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Denoise => Self::Denoise(DenoiseParams::default()),
            ProviderKind::SpeechEnhance => Self::SpeechEnhance(SpeechParams::default()),
            ProviderKind::LoudnessBalance => Self::LoudnessBalance(BalanceParams::default()),
            ProviderKind::SoundRescue => Self::SoundRescue(CompressorParams::default()),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Denoise(_) => ProviderKind::Denoise,
            Self::SpeechEnhance(_) => ProviderKind::SpeechEnhance,
            Self::LoudnessBalance(_) => ProviderKind::LoudnessBalance,
            Self::SoundRescue(_) => ProviderKind::SoundRescue,
        }
    }

    /// The bare parameter object, as sent to a provider
    pub fn values(&self) -> Map<String, Value> {
        let value = match self {
            Self::Denoise(p) => serde_json::to_value(p),
            Self::SpeechEnhance(p) => serde_json::to_value(p),
            Self::LoudnessBalance(p) => serde_json::to_value(p),
            Self::SoundRescue(p) => serde_json::to_value(p),
        };
        match value {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    fn from_values(kind: ProviderKind, values: Map<String, Value>) -> Result<Self> {
        let value = Value::Object(values);
        Ok(match kind {
            ProviderKind::Denoise => Self::Denoise(serde_json::from_value(value)?),
            ProviderKind::SpeechEnhance => Self::SpeechEnhance(serde_json::from_value(value)?),
            ProviderKind::LoudnessBalance => Self::LoudnessBalance(serde_json::from_value(value)?),
            ProviderKind::SoundRescue => Self::SoundRescue(serde_json::from_value(value)?),
        })
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.values().get(name).cloned()
    }

    /// Set one parameter after checking it against this provider's schema
    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        let kind = self.kind();
        let value = find_spec(kind, name)?.check(&value)?;
        let mut values = self.values();
        values.insert(name.to_string(), value);
        *self = Self::from_values(kind, values)?;
        Ok(())
    }

    /// Set one parameter from its string form
    pub fn set_str(&mut self, name: &str, raw: &str) -> Result<()> {
        let value = find_spec(self.kind(), name)?.parse(raw)?;
        self.set(name, value)
    }

    /// Check every parameter against the schema
    pub fn validate(&self) -> Result<()> {
        let values = self.values();
        for spec in schema(self.kind()) {
            match values.get(&spec.name) {
                Some(v) => {
                    spec.check(v)?;
                }
                None => return Err(spec.invalid("<missing>")),
            }
        }
        Ok(())
    }
}

/// UI-side parameter state: one selected provider and its current values
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    params: ProviderParams,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self::new(ProviderKind::Denoise)
    }
}

impl ProviderSettings {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            params: ProviderParams::defaults(kind),
        }
    }

    pub fn selected(&self) -> ProviderKind {
        self.params.kind()
    }

    pub fn params(&self) -> &ProviderParams {
        &self.params
    }

    /// Switch provider; parameters reset to that provider's defaults
    pub fn select(&mut self, kind: ProviderKind) {
        self.params = ProviderParams::defaults(kind);
    }

    pub fn reset(&mut self) {
        self.select(self.selected());
    }

    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        self.params.set(name, value)
    }

    pub fn set_str(&mut self, name: &str, raw: &str) -> Result<()> {
        self.params.set_str(name, raw)
    }

    pub fn set_slider(&mut self, name: &str, position: f32) -> Result<()> {
        let value = find_spec(self.selected(), name)?.from_slider(position)?;
        self.params.set(name, value)
    }

    /// Snapshot of the current values for a job
    pub fn freeze(&self) -> ProviderParams {
        self.params.clone()
    }
}
