//! Error handling for podrescue
//!
//! Every error carries a stable code and, where it makes sense, recovery
//! suggestions that a UI can show next to the message.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for podrescue operations
pub type Result<T> = std::result::Result<T, RescueError>;

/// Main error type for podrescue operations
#[derive(Error, Debug)]
pub enum RescueError {
    // Resource Errors
    #[error("Temporary file error at {path}: {source}")]
    TempResource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Codec Errors
    #[error("Audio codec error: {reason}")]
    Codec {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Audio contains no samples")]
    EmptyAudio,

    // Loudness filter
    #[error("Loudness filter failed: {reason}")]
    FilterFailed { reason: String },

    // Provider Errors
    #[error("Enhancement provider {provider} failed: {reason}")]
    Provider { provider: String, reason: String },

    #[error("Enhancement provider {provider} timed out after {timeout_ms}ms")]
    ProviderTimeout { provider: String, timeout_ms: u64 },

    #[error("Enhancement provider {provider} unavailable: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    #[error("No provider registered for {provider}")]
    UnknownProvider { provider: String },

    #[error("Invalid parameter {param}={value}: expected {expected}")]
    InvalidParameter {
        param: String,
        value: String,
        expected: String,
    },

    // Job Errors
    #[error("A job is already running for source {source_id}")]
    Busy { source_id: String },

    #[error("Invalid job transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Job parameters are frozen once the job leaves the queue")]
    ParametersFrozen,

    #[error("Unknown job: {job_id}")]
    UnknownJob { job_id: String },

    #[error("Timed out waiting for job {job_id}")]
    WaitTimeout { job_id: String },

    // History Errors
    #[error("Version name already in use: {name}")]
    DuplicateVersion { name: String },

    #[error("Unknown version: {name}")]
    UnknownVersion { name: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RescueError {
    /// Shorthand for a codec error without an underlying source
    pub fn codec(reason: impl Into<String>) -> Self {
        RescueError::Codec {
            reason: reason.into(),
            source: None,
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            RescueError::TempResource { .. } => "TEMP_RESOURCE",
            RescueError::Codec { .. } => "CODEC_ERROR",
            RescueError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            RescueError::EmptyAudio => "EMPTY_AUDIO",
            RescueError::FilterFailed { .. } => "FILTER_FAILED",
            RescueError::Provider { .. } => "PROVIDER_ERROR",
            RescueError::ProviderTimeout { .. } => "PROVIDER_TIMEOUT",
            RescueError::ProviderUnavailable { .. } => "PROVIDER_UNAVAILABLE",
            RescueError::UnknownProvider { .. } => "UNKNOWN_PROVIDER",
            RescueError::InvalidParameter { .. } => "INVALID_PARAMETER",
            RescueError::Busy { .. } => "BUSY",
            RescueError::InvalidTransition { .. } => "INVALID_TRANSITION",
            RescueError::ParametersFrozen => "PARAMETERS_FROZEN",
            RescueError::UnknownJob { .. } => "UNKNOWN_JOB",
            RescueError::WaitTimeout { .. } => "WAIT_TIMEOUT",
            RescueError::DuplicateVersion { .. } => "DUPLICATE_VERSION",
            RescueError::UnknownVersion { .. } => "UNKNOWN_VERSION",
            RescueError::Io(_) => "IO_ERROR",
            RescueError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if the user can simply try again
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RescueError::Provider { .. }
                | RescueError::ProviderTimeout { .. }
                | RescueError::ProviderUnavailable { .. }
                | RescueError::Busy { .. }
                | RescueError::InvalidParameter { .. }
                | RescueError::WaitTimeout { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            RescueError::Codec { .. } | RescueError::UnsupportedFormat { .. } => vec![
                "Try converting the file to WAV or MP3 first",
                "Check that ffmpeg is installed for compressed formats",
            ],
            RescueError::Provider { .. } | RescueError::ProviderUnavailable { .. } => vec![
                "Try again in a moment",
                "Check the provider URL and API token",
                "Use Dynamic Balance instead, it runs locally",
            ],
            RescueError::ProviderTimeout { .. } => vec![
                "Try a shorter clip",
                "Raise PODRESCUE_TIMEOUT_MS",
            ],
            RescueError::Busy { .. } => vec!["Processing in progress, please wait"],
            RescueError::InvalidParameter { .. } => vec!["Reset the provider to its defaults"],
            _ => vec![],
        }
    }

    /// Get a user-friendly message for this error
    pub fn friendly_message(&self) -> String {
        match self {
            RescueError::Provider { .. }
            | RescueError::ProviderTimeout { .. }
            | RescueError::ProviderUnavailable { .. } => {
                format!("This remote enhancement failed, try again. ({})", self)
            }
            RescueError::Busy { .. } => {
                "A job is already running for this audio. Processing in progress, please wait."
                    .to_string()
            }
            RescueError::EmptyAudio => "That file doesn't contain any audio.".to_string(),
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = RescueError::Busy {
            source_id: "abc".to_string(),
        };
        assert_eq!(err.error_code(), "BUSY");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_provider_errors_read_as_retryable() {
        let err = RescueError::ProviderUnavailable {
            provider: "denoise".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(err.friendly_message().contains("try again"));
        assert!(!err.recovery_suggestions().is_empty());
    }

    #[test]
    fn test_cleanup_errors_are_not_recoverable() {
        let err = RescueError::TempResource {
            path: PathBuf::from("/tmp/x.wav"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(!err.is_recoverable());
        assert_eq!(err.error_code(), "TEMP_RESOURCE");
    }
}
