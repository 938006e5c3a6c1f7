use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error types for Sift.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request could not be built or sent.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// The LLM service answered with a non-success status.
    #[error("LLM error (HTTP {status_code}): {message}")]
    LlmError { message: String, status_code: u16 },

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The model replied with something that is not usable JSON.
    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    /// Input file content could not be turned into text.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Every credential in the pool is rate-limited or out of quota.
    #[error("All {0} credentials are exhausted")]
    PoolExhausted(usize),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The batch was cancelled before this work finished.
    #[error("Cancelled")]
    Cancelled,

    /// A call gave up after its retry policy ran out.
    #[error("{category}: {message}")]
    Failed {
        category: ErrorCategory,
        message: String,
    },

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// HTTP status reported by the upstream, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            AppError::LlmError { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

/// Failure category attached to a `failed` extraction result.
///
/// Lets a caller tell "every credential was rate-limited" apart from
/// "the model never produced data".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    QuotaExceeded,
    TransientUpstream,
    MalformedOutput,
    PoolExhausted,
    InvalidInput,
    UpstreamRejected,
    Cancelled,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::QuotaExceeded => "quota_exceeded",
            ErrorCategory::TransientUpstream => "transient_upstream",
            ErrorCategory::MalformedOutput => "malformed_output",
            ErrorCategory::PoolExhausted => "pool_exhausted",
            ErrorCategory::InvalidInput => "invalid_input",
            ErrorCategory::UpstreamRejected => "upstream_rejected",
            ErrorCategory::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ErrorCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "quota_exceeded" => Ok(ErrorCategory::QuotaExceeded),
            "transient_upstream" => Ok(ErrorCategory::TransientUpstream),
            "malformed_output" => Ok(ErrorCategory::MalformedOutput),
            "pool_exhausted" => Ok(ErrorCategory::PoolExhausted),
            "invalid_input" => Ok(ErrorCategory::InvalidInput),
            "upstream_rejected" => Ok(ErrorCategory::UpstreamRejected),
            "cancelled" => Ok(ErrorCategory::Cancelled),
            _ => Err(format!("Unknown error category: {s}")),
        }
    }
}

/// Maps upstream errors onto [`ErrorCategory`].
///
/// Which status codes mean "quota" and which mean "try again" is specific
/// to each provider, so both lists are plain data. Timeouts and connection
/// failures are always transient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPolicy {
    /// Status codes that trigger credential rotation.
    pub quota_status_codes: Vec<u16>,
    /// Case-insensitive substrings of an error message that also mean quota
    /// (e.g. Gemini's `RESOURCE_EXHAUSTED`).
    pub quota_markers: Vec<String>,
    /// Status codes retried against the same credential.
    pub transient_status_codes: Vec<u16>,
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self {
            quota_status_codes: vec![429],
            quota_markers: vec!["RESOURCE_EXHAUSTED".into(), "quota".into()],
            transient_status_codes: vec![408, 500, 502, 503, 504],
        }
    }
}

impl ErrorPolicy {
    pub fn classify(&self, error: &AppError) -> ErrorCategory {
        match error {
            AppError::Timeout(_) | AppError::NetworkError(_) => ErrorCategory::TransientUpstream,
            AppError::LlmError {
                status_code,
                message,
            } => {
                if self.quota_status_codes.contains(status_code) || self.has_quota_marker(message)
                {
                    ErrorCategory::QuotaExceeded
                } else if self.transient_status_codes.contains(status_code) {
                    ErrorCategory::TransientUpstream
                } else {
                    ErrorCategory::UpstreamRejected
                }
            }
            AppError::MalformedOutput(_) | AppError::SerializationError(_) => {
                ErrorCategory::MalformedOutput
            }
            AppError::InvalidInput(_) => ErrorCategory::InvalidInput,
            AppError::PoolExhausted(_) => ErrorCategory::PoolExhausted,
            AppError::Cancelled => ErrorCategory::Cancelled,
            AppError::Failed { category, .. } => *category,
            AppError::HttpError(msg) => {
                if msg.contains("timeout") || msg.contains("connect") || msg.contains("reset") {
                    ErrorCategory::TransientUpstream
                } else {
                    ErrorCategory::UpstreamRejected
                }
            }
            AppError::ConfigError(_) | AppError::Generic(_) => ErrorCategory::UpstreamRejected,
        }
    }

    fn has_quota_marker(&self, message: &str) -> bool {
        let lower = message.to_lowercase();
        self.quota_markers
            .iter()
            .any(|marker| lower.contains(&marker.to_lowercase()))
    }
}
