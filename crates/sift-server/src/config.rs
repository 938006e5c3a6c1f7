use std::time::Duration;

use sift_client::{DEFAULT_BASE_URL, DEFAULT_MODELS};
use sift_core::config::ExtractionConfig;
use sift_core::error::AppError;

/// Server settings read from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Bearer token required on `/v1` routes (`None` = open, bring-your-own-key only).
    pub server_token: Option<String>,
    /// Models used when a request does not name its own.
    pub default_models: String,
    pub base_url: String,
    pub max_upload_bytes: usize,
    pub max_files: usize,
    pub extraction: ExtractionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            server_token: None,
            default_models: DEFAULT_MODELS.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_upload_bytes: 50 * 1024 * 1024,
            max_files: 500,
            extraction: ExtractionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Read configuration from environment variables.
    ///
    /// - `SIFT_SERVER_PORT` (optional, defaults to 3000)
    /// - `SIFT_SERVER_TOKEN` (optional, enables bearer auth)
    /// - `SIFT_MODELS`, `SIFT_BASE_URL` (optional)
    /// - `SIFT_TIMEOUT_SECS`, `SIFT_CONCURRENCY`, `SIFT_MAX_ATTEMPTS` (optional)
    /// - `SIFT_MAX_UPLOAD_MB`, `SIFT_MAX_FILES` (optional)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = parse_var(&lookup, "SIFT_SERVER_PORT", defaults.port)?;
        let timeout_secs = parse_positive(&lookup, "SIFT_TIMEOUT_SECS", 120u64)?;
        let concurrency = parse_positive(&lookup, "SIFT_CONCURRENCY", 4usize)?;
        let max_attempts = parse_positive(&lookup, "SIFT_MAX_ATTEMPTS", 20u32)?;
        let max_upload_mb = parse_positive(&lookup, "SIFT_MAX_UPLOAD_MB", 50usize)?;
        let max_files = parse_positive(&lookup, "SIFT_MAX_FILES", defaults.max_files)?;

        let extraction = ExtractionConfig::default()
            .with_call_timeout(Duration::from_secs(timeout_secs))
            .with_max_concurrency(concurrency)
            .with_max_attempts(max_attempts);
        extraction.validate()?;

        Ok(Self {
            port,
            server_token: text("SIFT_SERVER_TOKEN"),
            default_models: text("SIFT_MODELS").unwrap_or(defaults.default_models),
            base_url: text("SIFT_BASE_URL").unwrap_or(defaults.base_url),
            max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
            max_files,
            extraction,
        })
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            AppError::ConfigError(format!("Invalid {name} '{raw}': must be a positive integer"))
        }),
    }
}

fn parse_positive<F, T>(lookup: &F, name: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + PartialOrd + Default,
{
    let value = parse_var(lookup, name, default)?;
    if value <= T::default() {
        return Err(AppError::ConfigError(format!("{name} must be at least 1")));
    }
    Ok(value)
}
