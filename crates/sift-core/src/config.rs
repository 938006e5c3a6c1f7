use std::time::Duration;

use crate::error::{AppError, ErrorPolicy};
use crate::retry::BackoffConfig;

/// Tuning knobs for extraction calls and batch fan-out.
///
/// Supplied as plain values by the CLI or server layer; the core never
/// reads the environment itself.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Upper bound on a single upstream call.
    pub call_timeout: Duration,
    /// Maximum number of files in flight at once.
    pub max_concurrency: usize,
    /// Failed calls allowed for one file, across every credential, that
    /// ended in a transient error or unparseable output. Quota errors only
    /// rotate the pool and are bounded by its size instead.
    pub max_attempts: u32,
    /// Attempts against one credential for transient failures.
    pub max_transient_retries: u32,
    /// Pause before retrying on the next credential after a quota error,
    /// and before starting a fresh cycle on an exhausted pool.
    pub quota_delay: Duration,
    pub backoff: BackoffConfig,
    pub error_policy: ErrorPolicy,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(120),
            max_concurrency: 4,
            max_attempts: 20,
            max_transient_retries: 3,
            quota_delay: Duration::from_secs(1),
            backoff: BackoffConfig::default(),
            error_policy: ErrorPolicy::default(),
        }
    }
}

impl ExtractionConfig {
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Reject values that would stall or disable the pipeline.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.call_timeout.is_zero() {
            return Err(AppError::ConfigError("call timeout must be positive".into()));
        }
        if self.max_concurrency == 0 {
            return Err(AppError::ConfigError(
                "max concurrency must be at least 1".into(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(AppError::ConfigError("max attempts must be at least 1".into()));
        }
        if self.max_transient_retries == 0 {
            return Err(AppError::ConfigError(
                "max transient retries must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ExtractionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_transient_retries, 3);
        assert_eq!(config.call_timeout, Duration::from_secs(120));
    }

    #[test]
    fn zero_values_rejected() {
        assert!(
            ExtractionConfig::default()
                .with_max_concurrency(0)
                .validate()
                .is_err()
        );
        assert!(
            ExtractionConfig::default()
                .with_max_attempts(0)
                .validate()
                .is_err()
        );
        assert!(
            ExtractionConfig::default()
                .with_call_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
    }
}
