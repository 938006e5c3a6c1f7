use sift_client::{ContentCleaner, OpenAiGenerator};
use sift_core::error::AppError;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;

/// Shared application state, available to all route handlers via `State<Arc<AppState>>`.
///
/// Holds no credentials: every request brings its own key and gets a fresh
/// credential pool.
pub struct AppState {
    pub config: ServerConfig,
    pub generator: OpenAiGenerator,
    pub cleaner: ContentCleaner,
    /// Cancelled on shutdown; each request runs under a child token.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Result<Self, AppError> {
        let generator = OpenAiGenerator::with_base_url(&config.base_url)?
            .with_timeout(config.extraction.call_timeout + std::time::Duration::from_secs(5))?;
        Ok(Self {
            config,
            generator,
            cleaner: ContentCleaner::new(),
            shutdown: CancellationToken::new(),
        })
    }
}
