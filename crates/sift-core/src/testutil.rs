//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::batch::{BatchEvent, BatchReporter};
use crate::config::ExtractionConfig;
use crate::credentials::CredentialPool;
use crate::error::AppError;
use crate::models::Credential;
use crate::prompt::Prompt;
use crate::retry::BackoffConfig;
use crate::traits::Generator;

// ---------------------------------------------------------------------------
// MockGenerator
// ---------------------------------------------------------------------------

type Responder = dyn Fn(&Credential, &Prompt) -> Result<String, AppError> + Send + Sync;
type DelayFn = dyn Fn(&Prompt) -> Duration + Send + Sync;

/// One upstream call as seen by [`MockGenerator`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub key: String,
    pub model: String,
    pub user: String,
}

/// Mock generator driven by a closure, recording every call.
#[derive(Clone)]
pub struct MockGenerator {
    responder: Arc<Responder>,
    delay: Option<Arc<DelayFn>>,
    gauge: Option<(Arc<AtomicUsize>, Arc<AtomicUsize>)>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockGenerator {
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&Credential, &Prompt) -> Result<String, AppError> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            delay: None,
            gauge: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always replies with `reply`.
    pub fn always(reply: &str) -> Self {
        let reply = reply.to_string();
        Self::from_fn(move |_, _| Ok(reply.clone()))
    }

    /// Queue of responses. Each call pops the first element; an empty
    /// queue yields an error.
    pub fn with_responses(responses: Vec<Result<String, AppError>>) -> Self {
        let queue = Mutex::new(VecDeque::from(responses));
        Self::from_fn(move |_, _| {
            queue
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AppError::Generic("mock responses exhausted".into())))
        })
    }

    /// Sleep for `delay` before answering.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.with_delay_fn(move |_| delay)
    }

    /// Sleep for a prompt-dependent delay before answering.
    pub fn with_delay_fn<F>(mut self, delay: F) -> Self
    where
        F: Fn(&Prompt) -> Duration + Send + Sync + 'static,
    {
        self.delay = Some(Arc::new(delay));
        self
    }

    /// Track calls in flight (`current`) and the highest value seen (`peak`).
    pub fn with_gauge(mut self, current: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> Self {
        self.gauge = Some((current, peak));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Generator for MockGenerator {
    async fn generate(&self, credential: &Credential, prompt: &Prompt) -> Result<String, AppError> {
        self.calls.lock().unwrap().push(RecordedCall {
            key: credential.key.clone(),
            model: credential.model.clone(),
            user: prompt.user.clone(),
        });

        let _in_flight = self.gauge.as_ref().map(|(current, peak)| {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            InFlight(current.clone())
        });

        if let Some(delay) = &self.delay {
            let delay = delay(prompt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        (self.responder)(credential, prompt)
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Mock batch reporter that records event labels.
#[derive(Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BatchReporter for MockReporter {
    fn report(&self, event: BatchEvent<'_>) {
        let label = match &event {
            BatchEvent::Started { .. } => "Started",
            BatchEvent::FileStarted { .. } => "FileStarted",
            BatchEvent::FileFinished { .. } => "FileFinished",
            BatchEvent::Cancelled { .. } => "Cancelled",
            BatchEvent::Finished { .. } => "Finished",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Config with no waiting between retries.
pub fn fast_config() -> ExtractionConfig {
    ExtractionConfig {
        call_timeout: Duration::from_secs(5),
        quota_delay: Duration::ZERO,
        backoff: BackoffConfig::none(),
        ..ExtractionConfig::default()
    }
}

/// Pool of `key-1`/`key-2` on a single model.
pub fn two_key_pool() -> CredentialPool {
    CredentialPool::from_lists("key-1,key-2", "test-model").unwrap()
}

pub fn quota_error() -> AppError {
    AppError::LlmError {
        message: "RESOURCE_EXHAUSTED".into(),
        status_code: 429,
    }
}

pub fn server_error() -> AppError {
    AppError::LlmError {
        message: "backend unavailable".into(),
        status_code: 503,
    }
}
