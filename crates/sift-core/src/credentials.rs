//! Rotating pool of (API key, model) credentials.
//!
//! The pool is the only mutable state shared between concurrent extractions.
//! It tracks which credentials have hit a quota or rate limit during the
//! current run and where the rotation cursor stands.
//!
//! ```text
//! keys  = k1,k2      models = m1,m2
//! order = (k1,m1) (k2,m1) (k1,m2) (k2,m2)
//!            ^cursor --[quota]--> next non-exhausted, wrapping once
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::AppError;
use crate::models::Credential;

/// Split a comma-separated list, trimming entries and dropping blanks.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Build the credential list as the cartesian product of keys and models.
///
/// Ordering is model-major: every key is tried on the first model before
/// any key is tried on the second.
pub fn cartesian(keys: &[String], models: &[String]) -> Result<Vec<Credential>, AppError> {
    if keys.is_empty() {
        return Err(AppError::ConfigError("At least one API key is required".into()));
    }
    if models.is_empty() {
        return Err(AppError::ConfigError("At least one model is required".into()));
    }

    Ok(models
        .iter()
        .flat_map(|model| keys.iter().map(move |key| Credential::new(key, model)))
        .collect())
}

/// The active credential together with its position in the pool.
#[derive(Debug, Clone)]
pub struct Lease {
    pub index: usize,
    pub credential: Credential,
}

#[derive(Debug)]
struct PoolState {
    cursor: usize,
    exhausted: Vec<bool>,
    /// Bumped every time a fresh rotation cycle starts.
    generation: u64,
}

impl PoolState {
    fn begin_cycle(&mut self) {
        self.cursor = 0;
        self.exhausted.iter_mut().for_each(|e| *e = false);
        self.generation += 1;
    }

    fn all_exhausted(&self) -> bool {
        self.exhausted.iter().all(|e| *e)
    }

    /// Move the cursor to the first non-exhausted slot after `from`, wrapping once.
    fn seek_from(&mut self, from: usize) {
        let len = self.exhausted.len();
        for step in 1..=len {
            let candidate = (from + step) % len;
            if !self.exhausted[candidate] {
                self.cursor = candidate;
                return;
            }
        }
    }
}

/// Thread-safe, cheaply cloneable credential rotation.
#[derive(Clone)]
pub struct CredentialPool {
    credentials: Arc<[Credential]>,
    state: Arc<Mutex<PoolState>>,
}

impl CredentialPool {
    pub fn new(credentials: Vec<Credential>) -> Result<Self, AppError> {
        if credentials.is_empty() {
            return Err(AppError::ConfigError(
                "Credential pool needs at least one credential".into(),
            ));
        }
        let state = PoolState {
            cursor: 0,
            exhausted: vec![false; credentials.len()],
            generation: 0,
        };
        Ok(Self {
            credentials: credentials.into(),
            state: Arc::new(Mutex::new(state)),
        })
    }

    /// Build from comma-separated key and model lists.
    pub fn from_lists(keys: &str, models: &str) -> Result<Self, AppError> {
        Self::new(cartesian(&parse_list(keys), &parse_list(models))?)
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned credential pool mutex");
            poisoned.into_inner()
        })
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// The active credential, or `None` once every credential is exhausted.
    pub fn current(&self) -> Option<Lease> {
        let state = self.lock_state();
        if state.all_exhausted() {
            return None;
        }
        Some(Lease {
            index: state.cursor,
            credential: self.credentials[state.cursor].clone(),
        })
    }

    /// Mark the current credential exhausted and move to the next usable one.
    ///
    /// A no-op once the pool is exhausted.
    pub fn advance(&self) {
        let mut state = self.lock_state();
        if state.all_exhausted() {
            return;
        }
        let cursor = state.cursor;
        state.exhausted[cursor] = true;
        state.seek_from(cursor);
        self.log_rotation(&state, cursor);
    }

    /// Mark the credential at `index` exhausted.
    ///
    /// Only moves the cursor if it still points at `index`, so two requests
    /// failing on the same credential rotate the pool once, not twice.
    pub fn mark_exhausted(&self, index: usize) {
        let mut state = self.lock_state();
        if index >= state.exhausted.len() || state.exhausted[index] {
            return;
        }
        state.exhausted[index] = true;
        if state.cursor == index {
            state.seek_from(index);
        }
        self.log_rotation(&state, index);
    }

    /// True once every credential failed during the current cycle.
    pub fn is_exhausted(&self) -> bool {
        self.lock_state().all_exhausted()
    }

    pub fn exhausted_count(&self) -> usize {
        self.lock_state().exhausted.iter().filter(|e| **e).count()
    }

    /// Start a fresh rotation cycle from the first credential.
    pub fn reset(&self) {
        self.lock_state().begin_cycle();
    }

    /// Number of rotation cycles started so far.
    pub fn generation(&self) -> u64 {
        self.lock_state().generation
    }

    /// Start a fresh cycle if the pool is still exhausted in cycle `observed`.
    ///
    /// Returns `false` when another request already started one, so
    /// concurrent callers never wipe flags set in the new cycle.
    pub fn restart_cycle(&self, observed: u64) -> bool {
        let mut state = self.lock_state();
        if state.generation != observed || !state.all_exhausted() {
            return false;
        }
        state.begin_cycle();
        tracing::info!(
            pool_size = self.credentials.len(),
            generation = state.generation,
            "Credential pool exhausted; starting a fresh cycle"
        );
        true
    }

    fn log_rotation(&self, state: &PoolState, failed: usize) {
        let credential = &self.credentials[failed];
        if state.all_exhausted() {
            tracing::warn!(
                key = %credential.masked_key(),
                model = %credential.model,
                pool_size = self.credentials.len(),
                "Credential exhausted; no credentials left in pool"
            );
        } else {
            let next = &self.credentials[state.cursor];
            tracing::info!(
                key = %credential.masked_key(),
                model = %credential.model,
                next_key = %next.masked_key(),
                next_model = %next.model,
                "Credential exhausted; rotating"
            );
        }
    }
}

impl std::fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock_state();
        f.debug_struct("CredentialPool")
            .field("credentials", &self.credentials)
            .field("cursor", &state.cursor)
            .field("exhausted", &state.exhausted)
            .finish()
    }
}
