use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::ExtractionConfig;
use crate::credentials::CredentialPool;
use crate::error::{AppError, ErrorCategory};
use crate::models::{ExtractionRequest, ExtractionResult, FailureDetail};
use crate::prompt::Prompt;
use crate::response::{ModelVerdict, parse_reply};
use crate::traits::{Cleaner, Generator};

/// Issues extraction requests through a shared [`CredentialPool`].
///
/// Generic over the upstream and the file normalizer so tests can run
/// without real HTTP. Cloning is cheap: the pool state is shared.
///
/// Per request:
/// 1. Normalize bytes to text (unreadable input fails without a call)
/// 2. Send instructions + text with the pool's current credential
/// 3. Quota errors rotate to the next credential and retry
/// 4. Transient errors back off and retry on the same credential
/// 5. Unparseable output gets one stricter retry on the same credential
/// 6. A pool exhausted by earlier requests gets one fresh cycle
#[derive(Clone)]
pub struct ExtractionCaller<G, C>
where
    G: Generator,
    C: Cleaner,
{
    generator: G,
    cleaner: C,
    pool: CredentialPool,
    config: ExtractionConfig,
}

impl<G, C> ExtractionCaller<G, C>
where
    G: Generator,
    C: Cleaner,
{
    pub fn new(generator: G, cleaner: C, pool: CredentialPool, config: ExtractionConfig) -> Self {
        Self {
            generator,
            cleaner,
            pool,
            config,
        }
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Run one extraction to completion. Never fails: every outcome,
    /// including errors, is folded into the returned result.
    pub async fn extract(&self, request: &ExtractionRequest) -> ExtractionResult {
        self.extract_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Like [`extract`](Self::extract), but stops between attempts once
    /// `cancel` fires. An in-flight upstream call is allowed to finish.
    pub async fn extract_with_cancel(
        &self,
        request: &ExtractionRequest,
        cancel: &CancellationToken,
    ) -> ExtractionResult {
        let span = tracing::info_span!("extract", source = %request.source);
        self.extract_inner(request, cancel).instrument(span).await
    }

    async fn extract_inner(
        &self,
        request: &ExtractionRequest,
        cancel: &CancellationToken,
    ) -> ExtractionResult {
        let text = match self.cleaner.clean(&request.source, &request.content) {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                tracing::warn!("No readable content; skipping upstream call");
                return ExtractionResult::failed(
                    &request.source,
                    ErrorCategory::InvalidInput,
                    "file contains no readable text",
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not normalize input");
                return ExtractionResult::failed(
                    &request.source,
                    ErrorCategory::InvalidInput,
                    e.to_string(),
                );
            }
        };

        tracing::debug!(chars = text.len(), "Normalized input");
        let prompt = Prompt::extraction(&request.instructions, &text);

        match self.complete(&prompt, parse_reply, cancel).await {
            Ok(ModelVerdict::Data(payload)) => {
                tracing::info!("Relevant data extracted");
                ExtractionResult::relevant(&request.source, payload)
            }
            Ok(ModelVerdict::NothingRelevant) => {
                tracing::info!("No relevant data");
                ExtractionResult::not_relevant(&request.source)
            }
            Err(failure) => {
                tracing::warn!(
                    category = %failure.category,
                    error = %failure.message,
                    "Extraction failed"
                );
                ExtractionResult::failed(&request.source, failure.category, failure.message)
            }
        }
    }

    /// Send `prompt` through the pool until `parse` accepts a reply or the
    /// retry policy gives up.
    ///
    /// This is the shared retry loop behind both file extraction and prompt
    /// refinement; only the prompt and the reply parser differ.
    ///
    /// Quota rotation is bounded by the pool: each request may start one
    /// fresh cycle when it finds the pool already exhausted, and fails with
    /// `pool_exhausted` once it has nothing left to try. `max_attempts`
    /// caps the other failures (transient errors, unparseable output).
    pub async fn complete<T, P>(
        &self,
        prompt: &Prompt,
        parse: P,
        cancel: &CancellationToken,
    ) -> Result<T, FailureDetail>
    where
        P: Fn(&str) -> Result<T, AppError>,
    {
        let mut attempts = 0u32;
        let mut transient_failures = 0u32;
        let mut quota_hits = vec![false; self.pool.len()];
        let mut restarted = false;
        // Stricter prompt, pinned to the credential that produced the bad reply.
        let mut reformat: Option<(usize, Prompt)> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(cancelled());
            }

            let Some(lease) = self.pool.current() else {
                let generation = self.pool.generation();
                if restarted || quota_hits.iter().all(|hit| *hit) {
                    return Err(FailureDetail {
                        category: ErrorCategory::PoolExhausted,
                        message: AppError::PoolExhausted(self.pool.len()).to_string(),
                    });
                }
                restarted = true;
                tracing::info!("Credential pool already exhausted; waiting for a fresh cycle");
                self.pause(self.config.quota_delay, cancel).await?;
                self.pool.restart_cycle(generation);
                continue;
            };

            let strict = reformat
                .as_ref()
                .filter(|(index, _)| *index == lease.index)
                .map(|(_, strict)| strict);
            let reformatting = strict.is_some();
            let active_prompt = strict.unwrap_or(prompt);

            tracing::debug!(
                attempt = attempts + 1,
                key = %lease.credential.masked_key(),
                model = %lease.credential.model,
                reformatting,
                "Calling upstream"
            );

            let outcome = match tokio::time::timeout(
                self.config.call_timeout,
                self.generator.generate(&lease.credential, active_prompt),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(AppError::Timeout(self.config.call_timeout.as_secs())),
            };

            let error = match outcome {
                Ok(raw) => match parse(&raw) {
                    Ok(value) => return Ok(value),
                    Err(e) if reformatting => {
                        return Err(FailureDetail {
                            category: ErrorCategory::MalformedOutput,
                            message: e.to_string(),
                        });
                    }
                    Err(e) => {
                        attempts += 1;
                        let failure = FailureDetail {
                            category: ErrorCategory::MalformedOutput,
                            message: e.to_string(),
                        };
                        if attempts >= self.config.max_attempts {
                            return Err(budget_spent(attempts, failure));
                        }
                        tracing::warn!(error = %e, "Unparseable model output; asking again");
                        reformat = Some((lease.index, prompt.with_reformat_demand(&raw)));
                        continue;
                    }
                },
                Err(e) => e,
            };

            let category = self.config.error_policy.classify(&error);

            match category {
                ErrorCategory::QuotaExceeded => {
                    tracing::warn!(
                        key = %lease.credential.masked_key(),
                        model = %lease.credential.model,
                        error = %error,
                        "Quota hit; rotating credential"
                    );
                    if let Some(hit) = quota_hits.get_mut(lease.index) {
                        *hit = true;
                    }
                    self.pool.mark_exhausted(lease.index);
                    transient_failures = 0;
                    reformat = None;
                    if !self.pool.is_exhausted() {
                        self.pause(self.config.quota_delay, cancel).await?;
                    }
                }
                ErrorCategory::TransientUpstream => {
                    transient_failures += 1;
                    attempts += 1;
                    if transient_failures >= self.config.max_transient_retries {
                        return Err(FailureDetail {
                            category,
                            message: format!(
                                "{error} (gave up after {transient_failures} attempts)"
                            ),
                        });
                    }
                    if attempts >= self.config.max_attempts {
                        return Err(budget_spent(
                            attempts,
                            FailureDetail {
                                category,
                                message: error.to_string(),
                            },
                        ));
                    }
                    let delay = self.config.backoff.effective_delay(transient_failures);
                    tracing::warn!(
                        error = %error,
                        retry_in_ms = %delay.as_millis(),
                        "Transient upstream error; backing off"
                    );
                    self.pause(delay, cancel).await?;
                }
                _ => {
                    return Err(FailureDetail {
                        category,
                        message: error.to_string(),
                    });
                }
            }
        }
    }

    async fn pause(&self, delay: Duration, cancel: &CancellationToken) -> Result<(), FailureDetail> {
        if delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            () = tokio::time::sleep(delay) => Ok(()),
            () = cancel.cancelled() => Err(cancelled()),
        }
    }
}

fn cancelled() -> FailureDetail {
    FailureDetail {
        category: ErrorCategory::Cancelled,
        message: AppError::Cancelled.to_string(),
    }
}

fn budget_spent(attempts: u32, last: FailureDetail) -> FailureDetail {
    FailureDetail {
        category: last.category,
        message: format!("gave up after {attempts} attempts: {}", last.message),
    }
}
