use std::collections::BTreeMap;
use std::fmt;

use futures::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::caller::ExtractionCaller;
use crate::error::{AppError, ErrorCategory};
use crate::models::{ExtractionRequest, ExtractionResult, ExtractionStatus, FileInput};
use crate::traits::{Cleaner, Generator};

/// Events emitted while a batch runs, for monitoring/logging.
#[derive(Debug, Clone)]
pub enum BatchEvent<'a> {
    Started {
        batch_id: Uuid,
        files: usize,
        concurrency: usize,
    },
    FileStarted {
        index: usize,
        source: &'a str,
    },
    FileFinished {
        index: usize,
        result: &'a ExtractionResult,
    },
    Cancelled {
        batch_id: Uuid,
    },
    Finished {
        batch_id: Uuid,
        summary: &'a BatchSummary,
    },
}

/// Trait for receiving batch events (decoupled logging).
pub trait BatchReporter: Send + Sync {
    fn report(&self, event: BatchEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingBatchReporter;

impl BatchReporter for TracingBatchReporter {
    fn report(&self, event: BatchEvent<'_>) {
        match event {
            BatchEvent::Started {
                batch_id,
                files,
                concurrency,
            } => {
                tracing::info!(%batch_id, %files, %concurrency, "Batch started");
            }
            BatchEvent::FileStarted { index, source } => {
                tracing::debug!(%index, %source, "Processing file");
            }
            BatchEvent::FileFinished { index, result } => match &result.error {
                Some(failure) => tracing::warn!(
                    %index,
                    source = %result.source,
                    category = %failure.category,
                    error = %failure.message,
                    "File failed"
                ),
                None => tracing::info!(
                    %index,
                    source = %result.source,
                    status = %result.status,
                    "File finished"
                ),
            },
            BatchEvent::Cancelled { batch_id } => {
                tracing::warn!(%batch_id, "Batch cancelled; remaining files will not start");
            }
            BatchEvent::Finished { batch_id, summary } => {
                tracing::info!(%batch_id, %summary, "Batch finished");
            }
        }
    }
}

/// Counts per outcome for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub relevant: usize,
    pub not_relevant: usize,
    pub failed: usize,
    pub failures: BTreeMap<ErrorCategory, usize>,
}

impl BatchSummary {
    pub fn from_results(results: &[ExtractionResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Self::default()
        };
        for result in results {
            match result.status {
                ExtractionStatus::Relevant => summary.relevant += 1,
                ExtractionStatus::NotRelevant => summary.not_relevant += 1,
                ExtractionStatus::Failed => summary.failed += 1,
            }
            if let Some(category) = result.category() {
                *summary.failures.entry(category).or_default() += 1;
            }
        }
        summary
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total={} relevant={} not_relevant={} failed={}",
            self.total, self.relevant, self.not_relevant, self.failed
        )?;
        for (category, count) in &self.failures {
            write!(f, " {category}={count}")?;
        }
        Ok(())
    }
}

/// Everything a batch produced, in input order.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub batch_id: Uuid,
    pub results: Vec<ExtractionResult>,
    pub summary: BatchSummary,
    pub cancelled: bool,
}

impl BatchOutcome {
    pub fn failures(&self) -> impl Iterator<Item = &ExtractionResult> {
        self.results
            .iter()
            .filter(|r| r.status == ExtractionStatus::Failed)
    }
}

/// Fans a set of files out over an [`ExtractionCaller`].
///
/// At most `max_concurrency` files are in flight at once. Exactly one
/// result comes back per input file, in input order, whatever happens
/// upstream.
#[derive(Clone)]
pub struct BatchRunner<G, C>
where
    G: Generator,
    C: Cleaner,
{
    caller: ExtractionCaller<G, C>,
}

impl<G, C> BatchRunner<G, C>
where
    G: Generator,
    C: Cleaner,
{
    pub fn new(caller: ExtractionCaller<G, C>) -> Self {
        Self { caller }
    }

    pub fn caller(&self) -> &ExtractionCaller<G, C> {
        &self.caller
    }

    /// Run every file through the extraction caller.
    ///
    /// Files that have not started when `cancel` fires come back as
    /// `failed` with category `cancelled`; calls already in flight finish.
    pub async fn run<R: BatchReporter>(
        &self,
        files: Vec<FileInput>,
        instructions: &str,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<BatchOutcome, AppError> {
        if instructions.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "extraction instructions are empty".into(),
            ));
        }

        let batch_id = Uuid::new_v4();
        let total = files.len();
        let concurrency = self.caller.config().max_concurrency.max(1);
        reporter.report(BatchEvent::Started {
            batch_id,
            files: total,
            concurrency,
        });

        let mut finished: Vec<(usize, ExtractionResult)> = Vec::with_capacity(total);
        let mut stream = futures::stream::iter(files.into_iter().enumerate())
            .map(|(index, file)| self.process_file(index, file, instructions, cancel, reporter))
            .buffer_unordered(concurrency);

        while let Some((index, result)) = stream.next().await {
            reporter.report(BatchEvent::FileFinished {
                index,
                result: &result,
            });
            finished.push((index, result));
        }
        drop(stream);

        finished.sort_by_key(|(index, _)| *index);
        let results: Vec<ExtractionResult> = finished.into_iter().map(|(_, r)| r).collect();

        let cancelled = cancel.is_cancelled();
        if cancelled {
            reporter.report(BatchEvent::Cancelled { batch_id });
        }

        let summary = BatchSummary::from_results(&results);
        reporter.report(BatchEvent::Finished {
            batch_id,
            summary: &summary,
        });

        Ok(BatchOutcome {
            batch_id,
            results,
            summary,
            cancelled,
        })
    }

    async fn process_file<R: BatchReporter>(
        &self,
        index: usize,
        file: FileInput,
        instructions: &str,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> (usize, ExtractionResult) {
        let request = ExtractionRequest::new(file, instructions);
        if cancel.is_cancelled() {
            let result = ExtractionResult::failed(
                &request.source,
                ErrorCategory::Cancelled,
                "batch cancelled before this file started",
            );
            return (index, result);
        }

        reporter.report(BatchEvent::FileStarted {
            index,
            source: &request.source,
        });
        let result = self.caller.extract_with_cancel(&request, cancel).await;
        (index, result)
    }
}
