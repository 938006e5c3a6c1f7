//! Packaging of per-file results into named JSON documents.
//!
//! Every document carries a `metadata` envelope next to `extracted_data`:
//!
//! ```json
//! {
//!   "metadata": {
//!     "extraction_timestamp_utc": "2024-05-01T12:00:00Z",
//!     "source_file": "invoice.eml",
//!     "status": "relevant"
//!   },
//!   "extracted_data": { "...": "..." }
//! }
//! ```

use std::collections::HashSet;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Value, json};

use crate::models::{ExtractionResult, OutputBundle, OutputDocument, OutputMode};

/// Name of the merged document produced in [`OutputMode::SingleFile`].
pub const CONSOLIDATED_FILE_NAME: &str = "consolidated_results.json";

/// Renders a batch's results according to an [`OutputMode`].
#[derive(Debug, Clone)]
pub struct ResultAssembler {
    mode: OutputMode,
    timestamp: Option<DateTime<Utc>>,
}

impl ResultAssembler {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            timestamp: None,
        }
    }

    /// Pin the extraction timestamp written into metadata.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Build the output bundle. `results` must already be in input order.
    ///
    /// * `one_per_file`: a document for every result, failures included
    /// * `one_per_relevant_file`: documents only for results with data
    /// * `single_file`: exactly one merged document, even if nothing matched
    pub fn assemble(&self, results: &[ExtractionResult]) -> OutputBundle {
        let timestamp = self
            .timestamp
            .unwrap_or_else(Utc::now)
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        let documents = match self.mode {
            OutputMode::OnePerFile => per_file(results.iter(), &timestamp),
            OutputMode::OnePerRelevantFile => {
                per_file(results.iter().filter(|r| r.is_relevant()), &timestamp)
            }
            OutputMode::SingleFile => vec![consolidated(results, &timestamp)],
        };

        tracing::debug!(
            mode = %self.mode,
            results = results.len(),
            documents = documents.len(),
            "Assembled output"
        );

        OutputBundle {
            mode: self.mode,
            documents,
        }
    }
}

fn per_file<'a>(
    results: impl Iterator<Item = &'a ExtractionResult>,
    timestamp: &str,
) -> Vec<OutputDocument> {
    let mut names = NameAllocator::default();
    results
        .map(|result| OutputDocument {
            name: names.allocate(&result.source),
            source: Some(result.source.clone()),
            content: file_document(result, timestamp),
        })
        .collect()
}

fn file_document(result: &ExtractionResult, timestamp: &str) -> Value {
    let mut metadata = json!({
        "extraction_timestamp_utc": timestamp,
        "source_file": result.source,
        "status": result.status,
    });
    if let Some(failure) = &result.error {
        metadata["error"] = json!({
            "category": failure.category,
            "message": failure.message,
        });
    }
    json!({
        "metadata": metadata,
        "extracted_data": result.payload.clone().unwrap_or(Value::Null),
    })
}

fn consolidated(results: &[ExtractionResult], timestamp: &str) -> OutputDocument {
    let data: Vec<Value> = results
        .iter()
        .filter(|r| r.is_relevant())
        .map(|r| {
            json!({
                "source_file": r.source,
                "data": r.payload.clone().unwrap_or(Value::Null),
            })
        })
        .collect();

    OutputDocument {
        name: CONSOLIDATED_FILE_NAME.to_string(),
        source: None,
        content: json!({
            "metadata": {
                "extraction_timestamp_utc": timestamp,
                "total_files_processed": results.len(),
                "files_with_data": data.len(),
            },
            "extracted_data": data,
        }),
    }
}

/// Hands out `<stem>.json` names, suffixing `-2`, `-3`, ... on collision.
#[derive(Default)]
struct NameAllocator {
    used: HashSet<String>,
}

impl NameAllocator {
    fn allocate(&mut self, source: &str) -> String {
        let stem = file_stem(source);
        let mut candidate = format!("{stem}.json");
        let mut n = 2;
        while !self.used.insert(candidate.clone()) {
            candidate = format!("{stem}-{n}.json");
            n += 1;
        }
        candidate
    }
}

fn file_stem(source: &str) -> String {
    let base = source.rsplit(['/', '\\']).next().unwrap_or(source);
    let stem = match base.rfind('.') {
        Some(0) | None => base,
        Some(pos) => &base[..pos],
    };
    let stem: String = stem
        .chars()
        .map(|c| if c.is_control() { '_' } else { c })
        .collect();
    if stem.trim().is_empty() {
        "document".to_string()
    } else {
        stem
    }
}
