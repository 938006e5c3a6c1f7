use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorCategory};

/// One (API key, model) pair used to authenticate and route a request.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub key: String,
    pub model: String,
}

impl Credential {
    pub fn new(key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            model: model.into(),
        }
    }

    /// Key with everything but the last four characters hidden, for logs.
    pub fn masked_key(&self) -> String {
        let chars: Vec<char> = self.key.chars().collect();
        if chars.len() <= 4 {
            return "****".to_string();
        }
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("****{tail}")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("key", &self.masked_key())
            .field("model", &self.model)
            .finish()
    }
}

/// A raw input file handed over by the ingestion layer.
#[derive(Debug, Clone)]
pub struct FileInput {
    /// Source identifier, usually the file name.
    pub name: String,
    pub content: Vec<u8>,
}

impl FileInput {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// One file's worth of work for the extraction caller.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub source: String,
    pub content: Vec<u8>,
    /// Free-text extraction instructions, user-supplied or orchestrator-generated.
    pub instructions: String,
}

impl ExtractionRequest {
    pub fn new(file: FileInput, instructions: impl Into<String>) -> Self {
        Self {
            source: file.name,
            content: file.content,
            instructions: instructions.into(),
        }
    }
}

/// Outcome class of a single extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Relevant,
    NotRelevant,
    Failed,
}

impl ExtractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionStatus::Relevant => "relevant",
            ExtractionStatus::NotRelevant => "not_relevant",
            ExtractionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ExtractionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why an extraction ended up `failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub category: ErrorCategory,
    pub message: String,
}

impl fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.message)
    }
}

impl From<FailureDetail> for AppError {
    fn from(detail: FailureDetail) -> Self {
        AppError::Failed {
            category: detail.category,
            message: detail.message,
        }
    }
}

/// Exactly one of these is produced per input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub source: String,
    pub status: ExtractionStatus,
    pub payload: Option<serde_json::Value>,
    pub error: Option<FailureDetail>,
}

impl ExtractionResult {
    pub fn relevant(source: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            source: source.into(),
            status: ExtractionStatus::Relevant,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn not_relevant(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            status: ExtractionStatus::NotRelevant,
            payload: None,
            error: None,
        }
    }

    pub fn failed(
        source: impl Into<String>,
        category: ErrorCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            status: ExtractionStatus::Failed,
            payload: None,
            error: Some(FailureDetail {
                category,
                message: message.into(),
            }),
        }
    }

    pub fn is_relevant(&self) -> bool {
        self.status == ExtractionStatus::Relevant
    }

    pub fn category(&self) -> Option<ErrorCategory> {
        self.error.as_ref().map(|e| e.category)
    }
}

/// How per-file results are packaged into output documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// One document per input file, including empty ones.
    #[default]
    OnePerFile,
    /// One document per file that produced data.
    OnePerRelevantFile,
    /// Every relevant payload merged into a single document.
    SingleFile,
}

impl OutputMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputMode::OnePerFile => "one_per_file",
            OutputMode::OnePerRelevantFile => "one_per_relevant_file",
            OutputMode::SingleFile => "single_file",
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OutputMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "one_per_file" => Ok(OutputMode::OnePerFile),
            "one_per_relevant_file" => Ok(OutputMode::OnePerRelevantFile),
            "single_file" => Ok(OutputMode::SingleFile),
            other => Err(AppError::ConfigError(format!(
                "Unknown output method '{other}': expected one_per_file, one_per_relevant_file or single_file"
            ))),
        }
    }
}

/// A single named JSON artifact in an [`OutputBundle`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputDocument {
    /// File name the delivery layer should use, e.g. `invoice.json`.
    pub name: String,
    /// Input file this document was rendered from (`None` for merged output).
    pub source: Option<String>,
    pub content: serde_json::Value,
}

impl OutputDocument {
    pub fn to_pretty_bytes(&self) -> Result<Vec<u8>, AppError> {
        Ok(serde_json::to_vec_pretty(&self.content)?)
    }
}

/// Rendered output of a batch. Owns zero or more named JSON documents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputBundle {
    pub mode: OutputMode,
    pub documents: Vec<OutputDocument>,
}

impl OutputBundle {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.documents.iter().map(|d| d.name.as_str()).collect()
    }
}
