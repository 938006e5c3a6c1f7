pub mod assemble;
pub mod batch;
pub mod caller;
pub mod config;
pub mod credentials;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod response;
pub mod retry;
pub mod traits;

#[cfg(test)]
pub(crate) mod testutil;

pub use assemble::{CONSOLIDATED_FILE_NAME, ResultAssembler};
pub use batch::{BatchOutcome, BatchReporter, BatchRunner, BatchSummary, TracingBatchReporter};
pub use caller::ExtractionCaller;
pub use config::ExtractionConfig;
pub use credentials::CredentialPool;
pub use error::{AppError, ErrorCategory, ErrorPolicy};
pub use models::{
    Credential, ExtractionRequest, ExtractionResult, ExtractionStatus, FailureDetail, FileInput,
    OutputBundle, OutputDocument, OutputMode,
};
pub use orchestrator::PromptOrchestrator;
pub use prompt::Prompt;
pub use traits::{Cleaner, Generator, PlainText};
