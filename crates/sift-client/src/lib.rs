pub mod cleaner;
pub mod email;
pub mod llm;

pub use cleaner::{ContentCleaner, HtmdCleaner};
pub use llm::{DEFAULT_BASE_URL, DEFAULT_MODELS, OpenAiGenerator};
