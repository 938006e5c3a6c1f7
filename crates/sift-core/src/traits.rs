use std::future::Future;

use crate::error::AppError;
use crate::models::Credential;
use crate::prompt::Prompt;

/// Sends one prompt to a remote text-generation service.
///
/// Implementations perform exactly one request with the given credential and
/// return the model's raw text. Retries and rotation belong to the caller.
pub trait Generator: Send + Sync + Clone {
    fn generate(
        &self,
        credential: &Credential,
        prompt: &Prompt,
    ) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Turns a raw input file into text the model can read.
///
/// `file_name` lets implementations dispatch on the extension.
pub trait Cleaner: Send + Sync + Clone {
    fn clean(&self, file_name: &str, raw: &[u8]) -> Result<String, AppError>;
}

/// A cleaner that accepts UTF-8 text as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainText;

impl Cleaner for PlainText {
    fn clean(&self, file_name: &str, raw: &[u8]) -> Result<String, AppError> {
        String::from_utf8(raw.to_vec())
            .map_err(|_| AppError::InvalidInput(format!("{file_name} is not valid UTF-8 text")))
    }
}
