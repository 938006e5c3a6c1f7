use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use sift_core::error::AppError;
use sift_core::models::Credential;
use sift_core::prompt::Prompt;
use sift_core::traits::Generator;

/// Gemini's OpenAI compatibility layer.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
/// Fallback order used when no model list is configured.
pub const DEFAULT_MODELS: &str =
    "gemini-2.5-flash-lite,gemini-2.0-flash,gemini-2.0-flash-lite,gemini-1.5-flash,gemini-1.5-flash-8b";
const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(120);

/// OpenAI-compatible chat completion client.
///
/// Works with any OpenAI-compatible API, including:
/// - Gemini via compatibility layer (`https://generativelanguage.googleapis.com/v1beta/openai`)
/// - OpenAI directly (`https://api.openai.com/v1`)
///
/// The API key and model come from the [`Credential`] of each call, so one
/// client serves the whole credential pool.
#[derive(Clone)]
pub struct OpenAiGenerator {
    client: Client,
    base_url: String,
    timeout_secs: u64,
}

impl OpenAiGenerator {
    pub fn new() -> Result<Self, AppError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, AppError> {
        Self::build(base_url, DEFAULT_LLM_TIMEOUT)
    }

    pub fn with_timeout(self, timeout: Duration) -> Result<Self, AppError> {
        Self::build(&self.base_url, timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_secs: timeout.as_secs(),
        })
    }
}

// ---- OpenAI API types ----

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
    /// Provider status string, e.g. Gemini's `RESOURCE_EXHAUSTED`.
    #[serde(default)]
    status: Option<String>,
}

/// Gemini sometimes wraps the error object in a one-element array.
#[derive(Deserialize)]
#[serde(untagged)]
enum ApiErrorBody {
    Single(ApiError),
    List(Vec<ApiError>),
}

fn chat_request<'a>(credential: &'a Credential, prompt: &'a Prompt) -> ChatRequest<'a> {
    ChatRequest {
        model: &credential.model,
        messages: vec![
            Message {
                role: "system",
                content: &prompt.system,
            },
            Message {
                role: "user",
                content: &prompt.user,
            },
        ],
    }
}

/// Human-readable message for a failed call, keeping the provider status.
fn error_message(status_code: u16, body: &str) -> String {
    let detail = match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(ApiErrorBody::Single(e)) => Some(e.error),
        Ok(ApiErrorBody::List(list)) => list.into_iter().next().map(|e| e.error),
        Err(_) => None,
    };

    match detail {
        Some(ApiErrorDetail {
            message,
            status: Some(status),
        }) => format!("{status}: {message}"),
        Some(ApiErrorDetail { message, .. }) => message,
        None => format!("HTTP {status_code}: {}", body.trim()),
    }
}

impl Generator for OpenAiGenerator {
    async fn generate(&self, credential: &Credential, prompt: &Prompt) -> Result<String, AppError> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&credential.key)
            .json(&chat_request(credential, prompt))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(self.timeout_secs)
                } else if e.is_connect() {
                    AppError::NetworkError(format!("Connection failed: {}", e))
                } else {
                    AppError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let status_code = status.as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::LlmError {
                message: error_message(status_code, &body),
                status_code,
            });
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to parse LLM response: {}", e)))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::MalformedOutput("Empty response from LLM".into()))
    }
}
