use serde::Serialize;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Multipart body of `POST /v1/extract`. Documentation only; the handler
/// reads the fields one by one.
#[derive(Debug, utoipa::ToSchema)]
pub struct ExtractForm {
    /// Comma-separated upstream API keys (forwarded, never stored)
    pub api_key: String,
    /// Extraction instructions used verbatim
    pub prompt: Option<String>,
    /// Plain-language goal refined into instructions (alternative to `prompt`)
    pub user_goal: Option<String>,
    /// one_per_file, one_per_relevant_file (default) or single_file
    pub output_method: Option<String>,
    /// Comma-separated model list (defaults to the server's list)
    pub models: Option<String>,
    /// Input files, repeated
    #[schema(value_type = Vec<String>, format = Binary)]
    pub files: Vec<Vec<u8>>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
