use std::sync::Arc;

use axum::Router;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderValue, header};
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use sift_core::batch::{BatchRunner, TracingBatchReporter};
use sift_core::caller::ExtractionCaller;
use sift_core::credentials::CredentialPool;
use sift_core::error::AppError;
use sift_core::models::{FileInput, OutputMode};
use sift_core::{PromptOrchestrator, ResultAssembler};

use crate::archive;
use crate::auth::require_api_key;
use crate::dto::{ErrorResponse, ExtractForm, HealthResponse};
use crate::error::ApiError;
use crate::openapi::ApiDoc;
use crate::state::AppState;

pub const ARCHIVE_FILE_NAME: &str = "extraction_results.zip";
pub const SUMMARY_HEADER: &str = "x-sift-summary";

/// Build the full router with all routes and middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_bytes;

    let api = Router::new()
        .route("/v1/extract", post(extract))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    let public = Router::new()
        .route("/health", get(health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    public.merge(api).with_state(state)
}

// ---------------------------------------------------------------------------
// Extract
// ---------------------------------------------------------------------------

/// Fields collected from the multipart body.
#[derive(Default)]
struct ExtractUpload {
    api_key: Option<String>,
    prompt: Option<String>,
    user_goal: Option<String>,
    output_method: Option<String>,
    models: Option<String>,
    files: Vec<FileInput>,
}

impl ExtractUpload {
    async fn read(mut multipart: Multipart, max_files: usize) -> Result<Self, AppError> {
        let mut upload = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "files" | "files[]" => {
                    if upload.files.len() >= max_files {
                        return Err(AppError::InvalidInput(format!(
                            "too many files: at most {max_files} per request"
                        )));
                    }
                    let file_name = field
                        .file_name()
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("upload-{}", upload.files.len() + 1));
                    let bytes = field.bytes().await.map_err(bad_multipart)?;
                    upload.files.push(FileInput::new(file_name, bytes.to_vec()));
                }
                "api_key" | "prompt" | "user_goal" | "output_method" | "models" => {
                    let text = field.text().await.map_err(bad_multipart)?;
                    let value = Some(text).filter(|v| !v.trim().is_empty());
                    match name.as_str() {
                        "api_key" => upload.api_key = value,
                        "prompt" => upload.prompt = value,
                        "user_goal" => upload.user_goal = value,
                        "output_method" => upload.output_method = value,
                        _ => upload.models = value,
                    }
                }
                other => tracing::debug!(field = other, "Ignoring unknown form field"),
            }
        }

        Ok(upload)
    }

    fn output_mode(&self) -> Result<OutputMode, AppError> {
        match self.output_method.as_deref() {
            None => Ok(OutputMode::OnePerRelevantFile),
            Some(raw) => raw
                .parse()
                .map_err(|e: AppError| AppError::InvalidInput(e.to_string())),
        }
    }
}

fn bad_multipart(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::InvalidInput(format!("Invalid multipart body: {}", e.body_text()))
}

#[utoipa::path(
    post,
    path = "/v1/extract",
    request_body(content = ExtractForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "zip archive of JSON results", content_type = "application/zip"),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 429, description = "Every credential is rate limited", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "extract"
)]
pub async fn extract(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let upload = ExtractUpload::read(multipart, state.config.max_files).await?;
    let mode = upload.output_mode()?;

    let api_key = upload
        .api_key
        .as_deref()
        .ok_or_else(|| AppError::InvalidInput("api_key is required".into()))?;
    if upload.files.is_empty() {
        return Err(AppError::InvalidInput("at least one file is required".into()).into());
    }

    let models = upload
        .models
        .as_deref()
        .unwrap_or(&state.config.default_models);
    let pool = CredentialPool::from_lists(api_key, models)
        .map_err(|e| AppError::InvalidInput(e.to_string()))?;

    let caller = ExtractionCaller::new(
        state.generator.clone(),
        state.cleaner.clone(),
        pool,
        state.config.extraction.clone(),
    );

    // Unstarted files come back as `cancelled` once the server shuts down.
    let cancel = state.shutdown.child_token();
    let instructions = match (upload.prompt.as_deref(), upload.user_goal.as_deref()) {
        (Some(prompt), None) => prompt.to_string(),
        (None, Some(goal)) => PromptOrchestrator::new(caller.clone())
            .refine_with_cancel(goal, &cancel)
            .await?,
        (Some(_), Some(_)) => {
            return Err(
                AppError::InvalidInput("send either prompt or user_goal, not both".into()).into(),
            );
        }
        (None, None) => {
            return Err(AppError::InvalidInput("prompt or user_goal is required".into()).into());
        }
    };

    let runner = BatchRunner::new(caller);
    let outcome = runner
        .run(
            upload.files,
            &instructions,
            &cancel,
            &TracingBatchReporter,
        )
        .await?;

    let bundle = ResultAssembler::new(mode).assemble(&outcome.results);
    let body = archive::zip_bundle(&bundle)?;

    tracing::info!(
        batch_id = %outcome.batch_id,
        mode = %mode,
        documents = bundle.len(),
        summary = %outcome.summary,
        "Extraction served"
    );

    let summary = HeaderValue::from_str(&outcome.summary.to_string())
        .map_err(|e| AppError::Generic(format!("Invalid summary header: {e}")))?;
    let disposition = format!("attachment; filename={ARCHIVE_FILE_NAME}");

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/zip")),
            (
                header::CONTENT_DISPOSITION,
                HeaderValue::from_str(&disposition)
                    .map_err(|e| AppError::Generic(e.to_string()))?,
            ),
            (header::HeaderName::from_static(SUMMARY_HEADER), summary),
        ],
        body,
    ))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health() -> impl IntoResponse {
    axum::Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}
