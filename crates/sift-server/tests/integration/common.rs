use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use sift_core::config::ExtractionConfig;
use sift_core::retry::BackoffConfig;
use sift_server::config::ServerConfig;
use sift_server::routes;
use sift_server::state::AppState;

pub const TEST_SERVER_TOKEN: &str = "test-server-token";
pub const EXHAUSTED_KEY: &str = "exhausted-key";
pub const BOUNDARY: &str = "sift-test-boundary";
pub const REFINED_INSTRUCTIONS: &str = "Extract the order number as {\"order\": <number>}.";

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub upstream: FakeUpstream,
}

/// Counts of calls seen by the fake upstream.
#[derive(Clone, Default)]
pub struct FakeUpstream {
    pub base_url: String,
    extraction_calls: Arc<AtomicUsize>,
    refine_calls: Arc<AtomicUsize>,
}

impl FakeUpstream {
    pub fn extraction_calls(&self) -> usize {
        self.extraction_calls.load(Ordering::SeqCst)
    }

    pub fn refine_calls(&self) -> usize {
        self.refine_calls.load(Ordering::SeqCst)
    }
}

/// OpenAI-compatible stand-in. Replies depend on the file text:
/// `ORDER 42` yields data, `newsletter` yields null, `garbage` never
/// yields JSON. The key `exhausted-key` is always rate limited.
async fn chat_completions(
    upstream: FakeUpstream,
    headers: HeaderMap,
    body: Value,
) -> (StatusCode, axum::Json<Value>) {
    let key = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default();

    if key == EXHAUSTED_KEY {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            axum::Json(json!({
                "error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}
            })),
        );
    }

    let system = body["messages"][0]["content"].as_str().unwrap_or_default();
    let user = body["messages"][1]["content"].as_str().unwrap_or_default();

    let reply = if system.starts_with("You are an expert prompt engineer") {
        upstream.refine_calls.fetch_add(1, Ordering::SeqCst);
        REFINED_INSTRUCTIONS.to_string()
    } else {
        upstream.extraction_calls.fetch_add(1, Ordering::SeqCst);
        if user.contains("ORDER 42") {
            "```json\n{\"order\": 42}\n```".to_string()
        } else if user.contains("newsletter") {
            "null".to_string()
        } else {
            "Sorry, I cannot help with that.".to_string()
        }
    };

    (
        StatusCode::OK,
        axum::Json(json!({
            "choices": [{"message": {"role": "assistant", "content": reply}}]
        })),
    )
}

async fn spawn_upstream() -> FakeUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let upstream = FakeUpstream {
        base_url: format!("http://{addr}"),
        ..FakeUpstream::default()
    };

    let handler_state = upstream.clone();
    let app = Router::new().route(
        "/chat/completions",
        post(move |headers: HeaderMap, axum::Json(body): axum::Json<Value>| {
            chat_completions(handler_state.clone(), headers, body)
        }),
    );
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    upstream
}

fn test_config(base_url: &str, server_token: Option<&str>) -> ServerConfig {
    let mut extraction = ExtractionConfig::default()
        .with_call_timeout(Duration::from_secs(5))
        .with_max_concurrency(2);
    extraction.quota_delay = Duration::ZERO;
    extraction.backoff = BackoffConfig::none();

    ServerConfig {
        server_token: server_token.map(str::to_string),
        default_models: "test-model".to_string(),
        base_url: base_url.to_string(),
        max_files: 5,
        extraction,
        ..ServerConfig::default()
    }
}

/// App with the bearer gate enabled.
pub async fn setup_test_app() -> TestApp {
    build(Some(TEST_SERVER_TOKEN)).await
}

/// App without a server token: `/v1` routes are open.
pub async fn setup_test_app_no_auth() -> TestApp {
    build(None).await
}

async fn build(server_token: Option<&str>) -> TestApp {
    let upstream = spawn_upstream().await;
    let state = Arc::new(AppState::new(test_config(&upstream.base_url, server_token)).unwrap());
    TestApp {
        router: routes::router(state.clone()),
        state,
        upstream,
    }
}

/// Minimal `multipart/form-data` body builder.
#[derive(Default)]
pub struct Form {
    body: Vec<u8>,
}

impl Form {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, file_name: &str, content: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n{content}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn content_type() -> String {
        format!("multipart/form-data; boundary={BOUNDARY}")
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.body
    }
}

/// The three-file batch: relevant, not relevant, never parseable.
pub fn three_files(form: Form) -> Form {
    form.file("a.txt", "Your ORDER 42 has shipped.")
        .file("b.txt", "Our monthly newsletter is here.")
        .file("c.txt", "garbage")
}
