use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use sift_server::archive;
use sift_server::routes::SUMMARY_HEADER;

use crate::common::{
    EXHAUSTED_KEY, Form, TEST_SERVER_TOKEN, setup_test_app, setup_test_app_no_auth, three_files,
};

fn extract_request(form: Form) -> Request<Body> {
    Request::post("/v1/extract")
        .header(header::CONTENT_TYPE, Form::content_type())
        .body(Body::from(form.finish()))
        .unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

async fn json_body(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn summary(response: &Response) -> String {
    response.headers()[SUMMARY_HEADER]
        .to_str()
        .unwrap()
        .to_string()
}

async fn archive_entries(response: Response) -> Vec<(String, Value)> {
    let bytes = body_bytes(response).await;
    archive::entries(&bytes)
        .unwrap()
        .into_iter()
        .map(|(name, data)| (name, serde_json::from_slice(&data).unwrap()))
        .collect()
}

#[tokio::test]
async fn health_returns_200() {
    let app = setup_test_app().await;

    let response = app
        .router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn unauthenticated_request_returns_401() {
    let app = setup_test_app().await;

    let form = three_files(Form::new().text("api_key", "k1").text("prompt", "Find orders."));
    let response = app.router.oneshot(extract_request(form)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.upstream.extraction_calls(), 0);
}

#[tokio::test]
async fn wrong_server_token_returns_401() {
    let app = setup_test_app().await;

    let mut request = extract_request(Form::new().text("api_key", "k1"));
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, "Bearer wrong-token".parse().unwrap());
    let response = app.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn valid_server_token_reaches_handler() {
    let app = setup_test_app().await;

    let form = three_files(Form::new().text("api_key", "k1").text("prompt", "Find orders."));
    let mut request = extract_request(form);
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {TEST_SERVER_TOKEN}").parse().unwrap(),
    );
    let response = app.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_api_key_returns_400() {
    let app = setup_test_app_no_auth().await;

    let form = three_files(Form::new().text("prompt", "Find orders."));
    let response = app.router.oneshot(extract_request(form)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"], "invalid_request");
    assert!(json["message"].as_str().unwrap().contains("api_key"));
}

#[tokio::test]
async fn prompt_and_goal_together_returns_400() {
    let app = setup_test_app_no_auth().await;

    let form = three_files(
        Form::new()
            .text("api_key", "k1")
            .text("prompt", "Find orders.")
            .text("user_goal", "orders"),
    );
    let response = app.router.oneshot(extract_request(form)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_output_method_returns_400() {
    let app = setup_test_app_no_auth().await;

    let form = three_files(
        Form::new()
            .text("api_key", "k1")
            .text("prompt", "Find orders.")
            .text("output_method", "zip_everything"),
    );
    let response = app.router.oneshot(extract_request(form)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn too_many_files_returns_400() {
    let app = setup_test_app_no_auth().await;

    let mut form = Form::new().text("api_key", "k1").text("prompt", "Find orders.");
    for i in 0..6 {
        form = form.file(&format!("f{i}.txt"), "ORDER 42");
    }
    let response = app.router.oneshot(extract_request(form)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.upstream.extraction_calls(), 0);
}

#[tokio::test]
async fn default_mode_returns_only_relevant_documents() {
    let app = setup_test_app_no_auth().await;

    let form = three_files(Form::new().text("api_key", "k1").text("prompt", "Find orders."));
    let response = app.router.oneshot(extract_request(form)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=extraction_results.zip"
    );
    let summary = summary(&response);
    assert!(summary.starts_with("total=3 relevant=1 not_relevant=1 failed=1"));
    assert!(summary.contains("malformed_output=1"));

    let entries = archive_entries(response).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, "a.json");
    assert_eq!(entries[0].1["extracted_data"]["order"], 42);
    assert_eq!(entries[0].1["metadata"]["source_file"], "a.txt");
}

#[tokio::test]
async fn one_per_file_keeps_input_order_and_failures() {
    let app = setup_test_app_no_auth().await;

    let form = three_files(
        Form::new()
            .text("api_key", "k1")
            .text("prompt", "Find orders.")
            .text("output_method", "one_per_file"),
    );
    let response = app.router.oneshot(extract_request(form)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let entries = archive_entries(response).await;
    let names: Vec<_> = entries.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["a.json", "b.json", "c.json"]);
    assert!(entries[1].1["extracted_data"].is_null());
    assert_eq!(entries[2].1["metadata"]["status"], "failed");
    assert_eq!(
        entries[2].1["metadata"]["error"]["category"],
        "malformed_output"
    );
}

#[tokio::test]
async fn single_file_consolidates_relevant_data() {
    let app = setup_test_app_no_auth().await;

    let form = three_files(
        Form::new()
            .text("api_key", "k1")
            .text("prompt", "Find orders.")
            .text("output_method", "single_file"),
    );
    let response = app.router.oneshot(extract_request(form)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let entries = archive_entries(response).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, "consolidated_results.json");
    let doc = &entries[0].1;
    assert_eq!(doc["metadata"]["total_files_processed"], 3);
    assert_eq!(doc["metadata"]["files_with_data"], 1);
    assert_eq!(doc["extracted_data"][0]["source_file"], "a.txt");
}

#[tokio::test]
async fn user_goal_is_refined_before_extraction() {
    let app = setup_test_app_no_auth().await;

    let form = Form::new()
        .text("api_key", "k1")
        .text("user_goal", "I want my order numbers")
        .file("a.txt", "Your ORDER 42 has shipped.");
    let response = app.router.oneshot(extract_request(form)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.upstream.refine_calls(), 1);
    assert_eq!(app.upstream.extraction_calls(), 1);
    let entries = archive_entries(response).await;
    assert_eq!(entries[0].1["extracted_data"]["order"], 42);
}

#[tokio::test]
async fn rate_limited_key_rotates_to_next() {
    let app = setup_test_app_no_auth().await;

    let form = Form::new()
        .text("api_key", &format!("{EXHAUSTED_KEY},k2"))
        .text("prompt", "Find orders.")
        .file("a.txt", "Your ORDER 42 has shipped.");
    let response = app.router.oneshot(extract_request(form)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(summary(&response).starts_with("total=1 relevant=1"));
}

#[tokio::test]
async fn exhausted_pool_is_reported_per_file() {
    let app = setup_test_app_no_auth().await;

    let form = three_files(
        Form::new()
            .text("api_key", EXHAUSTED_KEY)
            .text("prompt", "Find orders.")
            .text("output_method", "one_per_file"),
    );
    let response = app.router.oneshot(extract_request(form)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let summary = summary(&response);
    assert!(summary.contains("failed=3"));
    assert!(summary.contains("pool_exhausted=3"));

    let entries = archive_entries(response).await;
    assert_eq!(entries.len(), 3);
    for (_, doc) in &entries {
        assert_eq!(doc["metadata"]["error"]["category"], "pool_exhausted");
    }
}

#[tokio::test]
async fn exhausted_pool_during_refinement_returns_429() {
    let app = setup_test_app_no_auth().await;

    let form = three_files(
        Form::new()
            .text("api_key", EXHAUSTED_KEY)
            .text("user_goal", "orders"),
    );
    let response = app.router.oneshot(extract_request(form)).await.unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let json = json_body(response).await;
    assert_eq!(json["error"], "pool_exhausted");
    assert_eq!(app.upstream.extraction_calls(), 0);
}

#[tokio::test]
async fn shutdown_marks_unstarted_files_cancelled() {
    let app = setup_test_app_no_auth().await;
    app.state.shutdown.cancel();

    let form = three_files(
        Form::new()
            .text("api_key", "k1")
            .text("prompt", "Find orders.")
            .text("output_method", "one_per_file"),
    );
    let response = app.router.oneshot(extract_request(form)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(summary(&response).contains("cancelled=3"));
    assert_eq!(app.upstream.extraction_calls(), 0);

    let entries = archive_entries(response).await;
    assert_eq!(entries.len(), 3);
    for (_, doc) in &entries {
        assert_eq!(doc["metadata"]["error"]["category"], "cancelled");
    }
}
