//! Web tool tests against a local axum fixture.

use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use toolhub_core::dispatch::{CallRequest, CallResult, FailureKind};
use toolhub_core::{Config, ToolServer};

const PAGE: &str = r#"<html>
<head>
  <title>Fixture Page</title>
  <meta name="description" content="Served by the test fixture">
</head>
<body>
  <h1>Welcome</h1>
  <p>Plain   text body.</p>
  <script>ignored()</script>
  <a href="/docs/guide.txt" title="Guide">Read the guide</a>
</body>
</html>"#;

async fn start_fixture() -> SocketAddr {
    let app = Router::new()
        .route("/page", get(|| async { Html(PAGE) }))
        .route(
            "/posts",
            get(|| async {
                Json(json!([
                    {"id": 1, "title": "Rust ownership", "body": "Borrowing rules explained"},
                    {"id": 2, "title": "Async runtimes", "body": "Tokio and RUST in production"},
                    {"id": 3, "title": "Gardening", "body": "Tomatoes in spring"}
                ]))
            }),
        )
        .route("/docs/guide.txt", get(|| async { "step one\nstep two\n" }))
        .route("/big", get(|| async { "x".repeat(4096) }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

fn server(root: &Path, addr: SocketAddr, max_response_bytes: usize) -> Arc<ToolServer> {
    let mut config = Config::default();
    config.sandbox.allowed_roots = vec![root.to_path_buf()];
    config.web.search_endpoint = format!("http://{addr}/posts");
    config.web.allowed_hosts = vec!["127.0.0.1".to_string()];
    config.web.max_response_bytes = max_response_bytes;
    config.rate_limit.max_calls = 100;
    Arc::new(ToolServer::from_config(&config).unwrap())
}

fn payload(result: CallResult) -> Value {
    match result {
        CallResult::Success(payload) => payload,
        CallResult::Failure(failure) => panic!("call failed: {failure}"),
    }
}

#[tokio::test]
async fn test_fetch_webpage_extracts_summary_and_links() {
    let addr = start_fixture().await;
    let dir = tempfile::tempdir().unwrap();
    let server = server(dir.path(), addr, 1024 * 1024);

    let page = payload(
        server
            .call_tool(CallRequest::new(
                "fetch_webpage",
                json!({"url": format!("http://{addr}/page"), "extract_links": true}),
            ))
            .await,
    );

    assert_eq!(page["status_code"], 200);
    assert_eq!(page["title"], "Fixture Page");
    assert_eq!(page["description"], "Served by the test fixture");
    let text = page["text_content"].as_str().unwrap();
    assert!(text.contains("Plain text body."));
    assert!(!text.contains("ignored()"));
    assert_eq!(page["links"][0]["url"], format!("http://{addr}/docs/guide.txt"));
    assert_eq!(page["html_content"], Value::Null);
}

#[tokio::test]
async fn test_search_web_filters_case_insensitively() {
    let addr = start_fixture().await;
    let dir = tempfile::tempdir().unwrap();
    let server = server(dir.path(), addr, 1024 * 1024);

    let found = payload(
        server
            .call_tool(CallRequest::new("search_web", json!({"query": "rust", "max_results": 1})))
            .await,
    );
    assert_eq!(found["total_found"], 2);
    assert_eq!(found["results_returned"], 1);
    assert_eq!(found["results"][0]["title"], "Rust ownership");
    assert_eq!(found["results"][0]["url"], format!("http://{addr}/posts/1"));

    let out_of_range = server
        .call_tool(CallRequest::new("search_web", json!({"query": "rust", "max_results": 99})))
        .await;
    assert_eq!(out_of_range.failure().unwrap().subtype(), Some("OutOfRange"));
}

#[tokio::test]
async fn test_download_file_lands_in_first_root() {
    let addr = start_fixture().await;
    let dir = tempfile::tempdir().unwrap();
    let server = server(dir.path(), addr, 1024 * 1024);

    let saved = payload(
        server
            .call_tool(CallRequest::new(
                "download_file",
                json!({"url": format!("http://{addr}/docs/guide.txt")}),
            ))
            .await,
    );
    assert_eq!(saved["filename"], "guide.txt");
    assert_eq!(saved["size"], 18);
    let written = std::fs::read_to_string(dir.path().join("guide.txt")).unwrap();
    assert_eq!(written, "step one\nstep two\n");
}

#[tokio::test]
async fn test_download_file_refuses_disallowed_names() {
    let addr = start_fixture().await;
    let dir = tempfile::tempdir().unwrap();
    let server = server(dir.path(), addr, 1024 * 1024);

    let bad_extension = server
        .call_tool(CallRequest::new(
            "download_file",
            json!({"url": format!("http://{addr}/page"), "filename": "payload.exe"}),
        ))
        .await;
    assert_eq!(bad_extension.failure().unwrap().kind(), FailureKind::SecurityViolation);

    let nested = server
        .call_tool(CallRequest::new(
            "download_file",
            json!({"url": format!("http://{addr}/page"), "filename": "../escape.txt"}),
        ))
        .await;
    assert_eq!(nested.failure().unwrap().subtype(), Some("InvalidInput"));
    assert!(!dir.path().join("payload.exe").exists());
}

#[tokio::test]
async fn test_oversized_response_is_rejected() {
    let addr = start_fixture().await;
    let dir = tempfile::tempdir().unwrap();
    let server = server(dir.path(), addr, 1024);

    let result = server
        .call_tool(CallRequest::new("fetch_webpage", json!({"url": format!("http://{addr}/big")})))
        .await;
    let failure = result.failure().unwrap();
    assert_eq!(failure.kind(), FailureKind::HandlerError);
    assert!(failure.message().contains("too large"));
}

#[tokio::test]
async fn test_non_http_scheme_is_invalid_input() {
    let addr = start_fixture().await;
    let dir = tempfile::tempdir().unwrap();
    let server = server(dir.path(), addr, 1024);

    let result = server
        .call_tool(CallRequest::new("fetch_webpage", json!({"url": "ftp://127.0.0.1/file"})))
        .await;
    assert_eq!(result.failure().unwrap().subtype(), Some("InvalidInput"));
}
