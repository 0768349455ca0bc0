#![cfg(unix)]

use std::{fs, os::unix::fs::PermissionsExt, path::PathBuf, time::Duration};

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use mcptex::application::compile::{CompileService, JobRunner, RunnerConfig};
use mcptex::infra::{
    http::{HttpState, build_router},
    mcp::McpServer,
};

const FAKE_TEX: &str = r#"#!/bin/sh
out=""
for arg in "$@"; do
  case "$arg" in
    -output-directory=*) out="${arg#-output-directory=}" ;;
  esac
done
doc=$(cat)
case "$doc" in
  *FAIL*) echo "! LaTeX Error: broken"; exit 1 ;;
esac
printf '%%PDF-1.4 fake' > "$out/texput.pdf"
"#;

struct TestServer {
    _root: TempDir,
    output_dir: PathBuf,
    router: Router,
}

impl TestServer {
    fn new() -> Self {
        let root = TempDir::new().expect("temp dir");
        let compiler = root.path().join("fake-xelatex");
        fs::write(&compiler, FAKE_TEX).expect("write fake compiler");
        let mut perms = fs::metadata(&compiler).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&compiler, perms).expect("set perms");

        let output_dir = root.path().join("output");
        let runner = JobRunner::new(RunnerConfig {
            compiler,
            output_dir: output_dir.clone(),
            timeout: Duration::from_secs(20),
            max_output_bytes: 64 * 1024,
        });
        let mcp = McpServer::new(CompileService::new(runner, 2));
        let router = build_router(HttpState { mcp }, 1024 * 1024);

        Self {
            _root: root,
            output_dir,
            router,
        }
    }

    async fn post(&self, body: impl Into<Body>) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/mcp")
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .expect("request");
        let response = self.router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes()
            .to_vec();
        (status, bytes)
    }

    async fn post_json(&self, value: Value) -> (StatusCode, Value) {
        let (status, bytes) = self.post(value.to_string()).await;
        let value = serde_json::from_slice(&bytes).expect("json body");
        (status, value)
    }

    async fn call_tool(&self, arguments: Value) -> Value {
        let (status, body) = self
            .post_json(json!({
                "jsonrpc": "2.0",
                "id": 10,
                "method": "tools/call",
                "params": {"name": "convert_latex_to_pdf", "arguments": arguments}
            }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], 10);
        body["result"].clone()
    }
}

#[tokio::test]
async fn initialize_over_http() {
    let server = TestServer::new();
    let (status, body) = server
        .post_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": {"name": "test", "version": "0"}
            }
        }))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["jsonrpc"], "2.0");
    assert_eq!(body["result"]["serverInfo"]["name"], "MCPTex");
    assert_eq!(body["result"]["protocolVersion"], "2025-03-26");
}

#[tokio::test]
async fn successful_conversion_returns_base64_resource() {
    let server = TestServer::new();
    let result = server
        .call_tool(json!({"document": "\\documentclass{article}", "options": ["-etex"]}))
        .await;

    assert!(result.get("isError").is_none_or(|flag| flag == false));
    let content = result["content"].as_array().expect("content array");
    assert_eq!(content.len(), 2);
    assert_eq!(content[0]["type"], "text");
    let location = content[0]["text"].as_str().expect("location");
    assert!(location.ends_with("texput.pdf"));

    let resource = &content[1]["resource"];
    assert_eq!(content[1]["type"], "resource");
    assert_eq!(resource["uri"], location);
    assert_eq!(resource["mimeType"], "application/pdf");
    let blob = STANDARD
        .decode(resource["blob"].as_str().expect("blob"))
        .expect("base64");
    assert_eq!(blob, b"%PDF-1.4 fake");

    let leftovers = fs::read_dir(&server.output_dir).expect("output dir").count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn failed_conversion_is_tool_error() {
    let server = TestServer::new();
    let result = server.call_tool(json!({"document": "\\FAIL"})).await;

    assert_eq!(result["isError"], true);
    let text = result["content"][0]["text"].as_str().expect("text");
    assert!(text.starts_with("Failed to convert LaTeX to PDF: "));
    assert!(text.contains("LaTeX Error: broken"));
}

#[tokio::test]
async fn missing_document_is_tool_error() {
    let server = TestServer::new();
    let result = server.call_tool(json!({"options": ["-etex"]})).await;

    assert_eq!(result["isError"], true);
    assert_eq!(
        result["content"][0]["text"],
        "required argument \"document\" not found"
    );
}

#[tokio::test]
async fn notification_only_payload_is_accepted_without_body() {
    let server = TestServer::new();
    let (status, body) = server
        .post(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string())
        .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body.is_empty());
}

#[tokio::test]
async fn malformed_json_is_bad_request_with_parse_error() {
    let server = TestServer::new();
    let (status, body) = server.post("{\"jsonrpc\":").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body).expect("json body");
    assert_eq!(body["error"]["code"], -32700);
    assert_eq!(body["id"], Value::Null);
}

#[tokio::test]
async fn batch_over_http_returns_array() {
    let server = TestServer::new();
    let (status, body) = server
        .post_json(json!([
            {"jsonrpc": "2.0", "id": 1, "method": "ping"},
            {"jsonrpc": "2.0", "id": 2, "method": "tools/list"}
        ]))
        .await;

    assert_eq!(status, StatusCode::OK);
    let responses = body.as_array().expect("batch array");
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[1]["result"]["tools"][0]["name"], "convert_latex_to_pdf");
}

#[tokio::test]
async fn unsupported_http_methods_are_rejected() {
    let server = TestServer::new();
    for method in [Method::GET, Method::DELETE] {
        let request = Request::builder()
            .method(method.clone())
            .uri("/mcp")
            .body(Body::empty())
            .expect("request");
        let response = server.router.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{method}");
    }
}

#[tokio::test]
async fn health_reports_version() {
    let server = TestServer::new();
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .expect("request");
    let response = server.router.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    let body: Value = serde_json::from_slice(&bytes).expect("json body");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}
