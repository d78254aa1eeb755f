//! Integration tests for the backend collaborators: the HTTP command client
//! against an in-process stub node, and the log tailer against a real file.

use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use ng_backend::{BackendClient, BackendError, EventHub, HttpBackend, LogTailer};
use ng_domain::config::BackendConfig;
use ng_protocol::Topic;

// ── Stub node ───────────────────────────────────────────────────────────

async fn start_stub_node() -> SocketAddr {
    let app = Router::new()
        .route("/v1/getinfo", get(|| async { Json(json!({ "alias": "stub" })) }))
        .route(
            "/v1/:method",
            post(|Path(method): Path<String>, Json(body): Json<Value>| async move {
                match method.as_str() {
                    "fail" => Err((StatusCode::BAD_REQUEST, "no such invoice")),
                    _ => Ok(Json(json!({ "method": method, "echo": body }))),
                }
            }),
        );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn backend_for(addr: SocketAddr) -> HttpBackend {
    HttpBackend::from_config(&BackendConfig {
        host: addr.to_string(),
        request_timeout_secs: 5,
        ..BackendConfig::default()
    })
    .unwrap()
}

// ── HttpBackend ─────────────────────────────────────────────────────────

#[tokio::test]
async fn forwards_command_with_params() {
    let addr = start_stub_node().await;
    let backend = backend_for(addr);

    let out = backend
        .call("addinvoice", json!({ "value": 1000 }))
        .await
        .unwrap();
    assert_eq!(out["method"], "addinvoice");
    assert_eq!(out["echo"]["value"], 1000);
}

#[tokio::test]
async fn missing_params_send_empty_object() {
    let addr = start_stub_node().await;
    let out = backend_for(addr).call("listpeers", Value::Null).await.unwrap();
    assert_eq!(out["echo"], json!({}));
}

#[tokio::test]
async fn node_errors_are_rejections() {
    let addr = start_stub_node().await;
    let err = backend_for(addr).call("fail", json!({})).await.unwrap_err();
    match err {
        BackendError::Rejected { status, message, .. } => {
            assert_eq!(status, 400);
            assert_eq!(message, "no such invoice");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn ping_reaches_stub() {
    let addr = start_stub_node().await;
    backend_for(addr).ping().await.unwrap();
}

#[tokio::test]
async fn unreachable_node_is_connectivity_error() {
    // Bind then drop to get a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = backend_for(addr).ping().await.unwrap_err();
    assert!(err.is_connectivity(), "got {err:?}");
}

#[tokio::test]
async fn invalid_method_never_leaves_process() {
    let addr = start_stub_node().await;
    let err = backend_for(addr).call("../admin", json!({})).await.unwrap_err();
    assert!(matches!(err, BackendError::InvalidMethod(_)));
}

// ── LogTailer ───────────────────────────────────────────────────────────

#[tokio::test]
async fn tails_appended_lines_only() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "2024-03-01 09:59:59.000 [INF] LTND: before start").unwrap();
    file.flush().unwrap();

    let hub = Arc::new(EventHub::new(32));
    let mut sub = hub.subscribe();
    let cancel = CancellationToken::new();
    let tailer = LogTailer::new(
        file.path(),
        Duration::from_millis(20),
        ["INF".to_string(), "ERR".to_string()],
        hub.clone(),
    );
    let task = tokio::spawn(tailer.run(cancel.clone()));

    // Let the tailer record the starting offset.
    tokio::time::sleep(Duration::from_millis(60)).await;
    writeln!(file, "2024-03-01 10:00:00.000 [ERR] RPCS: after start").unwrap();
    file.flush().unwrap();

    let raw = tokio::time::timeout(Duration::from_secs(2), sub.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(raw.topic, Topic::RawLog);
    assert_eq!(raw.payload["line"], "2024-03-01 10:00:00.000 [ERR] RPCS: after start");

    let parsed = tokio::time::timeout(Duration::from_secs(2), sub.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(parsed.topic, Topic::Log);
    assert_eq!(parsed.payload["level"], "ERR");

    cancel.cancel();
    task.await.unwrap();
}
