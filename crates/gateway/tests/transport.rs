//! Transport bootstrap failures must surface before the listener binds.

use std::net::TcpListener;

use ng_domain::config::ServerConfig;
use ng_gateway::transport::{self, TransportError, CERT_FILE, KEY_FILE};

fn server_with_tls_dir(dir: &std::path::Path, port: u16) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".into(),
        port,
        tls_dir: Some(dir.to_path_buf()),
        ..ServerConfig::default()
    }
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[tokio::test]
async fn unreadable_certificate_aborts_before_bind() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(KEY_FILE), "not really a key").unwrap();
    let port = free_port();

    let err = match transport::prepare(&server_with_tls_dir(dir.path(), port)).await {
        Err(e) => e,
        Ok(_) => panic!("transport prepared without a certificate"),
    };
    match &err {
        TransportError::Unreadable { path, .. } => assert!(path.ends_with(CERT_FILE)),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains(CERT_FILE));

    // Nothing holds the port.
    TcpListener::bind(("127.0.0.1", port)).unwrap();
}

#[tokio::test]
async fn garbage_pem_is_invalid_tls() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(KEY_FILE), "garbage").unwrap();
    std::fs::write(dir.path().join(CERT_FILE), "garbage").unwrap();

    let result = transport::prepare(&server_with_tls_dir(dir.path(), free_port())).await;
    assert!(matches!(result, Err(TransportError::InvalidTls(_))));
}

#[tokio::test]
async fn plain_transport_serves_http() {
    let server = ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        ..ServerConfig::default()
    };
    let prepared = transport::prepare(&server).await.unwrap();
    assert_eq!(prepared.scheme(), "http");

    let bound = transport::bind(prepared, "127.0.0.1:0").await.unwrap();
    let addr = bound.local_addr().unwrap();
    let shutdown = tokio_util::sync::CancellationToken::new();
    let app = axum::Router::new().route("/", axum::routing::get(|| async { "up" }));
    let task = tokio::spawn(bound.serve(app, shutdown.clone()));

    let body = reqwest::get(format!("http://{addr}/"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "up");

    shutdown.cancel();
    task.await.unwrap().unwrap();
}
