//! Shared harness: boots the full pipeline on an ephemeral port with an
//! in-memory backend and a scripted login provider.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::routing::get;
use base64::Engine;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use ng_backend::{BackendClient, BackendError};
use ng_domain::config::{Config, CredentialConfig};
use ng_gateway::login::{LoginError, LoginRelay};
use ng_gateway::state::AppState;
use ng_gateway::{api, bootstrap, routes};
use ng_sessions::Identity;

// ── In-memory backend ───────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeNode {
    pub calls: AtomicUsize,
    pub down: AtomicBool,
}

#[async_trait]
impl BackendClient for FakeNode {
    async fn call(&self, method: &str, params: Value) -> Result<Value, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("connection refused".into()));
        }
        Ok(json!({ "method": method, "params": params, "alias": "test-node" }))
    }

    async fn ping(&self) -> Result<(), BackendError> {
        if self.down.load(Ordering::SeqCst) {
            Err(BackendError::Unavailable("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

// ── Scripted login provider ─────────────────────────────────────────────

pub struct FakeProvider;

#[async_trait]
impl LoginRelay for FakeProvider {
    fn authorize_url(&self, provider: &str, state: &str) -> Result<String, LoginError> {
        if provider != "idp" {
            return Err(LoginError::UnknownProvider(provider.to_owned()));
        }
        Ok(format!("https://idp.example/authorize?state={state}"))
    }

    async fn exchange(&self, provider: &str, code: &str) -> Result<Identity, LoginError> {
        if code != "good-code" {
            return Err(LoginError::Exchange("bad code".into()));
        }
        Ok(Identity {
            provider: provider.to_owned(),
            subject: "user-42".into(),
            name: Some("Ada".into()),
        })
    }
}

// ── Harness ─────────────────────────────────────────────────────────────

pub struct Gateway {
    pub addr: SocketAddr,
    pub state: AppState,
    pub node: Arc<FakeNode>,
    _public: tempfile::TempDir,
}

impl Gateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

pub fn cred(user: &str, pass: &str) -> Option<CredentialConfig> {
    Some(CredentialConfig {
        username: user.into(),
        password: pass.into(),
    })
}

/// Full tier `admin:full-pw`, limited tier `viewer:view-pw`.
pub fn tiered_config() -> Config {
    let mut config = Config::default();
    config.auth.full = cred("admin", "full-pw");
    config.auth.limited = cred("viewer", "view-pw");
    config.server.cors.allowed_origins = vec!["http://app.example".into()];
    config
}

pub fn basic(user: &str, pass: &str) -> String {
    format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"))
    )
}

/// base64 `user:pass`, percent-encoded for use in a query string.
pub fn encoded_pair(user: &str, pass: &str) -> String {
    base64::engine::general_purpose::STANDARD
        .encode(format!("{user}:{pass}"))
        .replace('+', "%2B")
        .replace('/', "%2F")
        .replace('=', "%3D")
}

async fn boom() -> &'static str {
    panic!("handler exploded with secret detail")
}

pub async fn spawn_gateway(config: Config) -> Gateway {
    let public = tempfile::tempdir().unwrap();
    std::fs::write(public.path().join("lnd.html"), "<html>node</html>").unwrap();
    std::fs::write(public.path().join("index.html"), "<html>home</html>").unwrap();

    let node = Arc::new(FakeNode::default());
    let state = bootstrap::build_app_state_with(
        Arc::new(config),
        node.clone(),
        Arc::new(FakeProvider),
        false,
    );

    let business = routes::business_router(public.path()).route("/boom", get(boom));
    let app = api::app(state.clone(), business);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .unwrap();
    });

    Gateway {
        addr,
        state,
        node,
        _public: public,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
