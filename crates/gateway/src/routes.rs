//! Default business router: the backend command proxy, a health probe and
//! static assets.  Injected into the pipeline by [`crate::api::app`]; an
//! embedding application can pass its own router instead.

use std::path::Path as FsPath;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde_json::{json, Value};
use tower_http::services::ServeDir;

use ng_protocol::{BackendEvent, Role, Topic};

use crate::api::error::ApiError;
use crate::auth::AccessDecision;
use crate::state::AppState;

pub fn business_router(public_dir: &FsPath) -> Router<AppState> {
    Router::new()
        .route("/api/lnd/:method", post(forward_command))
        .route("/health", get(health))
        .fallback_service(ServeDir::new(public_dir))
}

/// POST /api/lnd/:method: forward a JSON command to the backend node.
pub async fn forward_command(
    State(state): State<AppState>,
    Extension(decision): Extension<AccessDecision>,
    Path(method): Path<String>,
    body: Option<Json<Value>>,
) -> Result<Json<Value>, ApiError> {
    if decision.role == Role::Limited && !state.visibility.may_command(Role::Limited, &method) {
        return Err(ApiError::AuthDenied(format!(
            "command {method} not permitted for the limited tier"
        )));
    }

    let params = body.map(|Json(v)| v).unwrap_or(Value::Null);
    let outcome = state.backend.call(&method, params).await;

    state.hub.publish(BackendEvent::new(
        Topic::Command,
        json!({ "source": "http", "method": method, "ok": outcome.is_ok() }),
    ));

    Ok(Json(outcome?))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let backend = state.backend_status.read().clone();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "backend": backend,
        "channels": state.channels.len(),
        "sessions": state.sessions.len(),
    }))
}
