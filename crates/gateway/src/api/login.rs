//! Delegated login endpoints.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;

use ng_domain::trace::TraceEvent;

use crate::api::error::ApiError;
use crate::api::session::{clear_cookie, read_cookie, session_cookie, SessionLookup};
use crate::login::LoginError;
use crate::state::AppState;

impl From<LoginError> for ApiError {
    fn from(e: LoginError) -> Self {
        match e {
            LoginError::UnknownProvider(_) => ApiError::NotFound(e.to_string()),
            LoginError::InvalidState | LoginError::Denied(_) | LoginError::MissingSubject(_) => {
                ApiError::AuthDenied(e.to_string())
            }
            LoginError::Exchange(_) => ApiError::AuthDenied("login failed".into()),
            LoginError::TooManyPending => ApiError::TooManyRequests(e.to_string()),
        }
    }
}

/// GET /connect/:provider
pub async fn connect(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Redirect, ApiError> {
    let url = state.login.begin(&provider)?;
    Ok(Redirect::to(&url))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// GET /connect/:provider/callback
pub async fn callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, ApiError> {
    if let Some(err) = query.error {
        return Err(LoginError::Denied(err).into());
    }
    let (Some(code), Some(login_state)) = (query.code, query.state) else {
        return Err(ApiError::BadRequest("code and state are required".into()));
    };

    let identity = state.login.complete(&provider, &login_state, &code).await?;
    TraceEvent::LoginCompleted {
        provider: identity.provider.clone(),
        subject: identity.subject.clone(),
    }
    .emit();

    let session = state.sessions.create(identity);
    let mut resp = Redirect::to(&state.config.login.landing_path).into_response();
    let cookie = session_cookie(
        &state.config.sessions.cookie_name,
        &session.token,
        state.sessions.ttl().as_secs(),
        state.secure_cookies,
    )
    .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("session cookie is not a valid header")))?;
    resp.headers_mut().insert(header::SET_COOKIE, cookie);
    Ok(resp)
}

/// GET /session
pub async fn current_session(
    Extension(lookup): Extension<SessionLookup>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match lookup {
        SessionLookup::Active(session) => Ok(Json(json!({
            "identity": session.identity,
            "issued_at": session.issued_at,
            "expires_at": session.expires_at,
        }))),
        SessionLookup::Expired => Err(ApiError::SessionExpired),
        SessionLookup::Missing => Err(ApiError::SessionRequired),
    }
}

/// POST /logout
pub async fn logout(State(state): State<AppState>, headers: axum::http::HeaderMap) -> Response {
    let name = &state.config.sessions.cookie_name;
    if let Some(token) = read_cookie(&headers, name) {
        state.sessions.destroy(&token);
    }
    let mut resp = StatusCode::NO_CONTENT.into_response();
    if let Some(cookie) = clear_cookie(name, state.secure_cookies) {
        resp.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    resp
}
