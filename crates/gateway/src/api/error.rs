//! HTTP error taxonomy and the terminal error boundary.
//!
//! Every error response has the body `{status, message, type}`.  Internal
//! failures (including panics caught by `CatchPanicLayer`) are logged in
//! full and answered with one fixed body that reveals nothing.

use std::any::Any;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use ng_backend::BackendError;

pub const INTERNAL_MESSAGE: &str = "internal error";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("authentication required")]
    AuthChallengeRequired { realm: String },
    #[error("{0}")]
    AuthDenied(String),
    #[error("session expired")]
    SessionExpired,
    #[error("no session")]
    SessionRequired,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    TooManyRequests(String),
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    /// Carries the backend's detail for the log only; clients see a fixed
    /// message.
    #[error("backend rejected the command")]
    BackendRejected(String),
    #[error("internal: {0:#}")]
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::AuthChallengeRequired { .. }
            | ApiError::SessionExpired
            | ApiError::SessionRequired => StatusCode::UNAUTHORIZED,
            ApiError::AuthDenied(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BackendRejected(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::AuthChallengeRequired { .. } => "auth_challenge_required",
            ApiError::AuthDenied(_) => "auth_denied",
            ApiError::SessionExpired => "session_expired",
            ApiError::SessionRequired => "session_required",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::NotFound(_) => "not_found",
            ApiError::TooManyRequests(_) => "too_many_requests",
            ApiError::BackendUnavailable(_) => "backend_unavailable",
            ApiError::BackendRejected(_) => "backend_rejected",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl From<BackendError> for ApiError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Unavailable(_) | BackendError::Timeout(_) => {
                ApiError::BackendUnavailable(e.to_string())
            }
            BackendError::InvalidMethod(_) => ApiError::BadRequest(e.to_string()),
            BackendError::Rejected { .. } | BackendError::Decode(_) => {
                ApiError::BackendRejected(e.to_string())
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(ref cause) = self {
            tracing::error!(error = ?cause, "unhandled failure");
            return internal_error_response();
        }
        if let ApiError::BackendRejected(ref detail) = self {
            tracing::warn!(detail = %detail, "backend rejected the command");
        }

        let status = self.status();
        let body = json!({
            "status": status.as_u16(),
            "message": self.to_string(),
            "type": self.kind(),
        });
        let mut resp = (status, Json(body)).into_response();

        if let ApiError::AuthChallengeRequired { realm } = &self {
            let challenge = format!("Basic realm=\"{}\"", realm.replace('"', "'"));
            if let Ok(value) = HeaderValue::from_str(&challenge) {
                resp.headers_mut().insert(header::WWW_AUTHENTICATE, value);
            }
        }
        resp
    }
}

/// The fixed body for every unrecovered failure.
pub fn internal_error_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "status": 500,
            "message": INTERNAL_MESSAGE,
            "type": "internal",
        })),
    )
        .into_response()
}

/// `CatchPanicLayer` handler.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else {
        "non-string panic payload".to_owned()
    };
    tracing::error!(panic = %detail, "handler panicked");
    internal_error_response()
}
