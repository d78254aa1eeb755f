//! Basic-auth gate middleware.
//!
//! Requests under a protected prefix must carry `Authorization: Basic`
//! credentials matching one of the two tiers.  Failures are answered with
//! 401 and a `WWW-Authenticate` challenge before any handler runs.  The
//! resulting [`AccessDecision`] is stored in request extensions.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use ng_domain::trace::TraceEvent;

use crate::api::error::ApiError;
use crate::auth::AccessDecision;
use crate::state::AppState;

/// Attach via `axum::middleware::from_fn_with_state`.
pub async fn basic_auth_gate(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let decision: AccessDecision = {
        let authorization = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        state.gate.authorize(req.uri().path(), authorization)
    };

    if !decision.granted {
        TraceEvent::AuthChallenge {
            path: req.uri().path().to_owned(),
            reason: if req.headers().contains_key(header::AUTHORIZATION) {
                "invalid credentials".into()
            } else {
                "missing credentials".into()
            },
        }
        .emit();
        return ApiError::AuthChallengeRequired {
            realm: state.gate.realm().to_owned(),
        }
        .into_response();
    }

    req.extensions_mut().insert(decision);
    next.run(req).await
}
