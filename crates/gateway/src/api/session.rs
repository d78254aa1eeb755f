//! Session cookie handling.
//!
//! [`attach_session`] resolves the session cookie (if any) on every request
//! and stores a [`SessionLookup`] in request extensions, so handlers can
//! tell a missing session from an expired one.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;

use ng_sessions::{Session, SessionError};

use crate::state::AppState;

#[derive(Debug, Clone)]
pub enum SessionLookup {
    Active(Session),
    Expired,
    Missing,
}

pub async fn attach_session(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let lookup = match read_cookie(req.headers(), &state.config.sessions.cookie_name) {
        None => SessionLookup::Missing,
        Some(token) => match state.sessions.validate(&token) {
            Ok(session) => SessionLookup::Active(session),
            Err(SessionError::Expired) => SessionLookup::Expired,
            Err(SessionError::NotFound) => SessionLookup::Missing,
        },
    };
    req.extensions_mut().insert(lookup);
    next.run(req).await
}

/// Find cookie `name` in the request's `Cookie` headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_owned())
}

/// `Set-Cookie` value carrying a session token.
pub fn session_cookie(name: &str, token: &str, max_age_secs: u64, secure: bool) -> Option<HeaderValue> {
    let mut cookie =
        format!("{name}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).ok()
}

/// `Set-Cookie` value that removes the session cookie.
pub fn clear_cookie(name: &str, secure: bool) -> Option<HeaderValue> {
    session_cookie(name, "", 0, secure)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_named_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("a=1; ng.sid=tok.sig; b=2"));
        assert_eq!(read_cookie(&headers, "ng.sid").as_deref(), Some("tok.sig"));
        assert_eq!(read_cookie(&headers, "missing"), None);
    }

    #[test]
    fn reads_across_multiple_cookie_headers() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::COOKIE, HeaderValue::from_static("ng.sid=xyz"));
        assert_eq!(read_cookie(&headers, "ng.sid").as_deref(), Some("xyz"));
    }

    #[test]
    fn cookie_attributes() {
        let plain = session_cookie("ng.sid", "t", 300, false).unwrap();
        assert_eq!(
            plain.to_str().unwrap(),
            "ng.sid=t; Path=/; HttpOnly; SameSite=Lax; Max-Age=300"
        );
        let secure = session_cookie("ng.sid", "t", 300, true).unwrap();
        assert!(secure.to_str().unwrap().ends_with("; Secure"));
        let cleared = clear_cookie("ng.sid", false).unwrap();
        assert!(cleared.to_str().unwrap().contains("Max-Age=0"));
    }
}
