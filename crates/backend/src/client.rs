//! Command client for the backend node's control API.
//!
//! The gateway only needs two capabilities from the node: forward a named
//! command with JSON parameters, and check that the node is reachable.
//! The concrete RPC surface belongs to the node; [`HttpBackend`] speaks a
//! plain JSON-over-HTTP mapping of it (`POST /v1/<method>`).

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use ng_domain::config::BackendConfig;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend timeout: {0}")]
    Timeout(String),
    #[error("backend rejected {method} ({status}): {message}")]
    Rejected {
        method: String,
        status: u16,
        message: String,
    },
    #[error("invalid method name: {0:?}")]
    InvalidMethod(String),
    #[error("backend response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Whether the error means the node could not be reached at all.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, BackendError::Unavailable(_) | BackendError::Timeout(_))
    }
}

fn from_reqwest(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout(e.to_string())
    } else if e.is_connect() || e.is_request() {
        BackendError::Unavailable(e.to_string())
    } else {
        BackendError::Decode(e.to_string())
    }
}

/// The narrow interface the gateway consumes from the backend node.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Forward a command.  `params` is `Value::Null` when the caller sent
    /// none.
    async fn call(&self, method: &str, params: Value) -> Result<Value, BackendError>;

    /// Cheap reachability probe.
    async fn ping(&self) -> Result<(), BackendError>;
}

/// Method names are path segments; anything but `[A-Za-z0-9_-]` is refused.
pub fn validate_method(method: &str) -> Result<(), BackendError> {
    let ok = !method.is_empty()
        && method.len() <= 64
        && method
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(BackendError::InvalidMethod(method.to_owned()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP JSON client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn from_config(cfg: &BackendConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .map_err(|e| BackendError::Unavailable(format!("building HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: cfg.base_url().trim_end_matches('/').to_owned(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, method: &str) -> String {
        format!("{}/v1/{method}", self.base_url)
    }
}

#[async_trait]
impl BackendClient for HttpBackend {
    async fn call(&self, method: &str, params: Value) -> Result<Value, BackendError> {
        validate_method(method)?;
        let body = if params.is_null() {
            Value::Object(Default::default())
        } else {
            params
        };

        let resp = self
            .http
            .post(self.url(method))
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BackendError::Rejected {
                method: method.to_owned(),
                status: status.as_u16(),
                message,
            });
        }

        resp.json::<Value>().await.map_err(from_reqwest)
    }

    async fn ping(&self) -> Result<(), BackendError> {
        let resp = self
            .http
            .get(self.url("getinfo"))
            .send()
            .await
            .map_err(from_reqwest)?;
        if resp.status().is_server_error() {
            return Err(BackendError::Unavailable(format!(
                "probe returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_names_are_path_safe() {
        assert!(validate_method("getinfo").is_ok());
        assert!(validate_method("list-channels_2").is_ok());
        assert!(validate_method("").is_err());
        assert!(validate_method("../admin").is_err());
        assert!(validate_method("a/b").is_err());
        assert!(validate_method("get info").is_err());
    }

    #[test]
    fn base_url_has_no_trailing_slash() {
        let cfg = BackendConfig {
            host: "node:8080/".into(),
            ..BackendConfig::default()
        };
        let backend = HttpBackend::from_config(&cfg).unwrap();
        assert_eq!(backend.base_url(), "http://node:8080");
        assert_eq!(backend.url("getinfo"), "http://node:8080/v1/getinfo");
    }

    #[test]
    fn connectivity_classification() {
        assert!(BackendError::Timeout("t".into()).is_connectivity());
        assert!(BackendError::Unavailable("u".into()).is_connectivity());
        assert!(!BackendError::InvalidMethod("x".into()).is_connectivity());
    }
}
