use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Backend node
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Connection to the backend node's control API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// `host:port` of the control API.
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_scheme")]
    pub scheme: String,
    /// Backend log file streamed to channel clients.  `None` disables
    /// log streaming.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// How often the log file is polled for new lines.
    #[serde(default = "d_log_poll_ms")]
    pub log_poll_ms: u64,
    #[serde(default = "d_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Interval between connectivity probes while the backend is up.
    #[serde(default = "d_ping_interval_secs")]
    pub ping_interval_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            scheme: d_scheme(),
            log_file: None,
            log_poll_ms: d_log_poll_ms(),
            request_timeout_secs: d_request_timeout_secs(),
            ping_interval_secs: d_ping_interval_secs(),
        }
    }
}

impl BackendConfig {
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }
}

fn d_host() -> String {
    "127.0.0.1:8080".into()
}
fn d_scheme() -> String {
    "http".into()
}
fn d_log_poll_ms() -> u64 {
    500
}
fn d_request_timeout_secs() -> u64 {
    30
}
fn d_ping_interval_secs() -> u64 {
    15
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_joins_scheme_and_host() {
        let cfg = BackendConfig {
            host: "node.local:8080".into(),
            scheme: "https".into(),
            ..BackendConfig::default()
        };
        assert_eq!(cfg.base_url(), "https://node.local:8080");
    }

    #[test]
    fn log_streaming_disabled_by_default() {
        let cfg: BackendConfig = toml::from_str("").unwrap();
        assert!(cfg.log_file.is_none());
        assert_eq!(cfg.ping_interval_secs, 15);
    }
}
