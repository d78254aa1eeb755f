use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_8280")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    /// Directory holding `key.pem` and `cert.pem`.  When set, the gateway
    /// serves HTTPS only; unreadable material aborts startup.
    #[serde(default)]
    pub tls_dir: Option<PathBuf>,
    /// Static assets served as the router fallback.
    #[serde(default = "d_public_dir")]
    pub public_dir: PathBuf,
    /// Path of the real-time channel upgrade endpoint.
    #[serde(default = "d_channel_path")]
    pub channel_path: String,
    #[serde(default)]
    pub cors: CorsConfig,
    /// Per-IP token-bucket rate limiting configuration.
    /// When `None` (the default), rate limiting is disabled.
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
    /// Upper bound on in-flight requests.
    #[serde(default = "d_max_concurrent")]
    pub max_concurrent_requests: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: d_8280(),
            host: d_host(),
            tls_dir: None,
            public_dir: d_public_dir(),
            channel_path: d_channel_path(),
            cors: CorsConfig::default(),
            rate_limit: None,
            max_concurrent_requests: d_max_concurrent(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Per-IP token-bucket rate limiting configuration.
///
/// `requests_per_second` controls the replenishment rate, while `burst_size`
/// sets the maximum number of requests a single IP can send in a quick burst
/// before being throttled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_second: u64,
    pub burst_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Origins allowed for CORS.  `["*"]` (the default) allows every
    /// origin; entries may end in `:*` to match any port on a host.
    #[serde(default = "d_cors_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: d_cors_origins(),
        }
    }
}

impl CorsConfig {
    pub fn is_wildcard(&self) -> bool {
        self.allowed_origins.len() == 1 && self.allowed_origins[0] == "*"
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_8280() -> u16 {
    8280
}
fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_public_dir() -> PathBuf {
    PathBuf::from("public")
}
fn d_channel_path() -> String {
    "/channel".into()
}
fn d_max_concurrent() -> usize {
    256
}
fn d_cors_origins() -> Vec<String> {
    vec!["*".into()]
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_default_is_plaintext() {
        let cfg = ServerConfig::default();
        assert!(cfg.tls_dir.is_none());
        assert!(cfg.rate_limit.is_none());
        assert_eq!(cfg.bind_addr(), "127.0.0.1:8280");
    }

    #[test]
    fn server_config_parses_tls_dir() {
        let toml_str = r#"
            port = 8443
            host = "0.0.0.0"
            tls_dir = "/etc/nodegate/tls"
        "#;
        let cfg: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.port, 8443);
        assert_eq!(cfg.tls_dir, Some(PathBuf::from("/etc/nodegate/tls")));
    }

    #[test]
    fn server_config_parses_with_rate_limit() {
        let toml_str = r#"
            [rate_limit]
            requests_per_second = 50
            burst_size = 100
        "#;
        let cfg: ServerConfig = toml::from_str(toml_str).unwrap();
        let rl = cfg.rate_limit.expect("rate_limit should be Some");
        assert_eq!(rl.requests_per_second, 50);
        assert_eq!(rl.burst_size, 100);
    }

    #[test]
    fn default_cors_is_permissive() {
        let cfg = CorsConfig::default();
        assert!(cfg.is_wildcard());
    }

    #[test]
    fn custom_cors_is_not_wildcard() {
        let cfg = CorsConfig {
            allowed_origins: vec!["http://localhost:*".into()],
        };
        assert!(!cfg.is_wildcard());
    }
}
