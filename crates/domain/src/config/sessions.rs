use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Login sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Upper bound for session and login-state lifetimes.
pub const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Cookie-backed sessions created by the delegated login flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Lifetime of a session from issuance (or last refresh when
    /// `sliding` is enabled).  Also used as the cookie `Max-Age`.
    #[serde(default = "d_ttl_secs")]
    pub ttl_secs: u64,
    /// Extend the expiry on every validated access.
    #[serde(default)]
    pub sliding: bool,
    /// Environment variable holding the token signing secret.  When unset
    /// a random per-process secret is generated, which invalidates all
    /// sessions on restart.
    #[serde(default = "d_secret_env")]
    pub secret_env: String,
    #[serde(default = "d_cookie_name")]
    pub cookie_name: String,
    /// How often expired sessions are swept from memory.
    #[serde(default = "d_prune_interval_secs")]
    pub prune_interval_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: d_ttl_secs(),
            sliding: false,
            secret_env: d_secret_env(),
            cookie_name: d_cookie_name(),
            prune_interval_secs: d_prune_interval_secs(),
        }
    }
}

fn d_ttl_secs() -> u64 {
    300
}
fn d_secret_env() -> String {
    "NG_SESSION_SECRET".into()
}
fn d_cookie_name() -> String {
    "ng.sid".into()
}
fn d_prune_interval_secs() -> u64 {
    60
}
