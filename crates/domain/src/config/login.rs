use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Delegated login
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Delegated (OAuth2 authorization-code) login providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginConfig {
    /// Provider definitions keyed by the name used in `/connect/<name>`.
    #[serde(default)]
    pub providers: HashMap<String, OAuthProviderConfig>,
    /// Where the browser is sent after a successful login.
    #[serde(default = "d_landing_path")]
    pub landing_path: String,
    /// Lifetime of the anti-CSRF `state` issued when a login starts.
    #[serde(default = "d_state_ttl_secs")]
    pub state_ttl_secs: u64,
    /// Login attempts that may be in flight at once.  Further attempts are
    /// refused until older ones complete or expire.
    #[serde(default = "d_max_pending")]
    pub max_pending: usize,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            landing_path: d_landing_path(),
            state_ttl_secs: d_state_ttl_secs(),
            max_pending: d_max_pending(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthProviderConfig {
    pub authorize_url: String,
    pub token_url: String,
    /// Endpoint returning the logged-in identity as JSON.
    pub userinfo_url: String,
    pub client_id: String,
    /// Environment variable holding the client secret.
    pub client_secret_env: String,
    /// Absolute callback URL registered with the provider.
    pub redirect_uri: String,
    #[serde(default)]
    pub scope: Option<String>,
    /// JSON pointer into the userinfo response holding the subject.
    #[serde(default = "d_subject_pointer")]
    pub subject_pointer: String,
    /// JSON pointer holding a human-readable name, if any.
    #[serde(default)]
    pub name_pointer: Option<String>,
}

fn d_landing_path() -> String {
    "/".into()
}
fn d_state_ttl_secs() -> u64 {
    600
}
fn d_max_pending() -> usize {
    1024
}
fn d_subject_pointer() -> String {
    "/sub".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_provider_table() {
        let toml_str = r#"
            landing_path = "/tip.html"

            [providers.slack]
            authorize_url = "https://slack.com/oauth/authorize"
            token_url = "https://slack.com/api/oauth.access"
            userinfo_url = "https://slack.com/api/users.identity"
            client_id = "abc"
            client_secret_env = "SLACK_SECRET"
            redirect_uri = "https://gw.example/connect/slack/callback"
            scope = "identity.basic"
            subject_pointer = "/user/id"
        "#;
        let cfg: LoginConfig = toml::from_str(toml_str).unwrap();
        let slack = &cfg.providers["slack"];
        assert_eq!(slack.subject_pointer, "/user/id");
        assert_eq!(cfg.landing_path, "/tip.html");
        assert_eq!(cfg.state_ttl_secs, 600);
        assert_eq!(cfg.max_pending, 1024);
    }
}
