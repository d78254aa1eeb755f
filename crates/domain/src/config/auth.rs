use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Basic-auth credential tiers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Basic-auth configuration for the protected path prefixes and the
/// real-time channel.
///
/// Each tier is optional.  A tier without credentials never matches.  When
/// neither tier is configured, protected paths are served without a
/// challenge and the gateway logs a warning at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Full-access tier: every API and the complete event stream.
    #[serde(default)]
    pub full: Option<CredentialConfig>,
    /// Limited-access tier: reduced event surface.
    #[serde(default)]
    pub limited: Option<CredentialConfig>,
    /// Path prefixes gated behind basic auth, checked in order.
    #[serde(default = "d_protected_paths")]
    pub protected_paths: Vec<String>,
    /// Realm advertised in the `WWW-Authenticate` challenge.
    #[serde(default = "d_realm")]
    pub realm: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            full: None,
            limited: None,
            protected_paths: d_protected_paths(),
            realm: d_realm(),
        }
    }
}

impl AuthConfig {
    pub fn has_credentials(&self) -> bool {
        self.full.is_some() || self.limited.is_some()
    }
}

/// A username/secret pair.
///
/// `Debug` is manually implemented to redact the secret.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialConfig {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialConfig")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

fn d_protected_paths() -> Vec<String> {
    vec!["/lnd.html".into(), "/api/lnd/".into()]
}

fn d_realm() -> String {
    "nodegate".into()
}
