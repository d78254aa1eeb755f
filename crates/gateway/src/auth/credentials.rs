//! The two basic-auth credential tiers, loaded once at startup.

use sha2::{Digest, Sha256};
use subtle::{Choice, ConstantTimeEq};

use ng_domain::config::AuthConfig;
use ng_protocol::Role;

/// Digests of one tier's username and secret.  Comparing digests keeps
/// every comparison at 32 bytes regardless of input length.
struct Tier {
    username: [u8; 32],
    secret: [u8; 32],
}

impl Tier {
    fn new(username: &str, secret: &str) -> Self {
        Self {
            username: digest(username),
            secret: digest(secret),
        }
    }

    fn matches(&self, username: &[u8; 32], secret: &[u8; 32]) -> Choice {
        self.username[..].ct_eq(&username[..]) & self.secret[..].ct_eq(&secret[..])
    }
}

fn digest(s: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(s.as_bytes()));
    out
}

/// Immutable after construction.  A tier without configured credentials
/// is disabled and never matches.
pub struct CredentialStore {
    full: Option<Tier>,
    limited: Option<Tier>,
}

impl CredentialStore {
    pub fn from_config(cfg: &AuthConfig) -> Self {
        Self {
            full: cfg.full.as_ref().map(|c| Tier::new(&c.username, &c.password)),
            limited: cfg
                .limited
                .as_ref()
                .map(|c| Tier::new(&c.username, &c.password)),
        }
    }

    /// No tier configured.
    pub fn is_empty(&self) -> bool {
        self.full.is_none() && self.limited.is_none()
    }

    /// Resolve a username/secret pair to a role.
    ///
    /// Both tiers are always evaluated.  Full wins when both match.
    pub fn resolve(&self, username: &str, secret: &str) -> Role {
        let user = digest(username);
        let pass = digest(secret);
        let full = self
            .full
            .as_ref()
            .map(|t| t.matches(&user, &pass))
            .unwrap_or_else(|| Choice::from(0));
        let limited = self
            .limited
            .as_ref()
            .map(|t| t.matches(&user, &pass))
            .unwrap_or_else(|| Choice::from(0));

        if bool::from(full) {
            Role::Full
        } else if bool::from(limited) {
            Role::Limited
        } else {
            Role::None
        }
    }
}
