//! Basic-auth gate: decides the access level of a request from its path
//! and `Authorization` header.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use ng_domain::config::AuthConfig;
use ng_protocol::Role;

use super::credentials::CredentialStore;

/// Ordered path prefixes that require gate evaluation.
#[derive(Debug, Clone)]
pub struct ProtectedPathSet {
    prefixes: Vec<String>,
}

impl ProtectedPathSet {
    pub fn new(prefixes: impl IntoIterator<Item = String>) -> Self {
        Self {
            prefixes: prefixes.into_iter().collect(),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        self.prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }
}

/// Outcome of gate evaluation for one request.  Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessDecision {
    pub granted: bool,
    pub role: Role,
}

impl AccessDecision {
    /// Path outside the protected set.
    pub const UNPROTECTED: AccessDecision = AccessDecision {
        granted: true,
        role: Role::None,
    };

    pub const DENIED: AccessDecision = AccessDecision {
        granted: false,
        role: Role::None,
    };

    fn from_role(role: Role) -> Self {
        Self {
            granted: role > Role::None,
            role,
        }
    }
}

pub struct BasicAuthGate {
    credentials: CredentialStore,
    protected: ProtectedPathSet,
    realm: String,
}

impl BasicAuthGate {
    pub fn new(credentials: CredentialStore, protected: ProtectedPathSet, realm: String) -> Self {
        if credentials.is_empty() {
            tracing::warn!(
                prefixes = ?protected.prefixes(),
                "no basic-auth credentials configured; protected paths are open"
            );
        }
        Self {
            credentials,
            protected,
            realm,
        }
    }

    pub fn from_config(cfg: &AuthConfig) -> Self {
        Self::new(
            CredentialStore::from_config(cfg),
            ProtectedPathSet::new(cfg.protected_paths.iter().cloned()),
            cfg.realm.clone(),
        )
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn is_open(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Evaluate a request.  Paths outside the protected set short-circuit
    /// to [`AccessDecision::UNPROTECTED`].
    pub fn authorize(&self, path: &str, authorization: Option<&str>) -> AccessDecision {
        if !self.protected.matches(path) {
            return AccessDecision::UNPROTECTED;
        }
        self.resolve(authorization)
    }

    /// Resolve an `Authorization` value regardless of path.  With no tier
    /// configured everything resolves to full access.
    pub fn resolve(&self, authorization: Option<&str>) -> AccessDecision {
        if self.credentials.is_empty() {
            return AccessDecision::from_role(Role::Full);
        }
        match authorization.and_then(parse_basic) {
            Some((user, pass)) => AccessDecision::from_role(self.credentials.resolve(&user, &pass)),
            None => AccessDecision::DENIED,
        }
    }

    /// Resolve a base64 `user:password` pair, the form the channel accepts
    /// as a query parameter.
    pub fn resolve_encoded_pair(&self, encoded: Option<&str>) -> AccessDecision {
        if self.credentials.is_empty() {
            return AccessDecision::from_role(Role::Full);
        }
        match encoded.and_then(decode_pair) {
            Some((user, pass)) => AccessDecision::from_role(self.credentials.resolve(&user, &pass)),
            None => AccessDecision::DENIED,
        }
    }
}

/// Parse `Basic <base64(user:pass)>`.  The scheme is case-insensitive.
pub fn parse_basic(header: &str) -> Option<(String, String)> {
    let (scheme, rest) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    decode_pair(rest.trim())
}

fn decode_pair(encoded: &str) -> Option<(String, String)> {
    let raw = STANDARD.decode(encoded).ok()?;
    let text = String::from_utf8(raw).ok()?;
    let (user, pass) = text.split_once(':')?;
    Some((user.to_owned(), pass.to_owned()))
}
