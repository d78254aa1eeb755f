//! In-memory session manager.
//!
//! Entries are keyed by token id in a sharded map, so creating, validating
//! or destroying one session never blocks work on unrelated sessions.
//! Expiry uses `tokio::time::Instant`, which lets tests drive the clock.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use ng_domain::config::{SessionsConfig, MAX_TTL_SECS};
use ng_domain::trace::TraceEvent;

use crate::token::TokenSigner;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Immutable settings handed to the manager at construction.
///
/// `Debug` is manually implemented to redact the secret.
#[derive(Clone)]
pub struct SessionSettings {
    pub ttl: Duration,
    pub sliding: bool,
    pub secret: Vec<u8>,
}

impl SessionSettings {
    pub fn from_config(cfg: &SessionsConfig, secret: Vec<u8>) -> Self {
        Self {
            ttl: Duration::from_secs(cfg.ttl_secs),
            sliding: cfg.sliding,
            secret,
        }
    }
}

impl std::fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSettings")
            .field("ttl", &self.ttl)
            .field("sliding", &self.sliding)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Who logged in, as reported by the delegated login provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub provider: String,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A live login session.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    /// Opaque token carried in the session cookie.
    #[serde(skip)]
    pub token: String,
    pub identity: Identity,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,
    #[error("session expired")]
    Expired,
}

struct Entry {
    session: Session,
    deadline: Instant,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SessionManager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SessionManager {
    ttl: Duration,
    sliding: bool,
    signer: TokenSigner,
    sessions: DashMap<String, Entry>,
}

/// Longest lifetime a session can have; larger settings are clamped.
pub const MAX_SESSION_TTL: Duration = Duration::from_secs(MAX_TTL_SECS);

impl SessionManager {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            ttl: settings.ttl.min(MAX_SESSION_TTL),
            sliding: settings.sliding,
            signer: TokenSigner::new(settings.secret),
            sessions: DashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a new session for `identity`.
    pub fn create(&self, identity: Identity) -> Session {
        let (id, token) = self.signer.issue();
        let issued_at = Utc::now();
        let session = Session {
            token,
            identity,
            issued_at,
            expires_at: issued_at + chrono_ttl(self.ttl),
        };

        TraceEvent::SessionCreated {
            provider: session.identity.provider.clone(),
            subject: session.identity.subject.clone(),
            ttl_secs: self.ttl.as_secs(),
        }
        .emit();

        self.sessions.insert(
            id,
            Entry {
                session: session.clone(),
                deadline: Instant::now() + self.ttl,
            },
        );
        session
    }

    /// Look up a session by token.
    ///
    /// A session is valid strictly before its deadline.  An expired entry
    /// is removed on the spot.  With sliding renewal the deadline moves to
    /// `now + ttl`; the token never changes.
    pub fn validate(&self, token: &str) -> Result<Session, SessionError> {
        let id = self.signer.verify(token).ok_or(SessionError::NotFound)?;
        let now = Instant::now();

        match self.sessions.entry(id.to_owned()) {
            MapEntry::Vacant(_) => Err(SessionError::NotFound),
            MapEntry::Occupied(mut occupied) => {
                if occupied.get().deadline <= now {
                    occupied.remove();
                    TraceEvent::SessionDestroyed {
                        reason: "expired".into(),
                    }
                    .emit();
                    return Err(SessionError::Expired);
                }
                if self.sliding {
                    let entry = occupied.get_mut();
                    entry.deadline = now + self.ttl;
                    entry.session.expires_at = Utc::now() + chrono_ttl(self.ttl);
                }
                Ok(occupied.get().session.clone())
            }
        }
    }

    /// Remove a session.  Returns `true` if it existed.
    pub fn destroy(&self, token: &str) -> bool {
        let Some(id) = self.signer.verify(token) else {
            return false;
        };
        let removed = self.sessions.remove(id).is_some();
        if removed {
            TraceEvent::SessionDestroyed {
                reason: "logout".into(),
            }
            .emit();
        }
        removed
    }

    /// Drop every expired session.  Returns how many were removed.
    pub fn prune_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, entry| entry.deadline > now);
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            TraceEvent::SessionsPruned {
                removed,
                remaining: self.sessions.len(),
            }
            .emit();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

fn chrono_ttl(ttl: Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn manager(ttl_secs: u64, sliding: bool) -> SessionManager {
        SessionManager::new(SessionSettings {
            ttl: Duration::from_secs(ttl_secs),
            sliding,
            secret: b"test-secret".to_vec(),
        })
    }

    fn alice() -> Identity {
        Identity {
            provider: "slack".into(),
            subject: "U123".into(),
            name: Some("alice".into()),
        }
    }

    #[tokio::test]
    async fn oversized_ttl_is_clamped() {
        let m = manager(u64::MAX, true);
        assert_eq!(m.ttl(), MAX_SESSION_TTL);
        let session = m.create(alice());
        assert!(m.validate(&session.token).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn valid_until_exactly_ttl() {
        let mgr = manager(300, false);
        let session = mgr.create(alice());

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(mgr.validate(&session.token).unwrap().identity, alice());

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(mgr.validate(&session.token).is_ok());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(mgr.validate(&session.token).unwrap_err(), SessionError::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_session_is_then_not_found() {
        let mgr = manager(10, false);
        let session = mgr.create(alice());
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(mgr.validate(&session.token).unwrap_err(), SessionError::Expired);
        assert_eq!(mgr.validate(&session.token).unwrap_err(), SessionError::NotFound);
        assert!(mgr.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sliding_renewal_extends_from_last_access() {
        let mgr = manager(10, true);
        let session = mgr.create(alice());

        tokio::time::advance(Duration::from_secs(8)).await;
        let refreshed = mgr.validate(&session.token).unwrap();
        assert_eq!(refreshed.token, session.token);

        // 8s after the refresh: still inside the renewed window.
        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(mgr.validate(&session.token).is_ok());

        // No access for a full ttl: gone.
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(mgr.validate(&session.token).unwrap_err(), SessionError::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_expiry_does_not_slide() {
        let mgr = manager(10, false);
        let session = mgr.create(alice());
        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(mgr.validate(&session.token).is_ok());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(mgr.validate(&session.token).unwrap_err(), SessionError::Expired);
    }

    #[test]
    fn destroy_is_immediate() {
        let mgr = manager(300, false);
        let session = mgr.create(alice());
        assert!(mgr.destroy(&session.token));
        assert_eq!(mgr.validate(&session.token).unwrap_err(), SessionError::NotFound);
        assert!(!mgr.destroy(&session.token));
    }

    #[test]
    fn forged_token_is_not_found() {
        let mgr = manager(300, false);
        let session = mgr.create(alice());
        let other = manager(300, false);
        // Same format, different secret.
        let _ = other.create(alice());
        assert_eq!(
            other.validate(&session.token).unwrap_err(),
            SessionError::NotFound
        );
        assert_eq!(mgr.validate("garbage").unwrap_err(), SessionError::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn prune_removes_only_expired() {
        let mgr = manager(10, false);
        let old = mgr.create(alice());
        tokio::time::advance(Duration::from_secs(5)).await;
        let fresh = mgr.create(alice());
        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(mgr.prune_expired(), 1);
        assert_eq!(mgr.len(), 1);
        assert!(mgr.validate(&old.token).is_err());
        assert!(mgr.validate(&fresh.token).is_ok());
    }

    #[tokio::test]
    async fn concurrent_create_and_validate() {
        let mgr = Arc::new(manager(300, true));
        let mut handles = Vec::new();
        for i in 0..16 {
            let mgr = mgr.clone();
            handles.push(tokio::spawn(async move {
                let session = mgr.create(Identity {
                    provider: "p".into(),
                    subject: format!("user-{i}"),
                    name: None,
                });
                for _ in 0..50 {
                    let s = mgr.validate(&session.token).unwrap();
                    assert_eq!(s.identity.subject, format!("user-{i}"));
                }
                mgr.destroy(&session.token)
            }));
        }
        for h in handles {
            assert!(h.await.unwrap());
        }
        assert!(mgr.is_empty());
    }

    #[test]
    fn settings_debug_redacts_secret() {
        let settings = SessionSettings {
            ttl: Duration::from_secs(1),
            sliding: false,
            secret: b"topsecret".to_vec(),
        };
        assert!(!format!("{settings:?}").contains("topsecret"));
    }
}
