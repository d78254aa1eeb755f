//! Delegated login.
//!
//! The provider-specific flow lives behind [`LoginRelay`].  [`LoginService`]
//! adds what every flow needs on the gateway side: a one-shot anti-CSRF
//! `state` value per login attempt, bounded in time.

pub mod oauth;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use rand::rngs::OsRng;
use rand::RngCore;
use tokio::time::Instant;

use ng_domain::config::MAX_TTL_SECS;
use ng_sessions::Identity;

pub use oauth::OAuthRelay;

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("unknown login provider: {0}")]
    UnknownProvider(String),
    #[error("login state missing, reused or expired")]
    InvalidState,
    #[error("provider denied the login: {0}")]
    Denied(String),
    #[error("provider exchange failed: {0}")]
    Exchange(String),
    #[error("provider response has no subject at {0}")]
    MissingSubject(String),
    #[error("too many logins in progress")]
    TooManyPending,
}

/// The provider side of a login flow.
#[async_trait]
pub trait LoginRelay: Send + Sync {
    /// Where to send the browser to start a login.
    fn authorize_url(&self, provider: &str, state: &str) -> Result<String, LoginError>;

    /// Turn the provider's callback `code` into an identity.
    async fn exchange(&self, provider: &str, code: &str) -> Result<Identity, LoginError>;
}

struct PendingLogin {
    provider: String,
    deadline: Instant,
}

pub struct LoginService {
    relay: Arc<dyn LoginRelay>,
    pending: DashMap<String, PendingLogin>,
    state_ttl: Duration,
    max_pending: usize,
}

impl LoginService {
    pub fn new(relay: Arc<dyn LoginRelay>, state_ttl: Duration, max_pending: usize) -> Self {
        Self {
            relay,
            pending: DashMap::new(),
            state_ttl: state_ttl.min(Duration::from_secs(MAX_TTL_SECS)),
            max_pending: max_pending.max(1),
        }
    }

    /// Start a login: mint a state value and return the provider URL.
    pub fn begin(&self, provider: &str) -> Result<String, LoginError> {
        if self.pending.len() >= self.max_pending {
            self.prune_expired();
            if self.pending.len() >= self.max_pending {
                tracing::warn!(pending = self.pending.len(), "login refused, too many in progress");
                return Err(LoginError::TooManyPending);
            }
        }
        let state = random_state();
        let url = self.relay.authorize_url(provider, &state)?;
        self.pending.insert(
            state,
            PendingLogin {
                provider: provider.to_owned(),
                deadline: Instant::now() + self.state_ttl,
            },
        );
        Ok(url)
    }

    /// Finish a login.  The state is consumed whether or not the exchange
    /// succeeds.
    pub async fn complete(
        &self,
        provider: &str,
        state: &str,
        code: &str,
    ) -> Result<Identity, LoginError> {
        let (_, pending) = self.pending.remove(state).ok_or(LoginError::InvalidState)?;
        if pending.provider != provider || pending.deadline <= Instant::now() {
            return Err(LoginError::InvalidState);
        }
        self.relay.exchange(provider, code).await
    }

    /// Drop expired login attempts.
    pub fn prune_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.pending.len();
        self.pending.retain(|_, p| p.deadline > now);
        before.saturating_sub(self.pending.len())
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn random_state() -> String {
    let mut raw = [0u8; 16];
    OsRng.fill_bytes(&mut raw);
    hex::encode(raw)
}
