use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use ng_backend::{BackendClient, EventHub};
use ng_domain::config::Config;
use ng_sessions::SessionManager;

use crate::auth::BasicAuthGate;
use crate::channel::filter::VisibilityPolicy;
use crate::channel::registry::ChannelRegistry;
use crate::login::LoginService;

/// Last known backend reachability, written by the connectivity watch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackendStatus {
    /// `None` until the first probe completes.
    pub online: Option<bool>,
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Shared application state passed to all handlers and middleware.
///
/// Fields are grouped by concern:
/// - **Core**: config, shutdown signal
/// - **Authentication**: basic-auth gate, sessions, delegated login
/// - **Backend**: command client, event hub, reachability
/// - **Channel**: open connections, visibility rules
#[derive(Clone)]
pub struct AppState {
    // ── Core ──────────────────────────────────────────────────────────
    pub config: Arc<Config>,
    /// Cancelled once on shutdown; background loops and the listener
    /// watch it.
    pub shutdown: CancellationToken,

    // ── Authentication ────────────────────────────────────────────────
    pub gate: Arc<BasicAuthGate>,
    pub sessions: Arc<SessionManager>,
    pub login: Arc<LoginService>,
    /// Mark session cookies `Secure` (set when serving TLS).
    pub secure_cookies: bool,

    // ── Backend ───────────────────────────────────────────────────────
    pub backend: Arc<dyn BackendClient>,
    pub hub: Arc<EventHub>,
    pub backend_status: Arc<RwLock<BackendStatus>>,

    // ── Channel ───────────────────────────────────────────────────────
    pub channels: Arc<ChannelRegistry>,
    pub visibility: Arc<VisibilityPolicy>,
}
