//! AppState construction and background-task spawning.
//!
//! [`build_app_state`] wires the production collaborators (HTTP backend,
//! OAuth relay); [`build_app_state_with`] takes them as arguments so
//! integration tests can substitute their own.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use ng_backend::{BackendClient, EventHub, HttpBackend, LogTailer};
use ng_domain::config::{Config, ConfigSeverity};
use ng_sessions::{SessionManager, SessionSettings, TokenSigner};

use crate::auth::BasicAuthGate;
use crate::channel::{ChannelRegistry, VisibilityPolicy};
use crate::login::{LoginRelay, LoginService, OAuthRelay};
use crate::state::{AppState, BackendStatus};
use crate::watch::ConnectivityWatch;

/// Validate config, initialize every subsystem and return a fully-wired
/// [`AppState`].
pub fn build_app_state(config: Arc<Config>, secure_cookies: bool) -> anyhow::Result<AppState> {
    validate_config(&config)?;

    let backend = HttpBackend::from_config(&config.backend).context("creating backend client")?;
    tracing::info!(url = %backend.base_url(), "backend client ready");

    let relay = OAuthRelay::from_config(&config.login).context("initializing login relay")?;

    Ok(build_app_state_with(
        config,
        Arc::new(backend),
        Arc::new(relay),
        secure_cookies,
    ))
}

/// Wire an [`AppState`] around the given backend and login relay.
pub fn build_app_state_with(
    config: Arc<Config>,
    backend: Arc<dyn BackendClient>,
    relay: Arc<dyn LoginRelay>,
    secure_cookies: bool,
) -> AppState {
    // ── Basic-auth gate ──────────────────────────────────────────────
    let gate = Arc::new(BasicAuthGate::from_config(&config.auth));
    tracing::info!(
        protected = ?config.auth.protected_paths,
        open = gate.is_open(),
        "basic-auth gate ready"
    );

    // ── Sessions ─────────────────────────────────────────────────────
    let secret = match std::env::var(&config.sessions.secret_env) {
        Ok(s) if !s.is_empty() => s.into_bytes(),
        _ => {
            tracing::warn!(
                env = %config.sessions.secret_env,
                "session secret not set, generated a per-process secret"
            );
            TokenSigner::random_secret()
        }
    };
    let sessions = Arc::new(SessionManager::new(SessionSettings::from_config(
        &config.sessions,
        secret,
    )));

    // ── Delegated login ──────────────────────────────────────────────
    let login = Arc::new(LoginService::new(
        relay,
        Duration::from_secs(config.login.state_ttl_secs),
        config.login.max_pending,
    ));

    // ── Channel ──────────────────────────────────────────────────────
    let hub = Arc::new(EventHub::new(config.channel.event_buffer.max(1)));
    let visibility = Arc::new(VisibilityPolicy::from_config(&config.channel));

    AppState {
        config,
        shutdown: CancellationToken::new(),
        gate,
        sessions,
        login,
        secure_cookies,
        backend,
        hub,
        backend_status: Arc::new(RwLock::new(BackendStatus::default())),
        channels: Arc::new(ChannelRegistry::new()),
        visibility,
    }
}

fn validate_config(config: &Config) -> anyhow::Result<()> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }
    Ok(())
}

/// Spawn the periodic background loops.  Every loop stops when
/// `state.shutdown` is cancelled.
pub fn spawn_background_tasks(state: &AppState) {
    // ── Session and login-state pruning ─────────────────────────────
    {
        let sessions = state.sessions.clone();
        let login = state.login.clone();
        let cancel = state.shutdown.clone();
        let every = Duration::from_secs(state.config.sessions.prune_interval_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }
                sessions.prune_expired();
                let stale = login.prune_expired();
                if stale > 0 {
                    tracing::debug!(removed = stale, "expired login states pruned");
                }
            }
        });
    }

    // ── Backend log tail ─────────────────────────────────────────────
    if let Some(path) = &state.config.backend.log_file {
        let tailer = LogTailer::new(
            path.clone(),
            Duration::from_millis(state.config.backend.log_poll_ms.max(10)),
            state.config.channel.limited_log_levels.iter().cloned(),
            state.hub.clone(),
        );
        tokio::spawn(tailer.run(state.shutdown.clone()));
    } else {
        tracing::info!("no backend log file configured, log streaming disabled");
    }

    // ── Backend connectivity watch ───────────────────────────────────
    tokio::spawn(ConnectivityWatch::from_state(state).run(state.shutdown.clone()));

    tracing::info!("background tasks spawned");
}
