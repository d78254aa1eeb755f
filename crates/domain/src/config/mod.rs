mod auth;
mod backend;
mod channel;
mod logging;
mod login;
mod server;
mod sessions;

pub use auth::*;
pub use backend::*;
pub use channel::*;
pub use logging::*;
pub use login::*;
pub use server::*;
pub use sessions::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub login: LoginConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl ConfigError {
    fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl Config {
    /// Load a TOML config file.  A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Config::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))
    }

    /// Validate the configuration and return a list of issues.
    ///
    /// TLS material is deliberately not checked here: unreadable material
    /// is reported by the transport bootstrap, which aborts startup.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError::error("server.port", "port must be greater than 0"));
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError::error("server.host", "host must not be empty"));
        }
        if !self.server.channel_path.starts_with('/') {
            errors.push(ConfigError::error(
                "server.channel_path",
                "channel path must start with '/'",
            ));
        }

        // ── Credentials ──────────────────────────────────────────────
        for (tier, cred) in [("auth.full", &self.auth.full), ("auth.limited", &self.auth.limited)] {
            if let Some(cred) = cred {
                if cred.username.is_empty() {
                    errors.push(ConfigError::error(
                        format!("{tier}.username"),
                        "username must not be empty",
                    ));
                }
                if cred.password.is_empty() {
                    errors.push(ConfigError::error(
                        format!("{tier}.password"),
                        "password must not be empty",
                    ));
                }
            }
        }
        if !self.auth.has_credentials() {
            errors.push(ConfigError::warning(
                "auth",
                "no credentials configured; protected paths are served without authentication",
            ));
        }
        if let (Some(full), Some(limited)) = (&self.auth.full, &self.auth.limited) {
            if full.username == limited.username {
                errors.push(ConfigError::warning(
                    "auth.limited.username",
                    "limited and full tiers share a username",
                ));
            }
        }
        for (i, prefix) in self.auth.protected_paths.iter().enumerate() {
            if !prefix.starts_with('/') {
                errors.push(ConfigError::error(
                    format!("auth.protected_paths[{i}]"),
                    "path prefix must start with '/'",
                ));
            }
        }

        // ── Sessions & channel timers ────────────────────────────────
        if self.sessions.ttl_secs == 0 {
            errors.push(ConfigError::error("sessions.ttl_secs", "ttl must be greater than 0"));
        } else if self.sessions.ttl_secs > MAX_TTL_SECS {
            errors.push(ConfigError::error(
                "sessions.ttl_secs",
                format!("ttl must not exceed {MAX_TTL_SECS} seconds"),
            ));
        }
        if self.sessions.cookie_name.is_empty() {
            errors.push(ConfigError::error(
                "sessions.cookie_name",
                "cookie name must not be empty",
            ));
        }
        if self.channel.idle_timeout_secs == 0 {
            errors.push(ConfigError::error(
                "channel.idle_timeout_secs",
                "idle timeout must be greater than 0",
            ));
        }
        if self
            .channel
            .limited_topics
            .iter()
            .any(|t| t == "raw_log")
        {
            errors.push(ConfigError::error(
                "channel.limited_topics",
                "raw_log is only available to full access",
            ));
        }
        if self.channel.event_buffer == 0 || self.channel.outbound_buffer == 0 {
            errors.push(ConfigError::error(
                "channel",
                "event_buffer and outbound_buffer must be greater than 0",
            ));
        }

        // ── Backend ──────────────────────────────────────────────────
        if self.backend.host.is_empty() {
            errors.push(ConfigError::error("backend.host", "host must not be empty"));
        }
        if !matches!(self.backend.scheme.as_str(), "http" | "https") {
            errors.push(ConfigError::error(
                "backend.scheme",
                "scheme must be \"http\" or \"https\"",
            ));
        }

        // ── Login providers ──────────────────────────────────────────
        if self.login.state_ttl_secs == 0 || self.login.state_ttl_secs > MAX_TTL_SECS {
            errors.push(ConfigError::error(
                "login.state_ttl_secs",
                format!("state ttl must be between 1 and {MAX_TTL_SECS} seconds"),
            ));
        }
        if self.login.max_pending == 0 {
            errors.push(ConfigError::error(
                "login.max_pending",
                "max_pending must be greater than 0",
            ));
        }
        for (name, provider) in &self.login.providers {
            for (key, value) in [
                ("authorize_url", &provider.authorize_url),
                ("token_url", &provider.token_url),
                ("userinfo_url", &provider.userinfo_url),
                ("client_id", &provider.client_id),
                ("redirect_uri", &provider.redirect_uri),
            ] {
                if value.is_empty() {
                    errors.push(ConfigError::error(
                        format!("login.providers.{name}.{key}"),
                        "must not be empty",
                    ));
                }
            }
            if !provider.subject_pointer.starts_with('/') {
                errors.push(ConfigError::error(
                    format!("login.providers.{name}.subject_pointer"),
                    "must be a JSON pointer starting with '/'",
                ));
            }
        }

        errors
    }

    /// Copy of the config with every secret replaced, for display.
    pub fn redacted(&self) -> Config {
        let mut copy = self.clone();
        for cred in [&mut copy.auth.full, &mut copy.auth.limited].into_iter().flatten() {
            cred.password = "[REDACTED]".into();
        }
        copy
    }
}
