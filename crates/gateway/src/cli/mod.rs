pub mod config;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use ng_domain::config::{Config, CredentialConfig};

/// nodegate: an authenticating gateway in front of a payment node.
#[derive(Debug, Parser)]
#[command(name = "nodegate", version, about)]
pub struct Cli {
    /// Path to the TOML config file.
    #[arg(long, env = "NG_CONFIG", default_value = "config.toml", global = true)]
    pub config: PathBuf,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default, Args)]
pub struct Overrides {
    /// Username of the full-access tier.
    #[arg(long, global = true)]
    pub full_user: Option<String>,
    /// Password of the full-access tier.
    #[arg(long, global = true)]
    pub full_password: Option<String>,
    /// Username of the limited tier.
    #[arg(long, global = true)]
    pub limited_user: Option<String>,
    /// Password of the limited tier.
    #[arg(long, global = true)]
    pub limited_password: Option<String>,
    /// Directory holding key.pem and cert.pem; enables TLS.
    #[arg(long, global = true)]
    pub tls_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    pub host: Option<String>,
    #[arg(long, global = true)]
    pub port: Option<u16>,
    /// `host:port` of the backend node's control API.
    #[arg(long, global = true)]
    pub backend_host: Option<String>,
    /// Backend log file streamed to channel clients.
    #[arg(long, global = true)]
    pub backend_log_file: Option<PathBuf>,
    /// Also write gateway logs to this file.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway (default when no subcommand is given).
    Serve,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML, secrets
    /// redacted.
    Show,
}

impl Overrides {
    /// Apply every flag that was given on top of `config`.
    pub fn apply(&self, config: &mut Config) -> anyhow::Result<()> {
        config.auth.full = merge_tier(
            "full",
            config.auth.full.take(),
            &self.full_user,
            &self.full_password,
        )?;
        config.auth.limited = merge_tier(
            "limited",
            config.auth.limited.take(),
            &self.limited_user,
            &self.limited_password,
        )?;

        if let Some(dir) = &self.tls_dir {
            config.server.tls_dir = Some(dir.clone());
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = &self.backend_host {
            config.backend.host = host.clone();
        }
        if let Some(path) = &self.backend_log_file {
            config.backend.log_file = Some(path.clone());
        }
        if let Some(path) = &self.log_file {
            config.logging.file = Some(path.clone());
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        Ok(())
    }
}

/// A tier given on the command line needs both halves unless the config
/// file already supplies the other one.
fn merge_tier(
    tier: &str,
    existing: Option<CredentialConfig>,
    user: &Option<String>,
    password: &Option<String>,
) -> anyhow::Result<Option<CredentialConfig>> {
    match (existing, user, password) {
        (existing, None, None) => Ok(existing),
        (_, Some(u), Some(p)) => Ok(Some(CredentialConfig {
            username: u.clone(),
            password: p.clone(),
        })),
        (Some(mut c), u, p) => {
            if let Some(u) = u {
                c.username = u.clone();
            }
            if let Some(p) = p {
                c.password = p.clone();
            }
            Ok(Some(c))
        }
        (None, _, _) => anyhow::bail!("--{tier}-user and --{tier}-password must be given together"),
    }
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the config file named by `--config` / `NG_CONFIG` and apply the
/// command-line overrides.  A missing file yields the defaults.
pub fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::load(&cli.config)
        .map_err(|e| anyhow::anyhow!("loading {}: {e}", cli.config.display()))?;
    cli.overrides.apply(&mut config)?;
    Ok(config)
}
