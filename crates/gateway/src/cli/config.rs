use std::path::Path;

use ng_domain::config::{Config, ConfigSeverity};

/// Validate the config, printing any issues.  Returns `false` when errors
/// are found.
pub fn validate(config: &Config, config_path: &Path) -> bool {
    let issues = config.validate();

    if issues.is_empty() {
        println!("Config OK ({})", config_path.display());
        return true;
    }

    let error_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();
    let warning_count = issues.len() - error_count;

    for issue in &issues {
        println!("{issue}");
    }

    println!(
        "\n{error_count} error(s), {warning_count} warning(s) in {}",
        config_path.display()
    );

    error_count == 0
}

/// Render the resolved config (defaults filled in, secrets redacted) as
/// TOML.
pub fn show(config: &Config) -> anyhow::Result<String> {
    Ok(toml::to_string_pretty(&config.redacted())?)
}

#[cfg(test)]
mod tests {
    use ng_domain::config::CredentialConfig;

    use super::*;

    #[test]
    fn show_hides_passwords() {
        let mut config = Config::default();
        config.auth.full = Some(CredentialConfig {
            username: "admin".into(),
            password: "hunter2".into(),
        });
        let out = show(&config).unwrap();
        assert!(out.contains("admin"));
        assert!(!out.contains("hunter2"));
    }

    #[test]
    fn defaults_validate() {
        assert!(validate(&Config::default(), Path::new("config.toml")));
    }
}
