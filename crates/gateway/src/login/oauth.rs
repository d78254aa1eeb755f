//! OAuth2 authorization-code relay over `reqwest`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use ng_domain::config::{LoginConfig, OAuthProviderConfig};
use ng_sessions::Identity;

use super::{LoginError, LoginRelay};

struct Provider {
    cfg: OAuthProviderConfig,
    client_secret: String,
}

pub struct OAuthRelay {
    http: reqwest::Client,
    providers: HashMap<String, Provider>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl OAuthRelay {
    /// Providers whose client secret env var is unset are skipped with a
    /// warning.
    pub fn from_config(cfg: &LoginConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        let mut providers = HashMap::new();
        for (name, provider) in &cfg.providers {
            match std::env::var(&provider.client_secret_env) {
                Ok(secret) if !secret.is_empty() => {
                    tracing::info!(provider = %name, "login provider ready");
                    providers.insert(
                        name.clone(),
                        Provider {
                            cfg: provider.clone(),
                            client_secret: secret,
                        },
                    );
                }
                _ => tracing::warn!(
                    provider = %name,
                    env = %provider.client_secret_env,
                    "client secret not set, login provider disabled"
                ),
            }
        }
        Ok(Self { http, providers })
    }

    fn provider(&self, name: &str) -> Result<&Provider, LoginError> {
        self.providers
            .get(name)
            .ok_or_else(|| LoginError::UnknownProvider(name.to_owned()))
    }
}

#[async_trait]
impl LoginRelay for OAuthRelay {
    fn authorize_url(&self, provider: &str, state: &str) -> Result<String, LoginError> {
        let p = self.provider(provider)?;
        let mut params = vec![
            ("response_type", "code"),
            ("client_id", p.cfg.client_id.as_str()),
            ("redirect_uri", p.cfg.redirect_uri.as_str()),
            ("state", state),
        ];
        if let Some(scope) = &p.cfg.scope {
            params.push(("scope", scope.as_str()));
        }
        reqwest::Url::parse_with_params(&p.cfg.authorize_url, &params)
            .map(String::from)
            .map_err(|e| LoginError::Exchange(format!("authorize_url: {e}")))
    }

    async fn exchange(&self, provider: &str, code: &str) -> Result<Identity, LoginError> {
        let p = self.provider(provider)?;

        let token: TokenResponse = self
            .http
            .post(&p.cfg.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", p.cfg.redirect_uri.as_str()),
                ("client_id", p.cfg.client_id.as_str()),
                ("client_secret", p.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| LoginError::Exchange(e.to_string()))?
            .json()
            .await
            .map_err(|e| LoginError::Exchange(e.to_string()))?;

        let access_token = match (token.access_token, token.error) {
            (Some(t), _) => t,
            (None, Some(err)) => return Err(LoginError::Denied(err)),
            (None, None) => return Err(LoginError::Exchange("no access_token".into())),
        };

        let profile: Value = self
            .http
            .get(&p.cfg.userinfo_url)
            .bearer_auth(&access_token)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| LoginError::Exchange(e.to_string()))?
            .json()
            .await
            .map_err(|e| LoginError::Exchange(e.to_string()))?;

        identity_from_profile(provider, &p.cfg, &profile)
    }
}

/// Pull subject and display name out of a userinfo document with the
/// configured JSON pointers.
pub fn identity_from_profile(
    provider: &str,
    cfg: &OAuthProviderConfig,
    profile: &Value,
) -> Result<Identity, LoginError> {
    let subject = match profile.pointer(&cfg.subject_pointer) {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(LoginError::MissingSubject(cfg.subject_pointer.clone())),
    };
    let name = cfg
        .name_pointer
        .as_deref()
        .and_then(|ptr| profile.pointer(ptr))
        .and_then(Value::as_str)
        .map(str::to_owned);

    Ok(Identity {
        provider: provider.to_owned(),
        subject,
        name,
    })
}
