use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::oauth::session::default_scopes;
use crate::oauth::{OAuthSettings, RefreshRetryPolicy};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    pub client_id: String,
    /// Issuer URL of the SSO host.
    pub sso_host: String,
    pub redirect_uri: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// Resource API used by `get` and the broker profile lookup.
    #[serde(default)]
    pub api_base_url: Option<String>,
    /// Auth API serving the captcha social login. Falls back to `apiBaseUrl`.
    #[serde(default)]
    pub auth_api_base_url: Option<String>,
    #[serde(default)]
    pub default_headers: HashMap<String, String>,
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,
    #[serde(default)]
    pub refresh_retry: RefreshRetryConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    RefreshRetryPolicy::default().max_attempts
}

fn default_delay_ms() -> u64 {
    RefreshRetryPolicy::default().delay.as_millis() as u64
}

impl Default for RefreshRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

impl From<RefreshRetryConfig> for RefreshRetryPolicy {
    fn from(config: RefreshRetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            delay: Duration::from_millis(config.delay_ms),
        }
    }
}

impl AuthConfig {
    pub fn oauth_settings(&self) -> OAuthSettings {
        let mut settings =
            OAuthSettings::new(&self.client_id, &self.sso_host, &self.redirect_uri);
        settings.scopes = self.scopes.clone();
        settings.refresh_retry = self.refresh_retry.into();
        settings
    }

    pub fn auth_api_base_url(&self) -> Option<&str> {
        self.auth_api_base_url
            .as_deref()
            .or(self.api_base_url.as_deref())
    }
}

/// A loaded config and the file it came from.
#[derive(Debug, Clone)]
pub struct AnnotatedConfig {
    pub config: AuthConfig,
    pub source: PathBuf,
}
