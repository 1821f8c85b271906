pub mod account;
pub mod auth;
pub mod output;
pub mod request;
pub mod status;

use std::sync::Arc;

use reqwest::Url;

use crate::client::ApiClient;
use crate::config::{load_config, AnnotatedConfig};
use crate::error::AuthError;
use crate::navigator::BrowserNavigator;
use crate::oauth::SessionManager;
use crate::storage::FileStore;

/// Everything a command needs: the loaded config, a session over the file
/// store and the browser-backed navigator it uses.
pub struct CliContext {
    pub config: AnnotatedConfig,
    pub session: Arc<SessionManager>,
    pub navigator: Arc<BrowserNavigator>,
}

impl CliContext {
    /// Load config and build an uninitialized session. Commands that talk to
    /// the authorization server call [`CliContext::initialize`].
    pub fn open(config_path: Option<&str>) -> Result<Self, AuthError> {
        let config = load_config(config_path)?;
        let cfg = &config.config;

        let mut start = parse_redirect(&config)?;
        start.set_path("/");
        start.set_query(None);

        let storage_dir = cfg.storage_dir.clone().unwrap_or_else(FileStore::default_dir);
        tracing::debug!(dir = %storage_dir.display(), "using file token storage");

        let navigator = Arc::new(BrowserNavigator::new(start));
        let session = Arc::new(SessionManager::new(
            cfg.oauth_settings(),
            Arc::new(FileStore::new(storage_dir)),
            navigator.clone(),
        ));

        Ok(Self {
            config,
            session,
            navigator,
        })
    }

    pub async fn initialize(&self) -> Result<(), AuthError> {
        self.session.initialize().await
    }

    pub fn redirect_uri(&self) -> Result<Url, AuthError> {
        parse_redirect(&self.config)
    }

    /// Authenticated client for the resource API.
    pub fn api_client(&self) -> Result<ApiClient, AuthError> {
        let base = self.require(self.config.config.api_base_url.as_deref(), "apiBaseUrl")?;
        ApiClient::new(base)?
            .with_session(self.session.clone())
            .with_default_headers(&self.config.config.default_headers)
    }

    /// Client for the auth API serving the captcha social login.
    pub fn auth_client(&self) -> Result<ApiClient, AuthError> {
        let base = self.require(
            self.config.config.auth_api_base_url(),
            "authApiBaseUrl (or apiBaseUrl)",
        )?;
        ApiClient::new(base)?
            .with_session(self.session.clone())
            .with_default_headers(&self.config.config.default_headers)
    }

    /// Bearer client rooted at the SSO host. Sends no default headers.
    pub fn sso_client(&self) -> Result<ApiClient, AuthError> {
        Ok(ApiClient::new(&self.config.config.sso_host)?.with_session(self.session.clone()))
    }

    fn require<'a>(&self, value: Option<&'a str>, key: &str) -> Result<&'a str, AuthError> {
        value.ok_or_else(|| AuthError::Config {
            path: self.config.source.clone(),
            detail: format!("{key} is not set"),
        })
    }
}

fn parse_redirect(config: &AnnotatedConfig) -> Result<Url, AuthError> {
    Url::parse(&config.config.redirect_uri).map_err(|e| AuthError::Config {
        path: config.source.clone(),
        detail: format!("redirectUri is not a valid URL: {e}"),
    })
}
