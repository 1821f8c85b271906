//! OAuth session manager.
//!
//! Owns the token store and drives the authorization-code + PKCE, refresh
//! and revocation flows against a discovered authorization server. One
//! instance is built per process and shared behind an `Arc`; nothing here
//! is global.
//!
//! Concurrent `refresh` calls are not deduplicated: two requests that hit an
//! expired token at the same time each run their own refresh grant, and the
//! last write wins.
//!
//! `refresh` runs its whole retry loop before returning, so a caller that
//! awaits it (the request client does) waits for every attempt and delay
//! when the token endpoint keeps failing. Callers that want one attempt use
//! `try_refresh`.
//!
//! Flows may overlap. While any flow runs, `state()` reports the phase
//! entered most recently; it returns to `Ready` once the last one finishes.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use reqwest::Url;

use crate::error::AuthError;
use crate::events::AuthEvents;
use crate::navigator::Navigator;
use crate::oauth::discovery::{discover_metadata, AuthorizationServerMetadata};
use crate::oauth::pkce::{generate_pkce, generate_state_nonce, CODE_CHALLENGE_METHOD};
use crate::oauth::state::{
    compose_state, resolve_return_target, return_path_from_state, validate_callback,
    PendingAuthorizationState,
};
use crate::oauth::store::TokenStore;
use crate::oauth::token::{exchange_code, refresh_grant, revoke_token, TokenPair};
use crate::storage::KeyValueStore;

const RESPONSE_TYPE: &str = "code";
const CHANGE_BROKER_ACTION: &str = "CHANGE_BROKER";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Discovering,
    Ready,
    RedirectingOut,
    ExchangingCode,
    Refreshing,
    Revoking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshRetryPolicy {
    /// Total refresh attempts before giving up.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub delay: Duration,
}

impl Default for RefreshRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Client registration and flow parameters.
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub issuer: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub refresh_retry: RefreshRetryPolicy,
}

impl OAuthSettings {
    pub fn new(
        client_id: impl Into<String>,
        issuer: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            issuer: issuer.into(),
            redirect_uri: redirect_uri.into(),
            scopes: default_scopes(),
            refresh_retry: RefreshRetryPolicy::default(),
        }
    }

    fn requests_openid(&self) -> bool {
        self.scopes.iter().any(|s| s == "openid")
    }
}

pub fn default_scopes() -> Vec<String> {
    vec!["offline".into(), "openid".into(), "api".into()]
}

/// Options for [`SessionManager::begin_authorization`].
#[derive(Debug, Clone, Default)]
pub struct AuthorizationOptions {
    /// Where to land after login. Defaults to the current path.
    pub return_path: Option<String>,
    /// Switch the session to another broker (needs a stored id token).
    pub target_broker_id: Option<String>,
    /// Pre-authenticated social login token. Wins over `target_broker_id`.
    pub login_token: Option<String>,
}

impl AuthorizationOptions {
    pub fn return_to(path: impl Into<String>) -> Self {
        Self {
            return_path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn with_login_token(token: impl Into<String>) -> Self {
        Self {
            login_token: Some(token.into()),
            ..Default::default()
        }
    }

    pub fn change_broker(broker_id: impl Into<String>) -> Self {
        Self {
            target_broker_id: Some(broker_id.into()),
            ..Default::default()
        }
    }
}

struct Lifecycle {
    state: SessionState,
    metadata: Option<Arc<AuthorizationServerMetadata>>,
    active_phases: u32,
}

pub struct SessionManager {
    settings: OAuthSettings,
    http: reqwest::Client,
    store: TokenStore,
    navigator: Arc<dyn Navigator>,
    lifecycle: Mutex<Lifecycle>,
    refresh_retries: AtomicU32,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("settings", &self.settings)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Marks a flow phase for its duration. The last phase to end puts the
/// session back to `Ready`.
struct Phase<'a> {
    session: &'a SessionManager,
}

impl Drop for Phase<'_> {
    fn drop(&mut self) {
        let mut lifecycle = self.session.lifecycle();
        lifecycle.active_phases = lifecycle.active_phases.saturating_sub(1);
        if lifecycle.active_phases == 0 && lifecycle.metadata.is_some() {
            lifecycle.state = SessionState::Ready;
        }
    }
}

impl SessionManager {
    pub fn new(
        settings: OAuthSettings,
        storage: Arc<dyn KeyValueStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            settings,
            http: reqwest::Client::new(),
            store: TokenStore::new(storage, AuthEvents::new()),
            navigator,
            lifecycle: Mutex::new(Lifecycle {
                state: SessionState::Uninitialized,
                metadata: None,
                active_phases: 0,
            }),
            refresh_retries: AtomicU32::new(0),
        }
    }

    /// Share an existing event hub instead of creating a private one.
    pub fn with_events(mut self, events: AuthEvents) -> Self {
        self.store = TokenStore::new(self.store.backing(), events);
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn settings(&self) -> &OAuthSettings {
        &self.settings
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn events(&self) -> &AuthEvents {
        self.store.events()
    }

    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle().state
    }

    /// Consecutive failed refresh attempts in the current retry cycle.
    pub fn refresh_retries(&self) -> u32 {
        self.refresh_retries.load(Ordering::SeqCst)
    }

    pub fn metadata(&self) -> Result<Arc<AuthorizationServerMetadata>, AuthError> {
        self.lifecycle()
            .metadata
            .clone()
            .ok_or(AuthError::NotInitialized)
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn enter(
        &self,
        phase: SessionState,
    ) -> Result<(Arc<AuthorizationServerMetadata>, Phase<'_>), AuthError> {
        let mut lifecycle = self.lifecycle();
        let metadata = lifecycle.metadata.clone().ok_or(AuthError::NotInitialized)?;
        lifecycle.state = phase;
        lifecycle.active_phases += 1;
        tracing::debug!(?phase, active = lifecycle.active_phases, "entering session phase");
        Ok((metadata, Phase { session: self }))
    }

    /// Discover the authorization server. Runs once; a second call fails.
    pub async fn initialize(&self) -> Result<(), AuthError> {
        {
            let mut lifecycle = self.lifecycle();
            if lifecycle.state != SessionState::Uninitialized {
                return Err(AuthError::AlreadyInitialized);
            }
            lifecycle.state = SessionState::Discovering;
        }

        match discover_metadata(&self.http, &self.settings.issuer).await {
            Ok(metadata) => {
                let mut lifecycle = self.lifecycle();
                if lifecycle.state != SessionState::Discovering {
                    // torn down while discovery was in flight
                    return Err(AuthError::NotInitialized);
                }
                tracing::info!(issuer = %metadata.issuer, "authorization server discovered");
                lifecycle.metadata = Some(Arc::new(metadata));
                lifecycle.state = SessionState::Ready;
                Ok(())
            }
            Err(e) => {
                self.lifecycle().state = SessionState::Uninitialized;
                Err(e)
            }
        }
    }

    /// Forget the discovered server. Stored tokens are left untouched.
    pub fn teardown(&self) {
        let mut lifecycle = self.lifecycle();
        lifecycle.metadata = None;
        lifecycle.state = SessionState::Uninitialized;
        lifecycle.active_phases = 0;
        self.refresh_retries.store(0, Ordering::SeqCst);
    }

    pub fn get_tokens(&self) -> Option<TokenPair> {
        self.store.read()
    }

    pub fn is_authorized(&self) -> bool {
        self.store.is_authorized()
    }

    /// Store a token obtained outside the OAuth flow (captcha social login).
    pub fn set_social_login_token(&self, access_token: &str) -> Result<(), AuthError> {
        self.store.write(&TokenPair::access_only(access_token))
    }

    /// Build the authorization URL, persist the pending state and navigate
    /// out. Returns the URL navigated to.
    pub fn begin_authorization(&self, options: AuthorizationOptions) -> Result<Url, AuthError> {
        let (metadata, _phase) = self.enter(SessionState::RedirectingOut)?;

        let pkce = generate_pkce();
        let return_path = options
            .return_path
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| self.navigator.current_url().path().to_string());
        let random_state = compose_state(&generate_state_nonce(), &return_path);

        let mut url = metadata.authorization_url()?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.settings.client_id)
                .append_pair("code_challenge", &pkce.code_challenge)
                .append_pair("code_challenge_method", CODE_CHALLENGE_METHOD)
                .append_pair("redirect_uri", &self.settings.redirect_uri)
                .append_pair("response_type", RESPONSE_TYPE)
                .append_pair("scope", &self.settings.scopes.join(" "))
                .append_pair("state", &random_state);

            let login_token = options.login_token.filter(|t| !t.is_empty());
            let broker_id = options.target_broker_id.filter(|b| !b.is_empty());
            if let Some(login_token) = login_token {
                query.append_pair("login_token", &login_token);
            } else if let Some(broker_id) = broker_id {
                match self.get_tokens().and_then(|t| t.id_token) {
                    Some(id_token) => {
                        query
                            .append_pair("broker_id", &broker_id)
                            .append_pair("id_token", &id_token)
                            .append_pair("action", CHANGE_BROKER_ACTION);
                    }
                    None => tracing::warn!(
                        %broker_id,
                        "broker switch requested without an id token, starting a plain login"
                    ),
                }
            }
        }

        self.store.save_pending(&PendingAuthorizationState {
            random_state,
            code_verifier: pkce.code_verifier,
        })?;

        tracing::debug!(%url, "redirecting to authorization server");
        self.navigator.assign(&url);
        Ok(url)
    }

    /// Process the authorization response in the current location, persist
    /// the tokens and navigate back to the recorded return path.
    pub async fn complete_authorization(&self) -> Result<Url, AuthError> {
        let (metadata, _phase) = self.enter(SessionState::ExchangingCode)?;

        let pending = self.store.take_pending()?.ok_or(AuthError::NoPendingState)?;
        let current = self.navigator.current_url();
        let callback = validate_callback(&current, &pending.random_state, &metadata.issuer)?;

        let token_url = metadata.token_url()?;
        let response = exchange_code(
            &self.http,
            &token_url,
            &self.settings.client_id,
            &callback.code,
            &pending.code_verifier,
            &self.settings.redirect_uri,
        )
        .await?;

        if self.settings.requests_openid() && response.id_token.is_none() {
            return Err(AuthError::AuthorizationExchange(
                "Token response is missing the id_token for an openid request".to_string(),
            ));
        }

        self.store.write(&response.into_pair())?;

        let target = resolve_return_target(&current, return_path_from_state(&callback.state));
        tracing::info!(%target, "authorization completed");
        self.navigator.replace(&target);
        Ok(target)
    }

    /// Refresh the token pair, absorbing failures.
    ///
    /// A missing refresh token is a no-op. Failed grants are retried with a
    /// fixed delay up to the policy's attempt count, after which the retry
    /// counter resets and the call returns `Ok(())`. Only a session that was
    /// never initialized surfaces an error.
    pub async fn refresh(&self) -> Result<(), AuthError> {
        self.metadata()?;
        let policy = self.settings.refresh_retry;

        loop {
            match self.try_refresh().await {
                Ok(()) => {
                    self.refresh_retries.store(0, Ordering::SeqCst);
                    return Ok(());
                }
                Err(AuthError::NotInitialized) => return Err(AuthError::NotInitialized),
                Err(e) => {
                    let attempts = self.refresh_retries.fetch_add(1, Ordering::SeqCst) + 1;
                    if attempts >= policy.max_attempts {
                        tracing::warn!(attempts, "giving up on token refresh: {e}");
                        self.refresh_retries.store(0, Ordering::SeqCst);
                        return Ok(());
                    }
                    tracing::warn!(attempts, "token refresh failed, retrying: {e}");
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }

    /// Single refresh-grant attempt that surfaces its error.
    pub async fn try_refresh(&self) -> Result<(), AuthError> {
        let (metadata, _phase) = self.enter(SessionState::Refreshing)?;

        let Some(refresh_token) = self.store.read().and_then(|t| t.refresh_token) else {
            tracing::debug!("no refresh token held, skipping refresh");
            return Ok(());
        };

        let token_url = metadata.token_url()?;
        let response =
            refresh_grant(&self.http, &token_url, &self.settings.client_id, &refresh_token)
                .await?;
        self.store.write(&response.into_pair())?;
        tracing::debug!("token pair refreshed");
        Ok(())
    }

    /// Revoke the access token at the server, then clear local tokens no
    /// matter how the revocation went.
    pub async fn revoke(&self) -> Result<(), AuthError> {
        let (metadata, _phase) = self.enter(SessionState::Revoking)?;

        let outcome = match self.store.read() {
            Some(tokens) if !tokens.access_token.is_empty() => match metadata.revocation_url() {
                Ok(Some(url)) => {
                    revoke_token(&self.http, &url, &self.settings.client_id, &tokens.access_token)
                        .await
                }
                Ok(None) => {
                    tracing::warn!("authorization server has no revocation endpoint");
                    Ok(())
                }
                Err(e) => Err(e),
            },
            _ => Ok(()),
        };

        self.store.clear()?;
        if let Err(ref e) = outcome {
            tracing::warn!("revocation failed, local tokens cleared anyway: {e}");
        }
        outcome
    }
}
