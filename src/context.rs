//! Navigation context helpers used by route guards.
//!
//! These answer "where did the user land and what should happen next" from
//! the current URL alone, without touching the network.

use reqwest::Url;
use serde::Serialize;

use crate::error::AuthError;
use crate::oauth::{AuthorizationOptions, SessionManager};

const SOCIAL_HOST_MARKERS: [&str; 2] = [".campaigns", "conversations."];
const CAMPAIGNS_HOST_MARKER: &str = ".campaigns.";
const LOGIN_TOKEN_PARAM: &str = "login_token";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Public,
    Social,
    Broker,
}

impl Role {
    /// A fetched broker profile wins; an authorized user on a social-login
    /// host is `Social`; everyone else is `Public`.
    pub fn derive(has_broker_profile: bool, is_authorized: bool, is_social: bool) -> Self {
        if has_broker_profile {
            Role::Broker
        } else if is_authorized && is_social {
            Role::Social
        } else {
            Role::Public
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Public => "public",
            Role::Social => "social",
            Role::Broker => "broker",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn is_social_login_url(url: &Url) -> bool {
    let host = url.host_str().unwrap_or_default();
    SOCIAL_HOST_MARKERS.iter().any(|marker| host.contains(marker))
}

pub fn is_campaigns_url(url: &Url) -> bool {
    url.host_str()
        .is_some_and(|host| host.contains(CAMPAIGNS_HOST_MARKER))
}

/// True when the URL carries an authorization response (`code`, `scope` and
/// `state` all present).
pub fn is_returning_from_sso(url: &Url) -> bool {
    let (mut code, mut scope, mut state) = (false, false, false);
    for (key, _) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = true,
            "scope" => scope = true,
            "state" => state = true,
            _ => {}
        }
    }
    code && scope && state
}

pub fn login_token(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == LOGIN_TOKEN_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// What [`handle_landing`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Landing {
    /// Authorization response processed; the user was sent to this URL.
    Completed(Url),
    /// A login token started a new authorization at this URL.
    Redirected(Url),
    Ignored,
}

/// Dispatch on a freshly loaded location: finish a pending login, start one
/// from a login token, or do nothing.
pub async fn handle_landing(session: &SessionManager, url: &Url) -> Result<Landing, AuthError> {
    if is_returning_from_sso(url) {
        tracing::debug!("landing carries an authorization response");
        let target = session.complete_authorization().await?;
        return Ok(Landing::Completed(target));
    }
    if let Some(token) = login_token(url) {
        tracing::debug!("landing carries a login token");
        let target = session.begin_authorization(AuthorizationOptions::with_login_token(token))?;
        return Ok(Landing::Redirected(target));
    }
    Ok(Landing::Ignored)
}
