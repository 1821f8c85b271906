//! Pending authorization state and callback validation.
//!
//! The `state` parameter doubles as the carrier of the user's pre-login
//! location: it is `<nonce>:<return path>`. The nonce is base64url and never
//! contains the delimiter, so splitting on the first `:` recovers the path
//! intact even when the path itself contains colons.

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::oauth::discovery::same_issuer;

pub const STATE_DELIMITER: char = ':';

/// The minimal record persisted across the authorization redirect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAuthorizationState {
    pub random_state: String,
    pub code_verifier: String,
}

pub fn compose_state(nonce: &str, return_path: &str) -> String {
    format!("{nonce}{STATE_DELIMITER}{return_path}")
}

/// Return path embedded in a correlation value, if any.
pub fn return_path_from_state(state: &str) -> Option<&str> {
    state
        .split_once(STATE_DELIMITER)
        .map(|(_, path)| path)
        .filter(|path| !path.is_empty())
}

/// Validated parameters of an authorization response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCallback {
    pub code: String,
    pub state: String,
}

/// Check a redirect URL against the correlation value stored before the
/// redirect.
///
/// Integrity failures (wrong issuer, missing or mismatched state) are
/// `CsrfValidation`; an error response from the authorization server or a
/// response without a code is `AuthorizationExchange`.
pub fn validate_callback(
    url: &Url,
    expected_state: &str,
    issuer: &str,
) -> Result<AuthorizationCallback, AuthError> {
    let param = |name: &str| {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    };

    if let Some(iss) = param("iss") {
        if !same_issuer(&iss, issuer) {
            return Err(AuthError::CsrfValidation(format!(
                "Unexpected issuer '{iss}' in authorization response"
            )));
        }
    }

    if url.query_pairs().filter(|(k, _)| k == "state").count() > 1 {
        return Err(AuthError::CsrfValidation(
            "Multiple state parameters in authorization response".to_string(),
        ));
    }

    let state = param("state").ok_or_else(|| {
        AuthError::CsrfValidation("Authorization response is missing the state parameter".into())
    })?;
    if state != expected_state {
        return Err(AuthError::CsrfValidation(
            "State parameter does not match the pending authorization".to_string(),
        ));
    }

    if let Some(error) = param("error") {
        let description = param("error_description")
            .map(|d| format!(": {d}"))
            .unwrap_or_default();
        return Err(AuthError::AuthorizationExchange(format!(
            "Authorization server returned '{error}'{description}"
        )));
    }

    let code = param("code").filter(|c| !c.is_empty()).ok_or_else(|| {
        AuthError::AuthorizationExchange("Authorization response has no code".to_string())
    })?;

    Ok(AuthorizationCallback { code, state })
}

/// Resolve the post-login navigation target on the current origin.
///
/// Only absolute paths are honoured; anything else (including
/// protocol-relative `//host` values) falls back to the current path so a
/// crafted state can never redirect off-site.
pub fn resolve_return_target(current: &Url, return_path: Option<&str>) -> Url {
    let mut base = current.clone();
    base.set_query(None);
    base.set_fragment(None);

    match return_path.filter(|p| p.starts_with('/') && !p.starts_with("//")) {
        Some(path) => base.join(path).unwrap_or(base),
        None => base,
    }
}
