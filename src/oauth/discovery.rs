use reqwest::Url;
use serde::Deserialize;

use crate::error::AuthError;

/// Authorization server metadata from OIDC discovery.
///
/// Fetched once per session lifetime and never mutated afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub revocation_endpoint: Option<String>,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
    #[serde(default)]
    pub scopes_supported: Vec<String>,
    #[serde(default)]
    pub code_challenge_methods_supported: Vec<String>,
}

impl AuthorizationServerMetadata {
    pub fn authorization_url(&self) -> Result<Url, AuthError> {
        parse_endpoint("authorization_endpoint", &self.authorization_endpoint)
    }

    pub fn token_url(&self) -> Result<Url, AuthError> {
        parse_endpoint("token_endpoint", &self.token_endpoint)
    }

    pub fn revocation_url(&self) -> Result<Option<Url>, AuthError> {
        self.revocation_endpoint
            .as_deref()
            .map(|e| parse_endpoint("revocation_endpoint", e))
            .transpose()
    }

    pub fn userinfo_url(&self) -> Result<Option<Url>, AuthError> {
        self.userinfo_endpoint
            .as_deref()
            .map(|e| parse_endpoint("userinfo_endpoint", e))
            .transpose()
    }
}

fn parse_endpoint(name: &str, value: &str) -> Result<Url, AuthError> {
    Url::parse(value).map_err(|e| AuthError::Discovery(format!("Invalid {name} '{value}': {e}")))
}

/// Issuer identifiers compare equal regardless of a trailing slash.
pub(crate) fn same_issuer(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}

/// Construct the OIDC discovery URL, keeping any issuer path.
fn build_discovery_url(issuer: &str) -> String {
    format!(
        "{}/.well-known/openid-configuration",
        issuer.trim_end_matches('/')
    )
}

pub async fn discover_metadata(
    http: &reqwest::Client,
    issuer: &str,
) -> Result<AuthorizationServerMetadata, AuthError> {
    let url = build_discovery_url(issuer);
    tracing::debug!(%url, "discovering authorization server");
    let resp = http.get(&url).send().await.map_err(|e| {
        AuthError::Discovery(format!("Failed to fetch metadata from {url}: {e}"))
    })?;

    if !resp.status().is_success() {
        return Err(AuthError::Discovery(format!(
            "Discovery endpoint returned status {}",
            resp.status()
        )));
    }

    let metadata: AuthorizationServerMetadata = resp
        .json()
        .await
        .map_err(|e| AuthError::Discovery(format!("Failed to parse metadata: {e}")))?;

    if !same_issuer(&metadata.issuer, issuer) {
        return Err(AuthError::Discovery(format!(
            "Issuer mismatch: expected '{issuer}', server reported '{}'",
            metadata.issuer
        )));
    }

    metadata.authorization_url()?;
    metadata.token_url()?;
    metadata.revocation_url()?;

    if !metadata.code_challenge_methods_supported.is_empty()
        && !metadata
            .code_challenge_methods_supported
            .iter()
            .any(|m| m == super::pkce::CODE_CHALLENGE_METHOD)
    {
        tracing::warn!(
            methods = ?metadata.code_challenge_methods_supported,
            "authorization server does not advertise S256 PKCE"
        );
    }

    Ok(metadata)
}
