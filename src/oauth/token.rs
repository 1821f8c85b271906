use reqwest::header::WWW_AUTHENTICATE;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// The live credentials of a session.
///
/// Persisted as `{"accessToken", "refreshToken", "idToken"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl TokenPair {
    pub fn access_only(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            id_token: None,
        }
    }
}

/// Raw token endpoint response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    pub fn into_pair(self) -> TokenPair {
        TokenPair {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            id_token: self.id_token,
        }
    }
}

/// RFC 6749 §5.2 error body.
#[derive(Debug, Deserialize)]
struct OAuth2ErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

pub async fn exchange_code(
    http: &reqwest::Client,
    token_url: &Url,
    client_id: &str,
    code: &str,
    code_verifier: &str,
    redirect_uri: &str,
) -> Result<TokenResponse, AuthError> {
    let resp = http
        .post(token_url.clone())
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", code_verifier),
            ("redirect_uri", redirect_uri),
            ("client_id", client_id),
        ])
        .send()
        .await
        .map_err(|e| AuthError::AuthorizationExchange(format!("Token request failed: {e}")))?;

    parse_token_response(resp, AuthError::AuthorizationExchange).await
}

pub async fn refresh_grant(
    http: &reqwest::Client,
    token_url: &Url,
    client_id: &str,
    refresh_token: &str,
) -> Result<TokenResponse, AuthError> {
    let resp = http
        .post(token_url.clone())
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
        ])
        .send()
        .await
        .map_err(|e| AuthError::RefreshExchange(format!("Token refresh request failed: {e}")))?;

    parse_token_response(resp, AuthError::RefreshExchange).await
}

pub async fn revoke_token(
    http: &reqwest::Client,
    revocation_url: &Url,
    client_id: &str,
    token: &str,
) -> Result<(), AuthError> {
    let resp = http
        .post(revocation_url.clone())
        .form(&[
            ("token", token),
            ("token_type_hint", "access_token"),
            ("client_id", client_id),
        ])
        .send()
        .await
        .map_err(|e| AuthError::RevocationExchange(format!("Revocation request failed: {e}")))?;

    reject_challenges(&resp, AuthError::RevocationExchange)?;

    if !resp.status().is_success() {
        return Err(AuthError::RevocationExchange(describe_failure(resp).await));
    }
    Ok(())
}

async fn parse_token_response(
    resp: reqwest::Response,
    fail: fn(String) -> AuthError,
) -> Result<TokenResponse, AuthError> {
    reject_challenges(&resp, fail)?;

    if !resp.status().is_success() {
        return Err(fail(describe_failure(resp).await));
    }

    let body = resp
        .bytes()
        .await
        .map_err(|e| fail(format!("Failed to read token response: {e}")))?;
    let token: TokenResponse = serde_json::from_slice(&body)
        .map_err(|e| fail(format!("Malformed token response: {e}")))?;
    if token.access_token.is_empty() {
        return Err(fail("Token response has an empty access_token".to_string()));
    }
    Ok(token)
}

/// Any `WWW-Authenticate` challenge on a token endpoint response is fatal.
fn reject_challenges(
    resp: &reqwest::Response,
    fail: fn(String) -> AuthError,
) -> Result<(), AuthError> {
    let challenges: Vec<&str> = resp
        .headers()
        .get_all(WWW_AUTHENTICATE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    if challenges.is_empty() {
        return Ok(());
    }
    for challenge in &challenges {
        tracing::debug!(challenge, "authorization server challenge");
    }
    Err(fail(format!(
        "Authorization server responded with a challenge: {}",
        challenges.join(", ")
    )))
}

async fn describe_failure(resp: reqwest::Response) -> String {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<OAuth2ErrorBody>(&body) {
        Ok(err) => match err.error_description {
            Some(desc) => format!("{} ({desc}), status {status}", err.error),
            None => format!("{}, status {status}", err.error),
        },
        Err(_) => format!("status {status}: {body}"),
    }
}
