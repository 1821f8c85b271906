//! Unverified access-token claims.
//!
//! The front-end only reads its own token to show who is logged in and which
//! broker they act for. Nothing here checks a signature; never base an
//! authorization decision on these claims.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JwtClaims {
    #[serde(default)]
    pub aud: serde_json::Value,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub jti: Option<String>,
    #[serde(default)]
    pub scp: Vec<String>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub ext: Option<BrokerClaims>,
}

/// Broker platform extension claims.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerClaims {
    pub bid: Option<String>,
    pub broker_plan: Option<String>,
    pub company_role: Option<String>,
    pub country: Option<String>,
    pub crm: Option<String>,
    pub did: Option<String>,
    pub email: Option<String>,
    pub language: Option<String>,
    pub locale: Option<String>,
    pub role: Option<String>,
    pub uid: Option<String>,
}

impl JwtClaims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    pub fn is_expired(&self) -> bool {
        match self.expires_at() {
            Some(expires) => Utc::now() >= expires,
            None => false,
        }
    }

    pub fn broker_id(&self) -> Option<&str> {
        self.ext.as_ref()?.bid.as_deref()
    }

    /// Distribution (broker office) id, the `did` extension claim.
    pub fn distribution_id(&self) -> Option<&str> {
        self.ext.as_ref()?.did.as_deref()
    }

    pub fn email(&self) -> Option<&str> {
        self.ext.as_ref()?.email.as_deref()
    }
}

/// Decode the payload segment of a compact JWT.
pub fn decode_claims(token: &str) -> Result<JwtClaims, AuthError> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_)) => payload,
        _ => return Err(AuthError::Decode("Token is not a compact JWT".to_string())),
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::Decode(format!("Invalid JWT payload encoding: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::Decode(format!("Invalid JWT payload: {e}")))
}
