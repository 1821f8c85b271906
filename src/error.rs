use std::path::PathBuf;

use crate::client::ErrorResponse;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("OAuth session is not initialized. Call initialize() before starting a flow.")]
    NotInitialized,

    #[error("OAuth session was already initialized. Discovery runs once per session.")]
    AlreadyInitialized,

    #[error("Discovery failed: {0}")]
    Discovery(String),

    #[error("No pending authorization found in storage, the user might not be returning from the authorization server.")]
    NoPendingState,

    #[error("Callback validation failed: {0}")]
    CsrfValidation(String),

    #[error("Authorization code exchange failed: {0}")]
    AuthorizationExchange(String),

    #[error("Refresh token exchange failed: {0}")]
    RefreshExchange(String),

    #[error("Token revocation failed: {0}")]
    RevocationExchange(String),

    #[error("{}", format_resource_error(.status, .error))]
    ResourceRequest { status: u16, error: ErrorResponse },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Error in config {}: {detail}", path.display())]
    Config { path: PathBuf, detail: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_resource_error(status: &u16, error: &ErrorResponse) -> String {
    match (&error.msg, &error.detail) {
        (Some(msg), Some(detail)) => format!("Request failed with status {status}: {msg} ({detail})"),
        (Some(msg), None) => format!("Request failed with status {status}: {msg}"),
        (None, Some(detail)) => format!("Request failed with status {status}: {detail}"),
        (None, None) => format!("Request failed with status {status}"),
    }
}

impl AuthError {
    /// Error code string for structured JSON output.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::NotInitialized => "not_initialized",
            AuthError::AlreadyInitialized => "already_initialized",
            AuthError::Discovery(_) => "discovery_error",
            AuthError::NoPendingState => "no_pending_state",
            AuthError::CsrfValidation(_) => "csrf_validation",
            AuthError::AuthorizationExchange(_) => "authorization_exchange",
            AuthError::RefreshExchange(_) => "refresh_exchange",
            AuthError::RevocationExchange(_) => "revocation_exchange",
            AuthError::ResourceRequest { .. } => "resource_request",
            AuthError::Http(_) => "http_error",
            AuthError::Decode(_) => "decode_error",
            AuthError::Storage(_) => "storage_error",
            AuthError::Config { .. } => "config_error",
            AuthError::Io(_) => "io_error",
        }
    }

    /// HTTP status of a failed resource request, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::ResourceRequest { status, .. } => Some(*status),
            AuthError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        if let Some(status) = self.status() {
            obj.insert("status".into(), serde_json::Value::from(status));
        }
        if let AuthError::ResourceRequest { error, .. } = self {
            if let Ok(body) = serde_json::to_value(error) {
                obj.insert("response".into(), body);
            }
        }
        obj.insert("message".into(), serde_json::Value::String(self.to_string()));
        obj.insert("code".into(), serde_json::Value::String(self.code().to_string()));
        serde_json::json!({ "error": obj })
    }
}
