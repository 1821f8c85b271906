//! Authenticated request client.
//!
//! Wraps a JSON-over-HTTPS resource API. Each call reads the token store
//! afresh for its bearer header, classifies any status >= 400 as an error
//! result, and reacts to the API's auth error discriminators:
//!
//! - `AUTHENTICATION_EXPIRED`: emit the expiry signal, refresh, retry once.
//! - `INVALID_TOKEN` / `NOT_AUTHENTICATED`: start a new authorization as a
//!   side effect; the failed result is still returned.
//!
//! Error results are values, not `Err`s. `Err` is reserved for transport and
//! decoding failures.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::events::AuthEvent;
use crate::oauth::{AuthorizationOptions, SessionManager};

pub const AUTHENTICATION_EXPIRED: &str = "AUTHENTICATION_EXPIRED";
pub const INVALID_TOKEN: &str = "INVALID_TOKEN";
pub const NOT_AUTHENTICATED: &str = "NOT_AUTHENTICATED";

/// Error body of the resource API. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: Option<i64>,
    pub detail: Option<String>,
    pub domain: Option<String>,
    pub error: Option<String>,
    pub formatted: Option<String>,
    pub msg: Option<String>,
    pub rpc_code: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TokenExpired,
    TokenInvalid,
    Other,
}

impl ErrorResponse {
    pub fn kind(&self) -> ErrorKind {
        match self.msg.as_deref() {
            Some(AUTHENTICATION_EXPIRED) => ErrorKind::TokenExpired,
            Some(INVALID_TOKEN) | Some(NOT_AUTHENTICATED) => ErrorKind::TokenInvalid,
            _ => ErrorKind::Other,
        }
    }
}

/// A pre-encoded form body (e.g. `multipart/form-data`) sent untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawForm {
    pub content_type: String,
    pub body: Vec<u8>,
}

impl RawForm {
    pub fn multipart(boundary: &str, body: Vec<u8>) -> Self {
        Self {
            content_type: format!("multipart/form-data; boundary={boundary}"),
            body,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(serde_json::Value),
    Form(RawForm),
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Json(value)
    }
}

impl From<RawForm> for Payload {
    fn from(form: RawForm) -> Self {
        Payload::Form(form)
    }
}

/// Per-call overrides. Headers here win over every other source.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: HashMap<String, String>,
}

impl RequestOptions {
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

#[derive(Debug)]
pub struct ApiResponse<T> {
    /// Parsed body; `None` for error results.
    pub data: Option<T>,
    pub status: StatusCode,
    pub status_text: String,
    pub headers: HeaderMap,
    pub error: Option<ErrorResponse>,
    pub is_error: bool,
}

impl<T> ApiResponse<T> {
    pub fn into_result(self) -> Result<T, AuthError> {
        if let Some(error) = self.error {
            return Err(AuthError::ResourceRequest {
                status: self.status.as_u16(),
                error,
            });
        }
        self.data
            .ok_or_else(|| AuthError::Decode(format!("No data in {} response", self.status)))
    }
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    default_headers: HeaderMap,
    session: Option<Arc<SessionManager>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("authenticated", &self.session.is_some())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, AuthError> {
        let mut base = Url::parse(base_url).map_err(|e| AuthError::Config {
            path: "<apiBaseUrl>".into(),
            detail: format!("Invalid base URL '{base_url}': {e}"),
        })?;
        // Relative paths resolve under the base, not beside its last segment.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: base,
            default_headers: HeaderMap::new(),
            session: None,
        })
    }

    /// Inject bearer tokens from `session` and react to auth errors.
    pub fn with_session(mut self, session: Arc<SessionManager>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_default_headers(
        mut self,
        headers: &HashMap<String, String>,
    ) -> Result<Self, AuthError> {
        for (name, value) in headers {
            let (name, value) = header_pair(name, value)?;
            self.default_headers.insert(name, value);
        }
        Ok(self)
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn session(&self) -> Option<&Arc<SessionManager>> {
        self.session.as_ref()
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<ApiResponse<T>, AuthError> {
        self.request(Method::GET, path, None, &RequestOptions::default())
            .await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        payload: impl Into<Payload>,
    ) -> Result<ApiResponse<T>, AuthError> {
        self.request(Method::POST, path, Some(payload.into()), &RequestOptions::default())
            .await
    }

    pub async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        payload: impl Into<Payload>,
    ) -> Result<ApiResponse<T>, AuthError> {
        self.request(Method::PUT, path, Some(payload.into()), &RequestOptions::default())
            .await
    }

    pub async fn patch<T: DeserializeOwned>(
        &self,
        path: &str,
        payload: impl Into<Payload>,
    ) -> Result<ApiResponse<T>, AuthError> {
        self.request(Method::PATCH, path, Some(payload.into()), &RequestOptions::default())
            .await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<ApiResponse<T>, AuthError> {
        self.request(Method::DELETE, path, None, &RequestOptions::default())
            .await
    }

    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        payload: Option<Payload>,
        options: &RequestOptions,
    ) -> Result<ApiResponse<T>, AuthError> {
        let url = self.base_url.join(path).map_err(|e| {
            AuthError::Decode(format!("Invalid request path '{path}': {e}"))
        })?;

        let response = self
            .send_once::<T>(method.clone(), &url, payload.as_ref(), options)
            .await?;

        let Some(kind) = response.error.as_ref().map(ErrorResponse::kind) else {
            return Ok(response);
        };

        match kind {
            ErrorKind::TokenExpired => {
                tracing::debug!(%url, "access token expired, refreshing and retrying once");
                if let Some(session) = &self.session {
                    session.events().emit(AuthEvent::AccessTokenExpired);
                    if let Err(e) = session.refresh().await {
                        tracing::warn!("refresh before retry failed: {e}");
                    }
                }
                self.send_once(method, &url, payload.as_ref(), options).await
            }
            ErrorKind::TokenInvalid => {
                if let Some(session) = &self.session {
                    tracing::info!(%url, "token rejected, starting a new authorization");
                    if let Err(e) = session.begin_authorization(AuthorizationOptions::default()) {
                        tracing::warn!("could not start authorization: {e}");
                    }
                }
                Ok(response)
            }
            ErrorKind::Other => Ok(response),
        }
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &Url,
        payload: Option<&Payload>,
        options: &RequestOptions,
    ) -> Result<ApiResponse<T>, AuthError> {
        let headers = self.build_headers(payload, options)?;
        let mut req = self.http.request(method, url.clone()).headers(headers);
        match payload {
            Some(Payload::Json(value)) => {
                let body = serde_json::to_vec(value)
                    .map_err(|e| AuthError::Decode(format!("Failed to serialize payload: {e}")))?;
                req = req.body(body);
            }
            Some(Payload::Form(form)) => {
                req = req.body(form.body.clone());
            }
            None => {}
        }

        let resp = req.send().await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await?;
        let status_text = status.canonical_reason().unwrap_or_default().to_string();

        if status.as_u16() >= 400 {
            let error = parse_error_body(&body);
            tracing::debug!(%url, %status, msg = ?error.msg, "resource request failed");
            return Ok(ApiResponse {
                data: None,
                status,
                status_text,
                headers,
                error: Some(error),
                is_error: true,
            });
        }

        let data: T = if body.iter().all(u8::is_ascii_whitespace) {
            serde_json::from_str("null")
        } else {
            serde_json::from_slice(&body)
        }
        .map_err(|e| AuthError::Decode(format!("Failed to parse response from {url}: {e}")))?;

        Ok(ApiResponse {
            data: Some(data),
            status,
            status_text,
            headers,
            error: None,
            is_error: false,
        })
    }

    /// JSON content type, then bearer, then client defaults, then per-call
    /// headers; later sources overwrite earlier ones.
    fn build_headers(
        &self,
        payload: Option<&Payload>,
        options: &RequestOptions,
    ) -> Result<HeaderMap, AuthError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(session) = &self.session {
            match session.get_tokens() {
                Some(tokens) => {
                    let value = HeaderValue::from_str(&format!("Bearer {}", tokens.access_token))
                        .map_err(|e| AuthError::Decode(format!("Invalid access token: {e}")))?;
                    headers.insert(AUTHORIZATION, value);
                }
                None => tracing::debug!("no access token held, sending request without bearer"),
            }
        }

        for (name, value) in &self.default_headers {
            headers.insert(name.clone(), value.clone());
        }

        if let Some(Payload::Form(form)) = payload {
            let value = HeaderValue::from_str(&form.content_type)
                .map_err(|e| AuthError::Decode(format!("Invalid form content type: {e}")))?;
            headers.insert(CONTENT_TYPE, value);
        }

        for (name, value) in &options.headers {
            let (name, value) = header_pair(name, value)?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

fn header_pair(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), AuthError> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| AuthError::Decode(format!("Invalid header name '{name}': {e}")))?;
    let header_value = HeaderValue::from_str(value)
        .map_err(|e| AuthError::Decode(format!("Invalid header value for '{name}': {e}")))?;
    Ok((header_name, header_value))
}

/// Lenient: a non-JSON error body becomes the `detail`.
fn parse_error_body(body: &[u8]) -> ErrorResponse {
    serde_json::from_slice(body).unwrap_or_else(|_| {
        let text = String::from_utf8_lossy(body).trim().to_string();
        ErrorResponse {
            detail: (!text.is_empty()).then_some(text),
            ..Default::default()
        }
    })
}
