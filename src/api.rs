//! Broker platform resource calls.
//!
//! Two clients back these: the resource API client (`apiBaseUrl`) and a
//! bare client rooted at the SSO host for `userinfo`.

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::client::ApiClient;
use crate::context::is_campaigns_url;
use crate::error::AuthError;
use crate::jwt::JwtClaims;
use crate::oauth::SessionManager;

pub const BROKER_PROFILE_PATH: &str = "v1/api/brokers/me";
pub const USER_DATA_PATH: &str = "v1/api/users/me";
pub const USER_INFO_PATH: &str = "userinfo";
pub const SOCIAL_LOGIN_PATH: &str = "auth/captcha";
const DISTRIBUTIONS_PATH: &str = "v1/api/broker/v1/api/distributions";
const CAMPAIGNS_PATH: &str = "v1/api/campaigns";
const CAPTCHA_VERSION: &str = "V2_INVISIBLE";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileLink {
    pub rel: String,
    pub href: String,
}

/// The logged-in broker. Fields the platform adds later land in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerProfile {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub crm: Option<String>,
    #[serde(default)]
    pub distribution_id: Option<String>,
    #[serde(default)]
    pub distribution_name: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub links: Vec<ProfileLink>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// OIDC userinfo as served by the SSO host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserInfo {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub bid: Option<String>,
    #[serde(default)]
    pub did: Option<String>,
    #[serde(default)]
    pub broker_plan: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub activated: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The platform's user account behind the session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserData {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub activated: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A broker office (distribution).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Distribution {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub assistant_name: Option<String>,
    #[serde(default)]
    pub crm: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A marketing campaign served on `<short id>.campaigns.<domain>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub short_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub distribution_id: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Captcha-backed login for users without an account.
#[derive(Debug, Clone)]
pub struct SocialLoginRequest {
    pub token: String,
    pub email: String,
    pub ask_broker_id: Option<String>,
    pub ask_distribution_id: String,
}

#[derive(Debug, Serialize)]
struct SocialLoginBody<'a> {
    token: &'a str,
    email: &'a str,
    ask_broker_id: Option<&'a str>,
    ask_distribution_id: &'a str,
    version: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SocialLoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub id: Option<String>,
}

pub async fn get_broker_profile(client: &ApiClient) -> Result<BrokerProfile, AuthError> {
    client.get(BROKER_PROFILE_PATH).await?.into_result()
}

pub async fn get_user_data(client: &ApiClient) -> Result<UserData, AuthError> {
    client.get(USER_DATA_PATH).await?.into_result()
}

/// Fetch userinfo through the SSO-host client. Uses the discovered
/// `userinfo_endpoint` when the client's session has one, `userinfo` under
/// the SSO host otherwise.
pub async fn get_user_info(client: &ApiClient) -> Result<UserInfo, AuthError> {
    let discovered = match client.session().and_then(|s| s.metadata().ok()) {
        Some(metadata) => metadata.userinfo_url()?,
        None => None,
    };
    let path = discovered
        .as_ref()
        .map(Url::as_str)
        .unwrap_or(USER_INFO_PATH);
    client.get(path).await?.into_result()
}

pub async fn get_distribution(
    client: &ApiClient,
    distribution_id: &str,
) -> Result<Distribution, AuthError> {
    if distribution_id.is_empty() {
        return Err(AuthError::Decode("Distribution id is empty".to_string()));
    }
    client
        .get(&format!("{DISTRIBUTIONS_PATH}/{distribution_id}"))
        .await?
        .into_result()
}

pub async fn get_campaign(client: &ApiClient, campaign_id: &str) -> Result<Campaign, AuthError> {
    if campaign_id.is_empty() {
        return Err(AuthError::Decode("Campaign id is empty".to_string()));
    }
    client
        .get(&format!("{CAMPAIGNS_PATH}/{campaign_id}"))
        .await?
        .into_result()
}

/// Short id of the campaign served at `url`: the first host label of a
/// `*.campaigns.*` host.
pub fn campaign_id_from_url(url: &Url) -> Option<String> {
    if !is_campaigns_url(url) {
        return None;
    }
    url.host_str()?
        .split('.')
        .next()
        .filter(|label| !label.is_empty())
        .map(str::to_string)
}

/// Distribution the session acts for. A campaign (social login) carries its
/// own; otherwise the token's `did` claim decides.
pub fn distribution_id(claims: Option<&JwtClaims>, campaign: Option<&Campaign>) -> Option<String> {
    let id = match campaign {
        Some(campaign) => campaign.distribution_id.as_deref(),
        None => claims.and_then(JwtClaims::distribution_id),
    };
    id.filter(|id| !id.is_empty()).map(str::to_string)
}

/// Exchange a captcha token for an access token and make it the live
/// session.
pub async fn social_login(
    client: &ApiClient,
    session: &SessionManager,
    request: &SocialLoginRequest,
) -> Result<SocialLoginResponse, AuthError> {
    let body = SocialLoginBody {
        token: &request.token,
        email: &request.email,
        ask_broker_id: request.ask_broker_id.as_deref(),
        ask_distribution_id: &request.ask_distribution_id,
        version: CAPTCHA_VERSION,
    };
    let body = serde_json::to_value(&body)
        .map_err(|e| AuthError::Decode(format!("Failed to serialize social login: {e}")))?;

    let response: SocialLoginResponse = client.post(SOCIAL_LOGIN_PATH, body).await?.into_result()?;
    if response.access_token.is_empty() {
        return Err(AuthError::Decode(
            "Social login response has an empty access_token".to_string(),
        ));
    }
    session.set_social_login_token(&response.access_token)?;
    tracing::info!("social login stored");
    Ok(response)
}
