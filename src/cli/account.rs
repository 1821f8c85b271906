use reqwest::Url;
use serde::Serialize;

use crate::api::{
    campaign_id_from_url, distribution_id, get_campaign, get_distribution, get_user_data,
    get_user_info, social_login, SocialLoginRequest,
};
use crate::error::AuthError;
use crate::jwt::decode_claims;

use super::output::{print_value, OutputMode};
use super::CliContext;

#[derive(Debug, Clone, Default)]
pub struct SocialLoginArgs {
    pub token: String,
    pub email: String,
    pub broker_id: Option<String>,
    pub distribution_id: String,
}

/// Run the social-login command: trade a captcha token for an access token
/// on the auth API and store it as the live session.
pub async fn run_social_login(ctx: &CliContext, args: SocialLoginArgs) -> Result<(), AuthError> {
    let client = ctx.auth_client()?;
    let request = SocialLoginRequest {
        token: args.token,
        email: args.email,
        ask_broker_id: args.broker_id,
        ask_distribution_id: args.distribution_id,
    };
    let response = social_login(&client, &ctx.session, &request).await?;
    match response.id {
        Some(id) => println!("Social login stored for {id}"),
        None => println!("Social login stored"),
    }
    Ok(())
}

/// Run the user command. `info` reads OIDC userinfo from the SSO host,
/// otherwise the platform user record.
pub async fn run_user(ctx: &CliContext, info: bool, mode: OutputMode) -> Result<(), AuthError> {
    ctx.initialize().await?;
    if info {
        let client = ctx.sso_client()?;
        print_serialized(&get_user_info(&client).await?, mode)
    } else {
        let client = ctx.api_client()?;
        print_serialized(&get_user_data(&client).await?, mode)
    }
}

/// Run the campaign command for a campaign URL or short id.
pub async fn run_campaign(ctx: &CliContext, target: &str, mode: OutputMode) -> Result<(), AuthError> {
    let campaign_id = resolve_campaign_id(target).ok_or_else(|| {
        AuthError::Decode(format!("'{target}' is neither a campaign URL nor a campaign id"))
    })?;
    ctx.initialize().await?;
    let campaign = get_campaign(&ctx.api_client()?, &campaign_id).await?;
    print_serialized(&campaign, mode)
}

/// Run the distribution command. The id comes from `id`, else from the
/// campaign at `campaign_url`, else from the stored token's claims.
pub async fn run_distribution(
    ctx: &CliContext,
    id: Option<String>,
    campaign_url: Option<&str>,
    mode: OutputMode,
) -> Result<(), AuthError> {
    ctx.initialize().await?;
    let client = ctx.api_client()?;

    let id = match (id, campaign_url) {
        (Some(id), _) => Some(id),
        (None, Some(target)) => {
            let campaign_id = resolve_campaign_id(target).ok_or_else(|| {
                AuthError::Decode(format!("'{target}' is not a campaign URL"))
            })?;
            let campaign = get_campaign(&client, &campaign_id).await?;
            distribution_id(None, Some(&campaign))
        }
        (None, None) => {
            let claims = ctx
                .session
                .get_tokens()
                .and_then(|t| decode_claims(&t.access_token).ok());
            distribution_id(claims.as_ref(), None)
        }
    };
    let id = id.ok_or_else(|| {
        AuthError::Decode("No distribution id: pass --id or log in as a broker".to_string())
    })?;

    let distribution = get_distribution(&client, &id).await?;
    print_serialized(&distribution, mode)
}

/// A campaign URL yields its host prefix; anything else that looks like a
/// bare id is taken as is.
fn resolve_campaign_id(target: &str) -> Option<String> {
    match Url::parse(target) {
        Ok(url) => campaign_id_from_url(&url),
        Err(_) if !target.is_empty() && !target.contains(['/', '.', ':']) => {
            Some(target.to_string())
        }
        Err(_) => None,
    }
}

fn print_serialized<T: Serialize>(value: &T, mode: OutputMode) -> Result<(), AuthError> {
    let value = serde_json::to_value(value)
        .map_err(|e| AuthError::Decode(format!("Failed to serialize response: {e}")))?;
    print_value(&value, mode);
    Ok(())
}
