use std::io::IsTerminal;

use reqwest::Url;
use serde::Serialize;

use crate::api::get_broker_profile;
use crate::context::{is_social_login_url, Role};
use crate::error::AuthError;
use crate::jwt::{decode_claims, JwtClaims};
use crate::navigator::Navigator;

use super::output::{format_dim, format_field, print_value, OutputMode};
use super::CliContext;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusReport {
    authorized: bool,
    role: Role,
    has_refresh_token: bool,
    has_id_token: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    broker_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expired: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    broker_name: Option<String>,
    config: String,
}

/// Run the status command. With `profile`, the broker profile is fetched to
/// tell brokers apart from public users. `app_url` is the URL the app is
/// served from; it decides the social role and defaults to the redirect
/// origin.
pub async fn run_status(
    ctx: &CliContext,
    json: bool,
    profile: bool,
    app_url: Option<&str>,
) -> Result<(), AuthError> {
    let app_url = resolve_app_url(app_url, ctx.navigator.current_url())?;
    let tokens = ctx.session.get_tokens();
    let authorized = ctx.session.is_authorized();
    let claims = tokens
        .as_ref()
        .and_then(|t| decode_claims(&t.access_token).ok());

    let broker = if profile && authorized {
        ctx.initialize().await?;
        let client = ctx.api_client()?;
        match get_broker_profile(&client).await {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!("could not fetch broker profile: {e}");
                None
            }
        }
    } else {
        None
    };

    let is_social = is_social_login_url(&app_url);
    let report = StatusReport {
        authorized,
        role: Role::derive(broker.is_some(), authorized, is_social),
        has_refresh_token: tokens.as_ref().is_some_and(|t| t.refresh_token.is_some()),
        has_id_token: tokens.as_ref().is_some_and(|t| t.id_token.is_some()),
        subject: claims.as_ref().and_then(|c| c.sub.clone()),
        broker_id: claims
            .as_ref()
            .and_then(JwtClaims::broker_id)
            .map(str::to_string),
        expires_at: claims
            .as_ref()
            .and_then(JwtClaims::expires_at)
            .map(|t| t.to_rfc3339()),
        expired: claims.as_ref().map(JwtClaims::is_expired),
        broker_name: broker.and_then(|b| b.name),
        config: ctx.config.source.display().to_string(),
    };

    if json {
        let value = serde_json::to_value(&report)
            .map_err(|e| AuthError::Decode(format!("Failed to serialize status: {e}")))?;
        print_value(&value, OutputMode::Json);
        return Ok(());
    }

    let is_tty = std::io::stdout().is_terminal();
    let yes_no = |b: bool| if b { "yes" } else { "no" };
    println!("{}", format_field("Authorized", yes_no(authorized), authorized, is_tty));
    println!("{}", format_field("Role", report.role.as_str(), authorized, is_tty));
    println!(
        "{}",
        format_field("Refresh token", yes_no(report.has_refresh_token), report.has_refresh_token, is_tty)
    );
    if let Some(sub) = &report.subject {
        println!("Subject: {sub}");
    }
    if let Some(bid) = &report.broker_id {
        println!("Broker: {bid}");
    }
    if let Some(name) = &report.broker_name {
        println!("Broker name: {name}");
    }
    if let (Some(at), Some(expired)) = (&report.expires_at, report.expired) {
        let label = if expired { "expired" } else { "valid" };
        println!("{}", format_field("Expires", &format!("{at} ({label})"), !expired, is_tty));
    }
    println!("{}", format_dim(&format!("Config: {}", report.config), is_tty));
    Ok(())
}

fn resolve_app_url(raw: Option<&str>, fallback: Url) -> Result<Url, AuthError> {
    match raw {
        Some(raw) => {
            Url::parse(raw).map_err(|e| AuthError::Decode(format!("Invalid --url '{raw}': {e}")))
        }
        None => Ok(fallback),
    }
}

/// Print the access token, or its decoded claims in JSON mode.
pub fn run_token(ctx: &CliContext, mode: OutputMode) -> Result<(), AuthError> {
    let tokens = ctx
        .session
        .get_tokens()
        .filter(|t| !t.access_token.is_empty())
        .ok_or_else(|| AuthError::Storage("No access token stored. Run `brokerauth login`.".into()))?;

    match mode {
        OutputMode::Raw => println!("{}", tokens.access_token),
        OutputMode::Json | OutputMode::Pretty => {
            let claims = decode_claims(&tokens.access_token)?;
            let value = serde_json::to_value(&claims)
                .map_err(|e| AuthError::Decode(format!("Failed to serialize claims: {e}")))?;
            print_value(&value, mode);
        }
    }
    Ok(())
}
