use std::io::IsTerminal;
use std::time::Duration;

use colored::Colorize;

use crate::error::AuthError;
use crate::oauth::{listen_for_callback, AuthorizationOptions};

use super::CliContext;

/// Default time to wait for the browser to come back to the redirect URI.
pub const DEFAULT_LOGIN_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Default)]
pub struct LoginArgs {
    pub return_path: Option<String>,
    pub broker_id: Option<String>,
    pub login_token: Option<String>,
    pub timeout: Option<Duration>,
}

/// Run the login command: open the authorization URL, wait for the loopback
/// redirect and exchange the code.
pub async fn run_login(ctx: &CliContext, args: LoginArgs) -> Result<(), AuthError> {
    ctx.initialize().await?;
    let redirect_uri = ctx.redirect_uri()?;
    let timeout = args
        .timeout
        .unwrap_or(Duration::from_secs(DEFAULT_LOGIN_TIMEOUT_SECS));

    let options = AuthorizationOptions {
        return_path: args.return_path,
        target_broker_id: args.broker_id,
        login_token: args.login_token,
    };
    let url = ctx.session.begin_authorization(options)?;
    eprintln!("Opening browser for login:\n{url}");

    let landed = listen_for_callback(&redirect_uri, timeout).await?;
    ctx.navigator.land_on(landed);

    let target = ctx.session.complete_authorization().await?;
    let is_tty = std::io::stdout().is_terminal();
    let done = "Login successful";
    if is_tty {
        println!("{}", done.green().bold());
    } else {
        println!("{done}");
    }
    println!("Return target: {target}");
    Ok(())
}

pub async fn run_logout(ctx: &CliContext) -> Result<(), AuthError> {
    if ctx.session.get_tokens().is_none() {
        println!("Not logged in");
        return Ok(());
    }
    ctx.initialize().await?;
    ctx.session.revoke().await?;
    println!("Logged out");
    Ok(())
}

/// Single refresh attempt that reports failures, unlike the absorbing
/// retry loop the request client uses.
pub async fn run_refresh(ctx: &CliContext) -> Result<(), AuthError> {
    let has_refresh_token = ctx
        .session
        .get_tokens()
        .is_some_and(|t| t.refresh_token.is_some());
    if !has_refresh_token {
        println!("No refresh token held, nothing to refresh");
        return Ok(());
    }
    ctx.initialize().await?;
    ctx.session.try_refresh().await?;
    println!("Tokens refreshed");
    Ok(())
}
