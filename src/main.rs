use std::time::Duration;

use clap::{Parser, Subcommand};

use brokerauth::cli::account::SocialLoginArgs;
use brokerauth::cli::auth::LoginArgs;
use brokerauth::cli::output::OutputMode;
use brokerauth::cli::CliContext;

#[derive(Parser)]
#[command(name = "brokerauth", version, about = "OAuth2 login, token refresh and authenticated requests for the broker platform")]
struct Cli {
    /// Path to brokerauth.json
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in through the browser (authorization code + PKCE)
    Login {
        /// Path to land on after login
        #[arg(long)]
        return_path: Option<String>,

        /// Switch the session to another broker
        #[arg(long)]
        broker_id: Option<String>,

        /// Pre-authenticated social login token
        #[arg(long)]
        login_token: Option<String>,

        /// Seconds to wait for the browser redirect
        #[arg(long, env = "BROKERAUTH_LOGIN_TIMEOUT")]
        timeout: Option<u64>,
    },

    /// Revoke the access token and clear local tokens
    Logout,

    /// Exchange the refresh token for a new token pair
    Refresh,

    /// Show the current session
    Status {
        /// JSON output
        #[arg(long)]
        json: bool,

        /// Fetch the broker profile to resolve the role
        #[arg(long)]
        profile: bool,

        /// URL the app is served from; a campaigns or conversations host
        /// makes an authorized user `social`. Defaults to the redirect origin.
        #[arg(long)]
        url: Option<String>,
    },

    /// Trade a captcha token for a social login session
    SocialLogin {
        /// Captcha token
        #[arg(long)]
        token: String,

        /// Email of the lead
        #[arg(long)]
        email: String,

        /// Distribution the lead asks for
        #[arg(long)]
        distribution_id: String,

        /// Broker the lead asks for
        #[arg(long)]
        broker_id: Option<String>,
    },

    /// Show the logged-in user
    User {
        /// OIDC userinfo from the SSO host instead of the platform record
        #[arg(long)]
        info: bool,

        /// Raw output
        #[arg(long)]
        raw: bool,
    },

    /// Show a distribution (defaults to the token's `did` claim)
    Distribution {
        /// Distribution id
        #[arg(long, conflicts_with = "campaign")]
        id: Option<String>,

        /// Campaign URL whose distribution to show
        #[arg(long)]
        campaign: Option<String>,

        /// Raw output
        #[arg(long)]
        raw: bool,
    },

    /// Show a campaign by URL or short id
    Campaign {
        /// Campaign URL (`https://<id>.campaigns.<domain>`) or short id
        target: String,

        /// Raw output
        #[arg(long)]
        raw: bool,
    },

    /// Print the access token claims
    Token {
        /// Print the raw access token instead
        #[arg(long)]
        raw: bool,
    },

    /// Authenticated GET against the resource API
    Get {
        /// Path relative to apiBaseUrl
        path: String,

        /// Extra request header, `Name: value`
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Raw output
        #[arg(long)]
        raw: bool,

        /// JSON output
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("BROKERAUTH_LOG_LEVEL")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = run(cli).await;
    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), brokerauth::AuthError> {
    let ctx = CliContext::open(cli.config.as_deref())?;
    match cli.command {
        Commands::Login {
            return_path,
            broker_id,
            login_token,
            timeout,
        } => {
            let args = LoginArgs {
                return_path,
                broker_id,
                login_token,
                timeout: timeout.map(Duration::from_secs),
            };
            brokerauth::cli::auth::run_login(&ctx, args).await
        }
        Commands::Logout => brokerauth::cli::auth::run_logout(&ctx).await,
        Commands::Refresh => brokerauth::cli::auth::run_refresh(&ctx).await,
        Commands::Status { json, profile, url } => {
            brokerauth::cli::status::run_status(&ctx, json, profile, url.as_deref()).await
        }
        Commands::SocialLogin {
            token,
            email,
            distribution_id,
            broker_id,
        } => {
            let args = SocialLoginArgs {
                token,
                email,
                broker_id,
                distribution_id,
            };
            brokerauth::cli::account::run_social_login(&ctx, args).await
        }
        Commands::User { info, raw } => {
            let mode = OutputMode::from_flags(raw, false);
            brokerauth::cli::account::run_user(&ctx, info, mode).await
        }
        Commands::Distribution { id, campaign, raw } => {
            let mode = OutputMode::from_flags(raw, false);
            brokerauth::cli::account::run_distribution(&ctx, id, campaign.as_deref(), mode).await
        }
        Commands::Campaign { target, raw } => {
            let mode = OutputMode::from_flags(raw, false);
            brokerauth::cli::account::run_campaign(&ctx, &target, mode).await
        }
        Commands::Token { raw } => {
            let mode = if raw { OutputMode::Raw } else { OutputMode::Pretty };
            brokerauth::cli::status::run_token(&ctx, mode)
        }
        Commands::Get {
            path,
            headers,
            raw,
            json,
        } => {
            let mode = OutputMode::from_flags(raw, json);
            brokerauth::cli::request::run_get(&ctx, &path, &headers, mode).await
        }
    }
}
