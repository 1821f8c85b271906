use std::path::{Path, PathBuf};

use reqwest::Url;

use crate::error::AuthError;

use super::env::expand_auth_config;
use super::types::{AnnotatedConfig, AuthConfig};

pub const CONFIG_ENV: &str = "BROKERAUTH_CONFIG";
const CONFIG_FILE: &str = "brokerauth.json";

/// Remove `//` and `/* */` comments outside of string literals. Newlines
/// inside comments are kept so serde error positions still line up.
pub fn strip_jsonc_comments(input: &str) -> String {
    #[derive(PartialEq)]
    enum Mode {
        Code,
        Str,
        Escape,
        Line,
        Block,
    }

    let mut out = String::with_capacity(input.len());
    let mut mode = Mode::Code;
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        mode = match mode {
            Mode::Code => match (ch, chars.peek()) {
                ('/', Some('/')) => {
                    chars.next();
                    Mode::Line
                }
                ('/', Some('*')) => {
                    chars.next();
                    Mode::Block
                }
                _ => {
                    out.push(ch);
                    if ch == '"' {
                        Mode::Str
                    } else {
                        Mode::Code
                    }
                }
            },
            Mode::Str => {
                out.push(ch);
                match ch {
                    '\\' => Mode::Escape,
                    '"' => Mode::Code,
                    _ => Mode::Str,
                }
            }
            Mode::Escape => {
                out.push(ch);
                Mode::Str
            }
            Mode::Line => {
                if ch == '\n' {
                    out.push('\n');
                    Mode::Code
                } else {
                    Mode::Line
                }
            }
            Mode::Block => {
                if ch == '\n' {
                    out.push('\n');
                }
                if ch == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    Mode::Code
                } else {
                    Mode::Block
                }
            }
        };
    }

    out
}

/// Candidate config files, highest precedence first:
///
/// 1. `--config` flag
/// 2. `BROKERAUTH_CONFIG`
/// 3. `./config/brokerauth.json`
/// 4. `~/.brokerauth/brokerauth.json`
pub fn discover_config_files(cli_config: Option<&str>) -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(path) = cli_config {
        candidates.push(PathBuf::from(path));
    }
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        candidates.push(PathBuf::from(path));
    }
    candidates.push(Path::new("config").join(CONFIG_FILE));
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".brokerauth").join(CONFIG_FILE));
    }

    let mut files = Vec::new();
    for path in candidates {
        if path.exists() && !files.contains(&path) {
            files.push(path);
        }
    }
    files
}

pub fn load_config_file(path: &Path) -> Result<AuthConfig, AuthError> {
    let content = std::fs::read_to_string(path).map_err(|e| AuthError::Config {
        path: path.to_path_buf(),
        detail: format!("Cannot read file: {e}"),
    })?;
    serde_json::from_str(&strip_jsonc_comments(&content)).map_err(|e| AuthError::Config {
        path: path.to_path_buf(),
        detail: format!("Invalid JSON: {e}"),
    })
}

/// Load the highest-precedence config file, expand `${VAR}` references and
/// validate the URLs.
///
/// An explicit `--config` path that does not exist is an error rather than
/// silently falling through to the next candidate.
pub fn load_config(cli_config: Option<&str>) -> Result<AnnotatedConfig, AuthError> {
    if let Some(path) = cli_config {
        if !Path::new(path).exists() {
            return Err(AuthError::Config {
                path: PathBuf::from(path),
                detail: "File not found".to_string(),
            });
        }
    }

    let source = discover_config_files(cli_config)
        .into_iter()
        .next()
        .ok_or_else(|| AuthError::Config {
            path: Path::new("~/.brokerauth").join(CONFIG_FILE),
            detail: format!("No config file found. Pass --config or set {CONFIG_ENV}."),
        })?;
    tracing::debug!(path = %source.display(), "loading config");

    let mut config = load_config_file(&source)?;
    expand_auth_config(&mut config)?;
    validate(&config).map_err(|detail| AuthError::Config {
        path: source.clone(),
        detail,
    })?;
    Ok(AnnotatedConfig { config, source })
}

fn validate(config: &AuthConfig) -> Result<(), String> {
    if config.client_id.trim().is_empty() {
        return Err("clientId must not be empty".to_string());
    }
    let urls = [
        ("ssoHost", Some(config.sso_host.as_str())),
        ("redirectUri", Some(config.redirect_uri.as_str())),
        ("apiBaseUrl", config.api_base_url.as_deref()),
        ("authApiBaseUrl", config.auth_api_base_url.as_deref()),
    ];
    for (field, value) in urls {
        if let Some(value) = value {
            Url::parse(value).map_err(|e| format!("{field} '{value}' is not a valid URL: {e}"))?;
        }
    }
    if config.refresh_retry.max_attempts == 0 {
        return Err("refreshRetry.maxAttempts must be at least 1".to_string());
    }
    Ok(())
}
