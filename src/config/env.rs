use std::collections::HashMap;

use crate::error::AuthError;

use super::types::AuthConfig;

/// Expand `${VAR}` and `${VAR:-fallback}` references.
///
/// An unset `${VAR}` is an error. The fallback form also applies when the
/// variable is set but empty. A `$` not followed by `{` is kept as is.
pub fn expand_env_vars(input: &str) -> Result<String, AuthError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| env_error(format!("Unclosed variable reference: ${{{after}")))?;
        out.push_str(&resolve(&after[..end])?);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn resolve(expr: &str) -> Result<String, AuthError> {
    match expr.split_once(":-") {
        Some((name, fallback)) => Ok(std::env::var(name)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| fallback.to_string())),
        None if expr.is_empty() => Err(env_error("Empty variable name in ${}".to_string())),
        None => std::env::var(expr)
            .map_err(|_| env_error(format!("Environment variable '{expr}' is not set"))),
    }
}

/// Expand every string field that may carry secrets or hosts.
pub fn expand_auth_config(config: &mut AuthConfig) -> Result<(), AuthError> {
    config.client_id = expand_env_vars(&config.client_id)?;
    config.sso_host = expand_env_vars(&config.sso_host)?;
    config.redirect_uri = expand_env_vars(&config.redirect_uri)?;
    for url in [&mut config.api_base_url, &mut config.auth_api_base_url]
        .into_iter()
        .flatten()
    {
        *url = expand_env_vars(url)?;
    }
    config.default_headers = config
        .default_headers
        .iter()
        .map(|(k, v)| Ok((k.clone(), expand_env_vars(v)?)))
        .collect::<Result<HashMap<_, _>, AuthError>>()?;
    Ok(())
}

fn env_error(detail: String) -> AuthError {
    AuthError::Config {
        path: "<env>".into(),
        detail,
    }
}
