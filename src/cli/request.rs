use crate::client::RequestOptions;
use crate::error::AuthError;

use super::output::{print_error, print_value, OutputMode};
use super::CliContext;

/// Parse `Name: value` header arguments.
pub fn parse_headers(raw: &[String]) -> Result<RequestOptions, AuthError> {
    let mut options = RequestOptions::default();
    for header in raw {
        let (name, value) = header.split_once(':').ok_or_else(|| {
            AuthError::Decode(format!("Invalid header '{header}', expected 'Name: value'"))
        })?;
        let name = name.trim();
        if name.is_empty() {
            return Err(AuthError::Decode(format!("Invalid header '{header}', empty name")));
        }
        options = options.header(name, value.trim());
    }
    Ok(options)
}

/// Run the get command: an authenticated GET against the resource API.
pub async fn run_get(
    ctx: &CliContext,
    path: &str,
    headers: &[String],
    mode: OutputMode,
) -> Result<(), AuthError> {
    let options = parse_headers(headers)?;
    ctx.initialize().await?;
    let client = ctx.api_client()?;

    let response = client
        .request::<serde_json::Value>(reqwest::Method::GET, path, None, &options)
        .await?;
    let body = match response.into_result() {
        Ok(body) => body,
        Err(err) => {
            if mode == OutputMode::Json {
                print_error(&err, true);
            }
            return Err(err);
        }
    };
    print_value(&body, mode);
    Ok(())
}
