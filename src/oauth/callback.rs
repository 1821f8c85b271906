use std::time::Duration;

use reqwest::Url;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::error::AuthError;

/// Wait for the authorization server to redirect the browser to a loopback
/// `redirect_uri` and return the full URL it landed on.
pub async fn listen_for_callback(redirect_uri: &Url, timeout: Duration) -> Result<Url, AuthError> {
    let host = redirect_uri.host_str().unwrap_or("127.0.0.1");
    let bind_host = if host == "localhost" { "127.0.0.1" } else { host };
    let port = redirect_uri.port_or_known_default().unwrap_or(80);
    let listener = TcpListener::bind((bind_host, port)).await?;
    tracing::debug!(%redirect_uri, "listening for authorization callback");

    let accept_future = async {
        let (mut stream, _) = listener.accept().await?;

        let mut buf = vec![0u8; 8192];
        let n = stream.read(&mut buf).await?;
        let request = String::from_utf8_lossy(&buf[..n]);

        let landed = parse_callback_url(&request, redirect_uri).ok_or_else(|| {
            AuthError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "Malformed authorization callback request",
            ))
        })?;

        let body = "<!DOCTYPE html><html><body><h1>Authorization received</h1>\
                     <p>You can close this window and return to the terminal.</p></body></html>";
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await?;
        stream.shutdown().await?;

        Ok::<Url, AuthError>(landed)
    };

    tokio::time::timeout(timeout, accept_future)
        .await
        .map_err(|_| {
            AuthError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!(
                    "Timed out waiting for authorization callback after {}s",
                    timeout.as_secs()
                ),
            ))
        })?
}

/// Resolve the target of a `GET <path> HTTP/1.1` request line against the
/// redirect URI.
fn parse_callback_url(request: &str, redirect_uri: &Url) -> Option<Url> {
    let first_line = request.lines().next()?;
    let mut parts = first_line.split_whitespace();
    if parts.next()? != "GET" {
        return None;
    }
    let target = parts.next()?;
    if !target.starts_with('/') {
        return None;
    }
    redirect_uri.join(target).ok()
}
