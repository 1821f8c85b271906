use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const AUTHORIZE_PATH: &str = "/oauth2/auth";
pub const TOKEN_PATH: &str = "/oauth2/token";
pub const REVOKE_PATH: &str = "/oauth2/revoke";

pub fn discovery_document(issuer: &str) -> serde_json::Value {
    serde_json::json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}{AUTHORIZE_PATH}"),
        "token_endpoint": format!("{issuer}{TOKEN_PATH}"),
        "revocation_endpoint": format!("{issuer}{REVOKE_PATH}"),
        "userinfo_endpoint": format!("{issuer}/userinfo"),
        "scopes_supported": ["offline", "openid", "api"],
        "code_challenge_methods_supported": ["S256"]
    })
}

/// Start a mock authorization server that answers OIDC discovery with its
/// own URI as the issuer.
#[allow(dead_code)]
pub async fn start_sso() -> MockServer {
    let server = MockServer::start().await;
    let issuer = server.uri();
    mount_discovery(&server, discovery_document(&issuer)).await;
    server
}

#[allow(dead_code)]
pub async fn mount_discovery(server: &MockServer, document: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(document))
        .mount(server)
        .await;
}

pub fn token_body(access: &str, refresh: Option<&str>, id: Option<&str>) -> serde_json::Value {
    let mut body = serde_json::json!({
        "access_token": access,
        "token_type": "bearer",
        "expires_in": 3600,
        "scope": "offline openid api"
    });
    if let Some(refresh) = refresh {
        body["refresh_token"] = refresh.into();
    }
    if let Some(id) = id {
        body["id_token"] = id.into();
    }
    body
}

/// Token endpoint answering one grant type, optionally asserting the call
/// count.
#[allow(dead_code)]
pub async fn mount_token(
    server: &MockServer,
    grant_type: &str,
    response: ResponseTemplate,
    expected_calls: Option<u64>,
) {
    let mock = Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains(format!("grant_type={grant_type}")))
        .respond_with(response);
    let mock = match expected_calls {
        Some(n) => mock.expect(n),
        None => mock,
    };
    mock.mount(server).await;
}

#[allow(dead_code)]
pub async fn mount_revoke(server: &MockServer, status: u16, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path(REVOKE_PATH))
        .respond_with(ResponseTemplate::new(status))
        .expect(expected_calls)
        .mount(server)
        .await;
}
