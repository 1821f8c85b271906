mod common;

use std::collections::HashMap;

use brokerauth::api::{
    campaign_id_from_url, distribution_id, get_broker_profile, get_campaign, get_distribution,
    get_user_data, get_user_info, social_login, SocialLoginRequest,
};
use brokerauth::jwt::decode_claims;
use brokerauth::client::{ErrorKind, RequestOptions};
use brokerauth::oauth::store::TOKENS_KEY;
use brokerauth::{
    ApiClient, AuthError, ExpiryObserver, KeyValueStore, Navigation, RawForm, TokenPair,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use reqwest::{Method, StatusCode, Url};
use wiremock::matchers::{body_json, body_string, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::sso_mock::{mount_token, token_body, AUTHORIZE_PATH, TOKEN_PATH};
use common::{ready_harness, Harness};

fn auth_error(msg: &str) -> serde_json::Value {
    serde_json::json!({
        "code": 401,
        "detail": null,
        "domain": "auth",
        "error": "Unauthorized",
        "formatted": null,
        "msg": msg,
        "rpc_code": null
    })
}

async fn client_for(h: &Harness) -> (MockServer, ApiClient) {
    let api = MockServer::start().await;
    let client = ApiClient::new(&api.uri())
        .unwrap()
        .with_session(h.session.clone());
    (api, client)
}

fn seed(h: &Harness, access: &str, refresh: &str) {
    h.session
        .store()
        .write(&TokenPair {
            access_token: access.into(),
            refresh_token: Some(refresh.into()),
            id_token: None,
        })
        .unwrap();
}

#[tokio::test]
async fn sends_bearer_from_store() {
    let h = ready_harness().await;
    seed(&h, "A1", "R1");
    let (api, client) = client_for(&h).await;

    Mock::given(method("GET"))
        .and(path("/v1/api/brokers/me"))
        .and(header("authorization", "Bearer A1"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "b-1",
            "name": "Jane Broker",
            "email": "jane@example.com"
        })))
        .expect(1)
        .mount(&api)
        .await;

    let profile = get_broker_profile(&client).await.unwrap();
    assert_eq!(profile.id, "b-1");
    assert_eq!(profile.name.as_deref(), Some("Jane Broker"));
}

#[tokio::test]
async fn expired_token_refreshes_and_retries_once() {
    let h = ready_harness().await;
    seed(&h, "A1", "R1");
    let (api, client) = client_for(&h).await;
    let expiry = ExpiryObserver::subscribe(h.session.events());

    Mock::given(method("GET"))
        .and(path("/v1/things"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(auth_error("AUTHENTICATION_EXPIRED")))
        .expect(1)
        .mount(&api)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/things"))
        .and(header("authorization", "Bearer A2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .expect(1)
        .mount(&api)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=R1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("A2", None, None)))
        .expect(1)
        .mount(&h.sso)
        .await;

    let response = client.get::<serde_json::Value>("v1/things").await.unwrap();
    assert!(!response.is_error);
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.data, Some(serde_json::json!({"ok": true})));

    let stored: serde_json::Value =
        serde_json::from_str(&h.storage.get(TOKENS_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(stored, serde_json::json!({"accessToken": "A2"}));

    tokio::time::timeout(std::time::Duration::from_secs(1), async {
        while !expiry.is_expired() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn retry_result_is_returned_even_if_still_expired() {
    let h = ready_harness().await;
    seed(&h, "A1", "R1");
    let (api, client) = client_for(&h).await;

    Mock::given(method("GET"))
        .and(path("/v1/things"))
        .respond_with(ResponseTemplate::new(401).set_body_json(auth_error("AUTHENTICATION_EXPIRED")))
        .expect(2)
        .mount(&api)
        .await;
    mount_token(
        &h.sso,
        "refresh_token",
        ResponseTemplate::new(200).set_body_json(token_body("A2", Some("R2"), None)),
        Some(1),
    )
    .await;

    let response = client.get::<serde_json::Value>("v1/things").await.unwrap();
    assert!(response.is_error);
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.error.unwrap().kind(), ErrorKind::TokenExpired);
}

#[tokio::test]
async fn failed_refresh_still_retries_once_with_the_old_token() {
    let h = ready_harness().await;
    seed(&h, "A1", "R1");
    let (api, client) = client_for(&h).await;

    Mock::given(method("GET"))
        .and(path("/v1/things"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(auth_error("AUTHENTICATION_EXPIRED")))
        .expect(2)
        .mount(&api)
        .await;
    mount_token(
        &h.sso,
        "refresh_token",
        ResponseTemplate::new(503).set_body_json(serde_json::json!({"error": "temporarily_unavailable"})),
        Some(3),
    )
    .await;

    let response = client.get::<serde_json::Value>("v1/things").await.unwrap();
    assert!(response.is_error);
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.error.unwrap().kind(), ErrorKind::TokenExpired);

    // every attempt of the retry cycle ran before the retry, then the counter reset
    assert_eq!(h.session.refresh_retries(), 0);
    assert_eq!(
        h.session.get_tokens(),
        Some(TokenPair {
            access_token: "A1".into(),
            refresh_token: Some("R1".into()),
            id_token: None,
        })
    );
}

#[tokio::test]
async fn invalid_token_starts_new_authorization() {
    let h = ready_harness().await;
    seed(&h, "A1", "R1");
    let (api, client) = client_for(&h).await;

    Mock::given(method("GET"))
        .and(path("/v1/things"))
        .respond_with(ResponseTemplate::new(401).set_body_json(auth_error("INVALID_TOKEN")))
        .expect(1)
        .mount(&api)
        .await;

    let response = client.get::<serde_json::Value>("v1/things").await.unwrap();
    assert!(response.is_error);
    assert_eq!(response.error.unwrap().msg.as_deref(), Some("INVALID_TOKEN"));

    match h.navigator.last_navigation() {
        Some(Navigation::Assign(url)) => assert_eq!(url.path(), AUTHORIZE_PATH),
        other => panic!("expected navigation to the authorization server, got {other:?}"),
    }
    assert!(h.pending().is_some());
}

#[tokio::test]
async fn not_authenticated_also_reauthorizes() {
    let h = ready_harness().await;
    let (api, client) = client_for(&h).await;

    Mock::given(method("GET"))
        .and(path("/v1/things"))
        .respond_with(ResponseTemplate::new(403).set_body_json(auth_error("NOT_AUTHENTICATED")))
        .mount(&api)
        .await;

    let response = client.get::<serde_json::Value>("v1/things").await.unwrap();
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert!(matches!(
        h.navigator.last_navigation(),
        Some(Navigation::Assign(_))
    ));
}

#[tokio::test]
async fn other_errors_pass_through_without_refresh() {
    let h = ready_harness().await;
    seed(&h, "A1", "R1");
    let (api, client) = client_for(&h).await;

    Mock::given(method("GET"))
        .and(path("/v1/things"))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "msg": "INTERNAL",
            "detail": "database unavailable"
        })))
        .expect(1)
        .mount(&api)
        .await;
    mount_token(
        &h.sso,
        "refresh_token",
        ResponseTemplate::new(200).set_body_json(token_body("A2", None, None)),
        Some(0),
    )
    .await;

    let response = client.get::<serde_json::Value>("v1/things").await.unwrap();
    assert!(response.is_error);
    assert!(response.data.is_none());
    let err = response.into_result().unwrap_err();
    assert!(matches!(err, AuthError::ResourceRequest { status: 500, .. }));
    assert!(err.to_string().contains("database unavailable"));
    assert!(h.navigator.last_navigation().is_none());
}

#[tokio::test]
async fn per_call_headers_win_over_defaults() {
    let h = ready_harness().await;
    seed(&h, "A1", "R1");
    let api = MockServer::start().await;
    let defaults = HashMap::from([
        ("Accept-Language".to_string(), "nl".to_string()),
        ("x-app-version".to_string(), "1.0".to_string()),
    ]);
    let client = ApiClient::new(&api.uri())
        .unwrap()
        .with_session(h.session.clone())
        .with_default_headers(&defaults)
        .unwrap();

    Mock::given(method("GET"))
        .and(path("/v1/things"))
        .and(header("accept-language", "fr"))
        .and(header("x-app-version", "1.0"))
        .and(header("authorization", "Bearer override"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&api)
        .await;

    let options = RequestOptions::default()
        .header("Accept-Language", "fr")
        .header("Authorization", "Bearer override");
    let response = client
        .request::<serde_json::Value>(Method::GET, "v1/things", None, &options)
        .await
        .unwrap();
    assert!(!response.is_error);
}

#[tokio::test]
async fn json_and_form_payloads() {
    let h = ready_harness().await;
    seed(&h, "A1", "R1");
    let (api, client) = client_for(&h).await;

    Mock::given(method("POST"))
        .and(path("/v1/claims"))
        .and(header("content-type", "application/json"))
        .and(body_json(serde_json::json!({"amount": 250})))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "c-1"})))
        .expect(1)
        .mount(&api)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v1/claims/c-1/files"))
        .and(header("content-type", "multipart/form-data; boundary=XyZ"))
        .and(body_string("--XyZ\r\ncontent\r\n--XyZ--"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&api)
        .await;

    let created = client
        .post::<serde_json::Value>("v1/claims", serde_json::json!({"amount": 250}))
        .await
        .unwrap();
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.data.unwrap()["id"], "c-1");

    let form = RawForm::multipart("XyZ", b"--XyZ\r\ncontent\r\n--XyZ--".to_vec());
    let uploaded = client
        .put::<serde_json::Value>("v1/claims/c-1/files", form)
        .await
        .unwrap();
    assert_eq!(uploaded.status, StatusCode::NO_CONTENT);
    assert_eq!(uploaded.data, Some(serde_json::Value::Null));
}

#[tokio::test]
async fn client_without_session_sends_no_bearer() {
    let api = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/public"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .mount(&api)
        .await;

    let client = ApiClient::new(&api.uri()).unwrap();
    client.get::<serde_json::Value>("public").await.unwrap();

    let requests = api.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].headers.contains_key("authorization"));
}

#[tokio::test]
async fn social_login_stores_token() {
    let h = ready_harness().await;
    let (auth_api, client) = client_for(&h).await;

    Mock::given(method("POST"))
        .and(path("/auth/captcha"))
        .and(body_json(serde_json::json!({
            "token": "captcha-token",
            "email": "lead@example.com",
            "ask_broker_id": "b-9",
            "ask_distribution_id": "d-1",
            "version": "V2_INVISIBLE"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "S1",
            "id": "u-1"
        })))
        .expect(1)
        .mount(&auth_api)
        .await;

    let request = SocialLoginRequest {
        token: "captcha-token".into(),
        email: "lead@example.com".into(),
        ask_broker_id: Some("b-9".into()),
        ask_distribution_id: "d-1".into(),
    };
    let response = social_login(&client, &h.session, &request).await.unwrap();
    assert_eq!(response.id.as_deref(), Some("u-1"));
    assert_eq!(h.session.get_tokens(), Some(TokenPair::access_only("S1")));
}

#[tokio::test]
async fn transport_failure_is_http_error() {
    let h = ready_harness().await;
    let client = ApiClient::new("http://127.0.0.1:1/")
        .unwrap()
        .with_session(h.session.clone());
    let err = client
        .get::<serde_json::Value>("v1/things")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Http(_)));
}

fn jwt_with_claims(claims: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}

#[tokio::test]
async fn user_info_uses_discovered_endpoint_on_sso_host() {
    let h = ready_harness().await;
    seed(&h, "A1", "R1");
    let sso_client = ApiClient::new(&h.sso.uri())
        .unwrap()
        .with_session(h.session.clone());

    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "sub": "u-1",
            "email": "jane@example.com",
            "bid": "b-1",
            "did": "d-1",
            "role": "broker",
            "activated": true,
            "modules": {"claims": true}
        })))
        .expect(1)
        .mount(&h.sso)
        .await;

    let info = get_user_info(&sso_client).await.unwrap();
    assert_eq!(info.sub, "u-1");
    assert_eq!(info.did.as_deref(), Some("d-1"));
    assert!(info.activated);
    assert_eq!(info.extra["modules"]["claims"], true);
}

#[tokio::test]
async fn user_info_falls_back_to_path_under_sso_host() {
    let sso = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/realm/userinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"sub": "u-2"})))
        .expect(1)
        .mount(&sso)
        .await;

    let client = ApiClient::new(&format!("{}/realm", sso.uri())).unwrap();
    let info = get_user_info(&client).await.unwrap();
    assert_eq!(info.sub, "u-2");
}

#[tokio::test]
async fn user_data_from_resource_api() {
    let h = ready_harness().await;
    seed(&h, "A1", "R1");
    let (api, client) = client_for(&h).await;

    Mock::given(method("GET"))
        .and(path("/v1/api/users/me"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "u-1",
            "username": "jane",
            "role": "broker",
            "language": "nl",
            "disabled": false
        })))
        .expect(1)
        .mount(&api)
        .await;

    let user = get_user_data(&client).await.unwrap();
    assert_eq!(user.id, "u-1");
    assert_eq!(user.username.as_deref(), Some("jane"));
    assert!(!user.disabled);
}

#[tokio::test]
async fn distribution_id_from_token_claims() {
    let h = ready_harness().await;
    let access = jwt_with_claims(serde_json::json!({
        "sub": "u-1",
        "ext": {"bid": "b-1", "did": "d-42"}
    }));
    seed(&h, &access, "R1");
    let (api, client) = client_for(&h).await;

    Mock::given(method("GET"))
        .and(path("/v1/api/broker/v1/api/distributions/d-42"))
        .and(header("authorization", format!("Bearer {access}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "d-42",
            "name": "Acme Brokers",
            "assistant_name": "Ava"
        })))
        .expect(1)
        .mount(&api)
        .await;

    let claims = decode_claims(&h.session.get_tokens().unwrap().access_token).unwrap();
    let id = distribution_id(Some(&claims), None).unwrap();
    let distribution = get_distribution(&client, &id).await.unwrap();
    assert_eq!(distribution.name.as_deref(), Some("Acme Brokers"));
    assert_eq!(distribution.assistant_name.as_deref(), Some("Ava"));
}

#[tokio::test]
async fn campaign_from_url_leads_to_its_distribution() {
    let h = ready_harness().await;
    h.session.set_social_login_token("S1").unwrap();
    let (api, client) = client_for(&h).await;

    Mock::given(method("GET"))
        .and(path("/v1/api/campaigns/spring"))
        .and(header("authorization", "Bearer S1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "c-1",
            "short_id": "spring",
            "name": "Spring sale",
            "active": true,
            "distribution_id": "d-7"
        })))
        .expect(1)
        .mount(&api)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/api/broker/v1/api/distributions/d-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "d-7"})))
        .expect(1)
        .mount(&api)
        .await;

    let landing = Url::parse("https://spring.campaigns.example.com/start").unwrap();
    let campaign_id = campaign_id_from_url(&landing).unwrap();
    let campaign = get_campaign(&client, &campaign_id).await.unwrap();
    assert!(campaign.active);

    let id = distribution_id(None, Some(&campaign)).unwrap();
    let distribution = get_distribution(&client, &id).await.unwrap();
    assert_eq!(distribution.id, "d-7");
}

#[tokio::test]
async fn empty_distribution_id_is_rejected_before_any_request() {
    let h = ready_harness().await;
    let (api, client) = client_for(&h).await;
    let err = get_distribution(&client, "").await.unwrap_err();
    assert!(matches!(err, AuthError::Decode(_)));
    assert!(api.received_requests().await.unwrap().is_empty());
}
