mod common;

use std::time::Duration;

use brokerauth::{AuthorizationObserver, AuthorizationOptions, ExpiryObserver};
use wiremock::ResponseTemplate;

use common::sso_mock::{mount_revoke, mount_token, token_body};
use common::ready_harness;

async fn next_change(observer: &mut AuthorizationObserver) -> Option<bool> {
    tokio::time::timeout(Duration::from_secs(2), observer.changed())
        .await
        .expect("observer did not change in time")
}

#[tokio::test]
async fn observer_follows_login_and_logout() {
    let h = ready_harness().await;
    let mut observer = AuthorizationObserver::subscribe(h.session.store());
    assert!(!observer.current());

    mount_token(
        &h.sso,
        "authorization_code",
        ResponseTemplate::new(200).set_body_json(token_body("A1", Some("R1"), Some("I1"))),
        Some(1),
    )
    .await;
    mount_revoke(&h.sso, 200, 1).await;

    h.session
        .begin_authorization(AuthorizationOptions::default())
        .unwrap();
    let state = h.pending().unwrap().random_state;
    h.land_on_callback(&format!("code=abc&scope=openid&state={state}"));
    h.session.complete_authorization().await.unwrap();

    assert_eq!(next_change(&mut observer).await, Some(true));
    assert!(observer.current());

    h.session.revoke().await.unwrap();
    assert_eq!(next_change(&mut observer).await, Some(false));
}

#[tokio::test]
async fn observer_starts_authorized_when_tokens_exist() {
    let h = ready_harness().await;
    h.session.set_social_login_token("S1").unwrap();
    let observer = AuthorizationObserver::subscribe(h.session.store());
    assert!(observer.current());
}

#[tokio::test]
async fn refresh_keeps_observer_authorized() {
    let h = ready_harness().await;
    h.session
        .store()
        .write(&brokerauth::TokenPair {
            access_token: "A1".into(),
            refresh_token: Some("R1".into()),
            id_token: None,
        })
        .unwrap();
    let observer = AuthorizationObserver::subscribe(h.session.store());
    let mut watch = observer.watch();

    mount_token(
        &h.sso,
        "refresh_token",
        ResponseTemplate::new(200).set_body_json(token_body("A2", Some("R2"), None)),
        Some(1),
    )
    .await;
    h.session.refresh().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    // value unchanged, so no notification
    assert!(!watch.has_changed().unwrap());
    assert!(observer.current());
}

#[tokio::test]
async fn several_observers_see_the_same_change() {
    let h = ready_harness().await;
    let mut first = AuthorizationObserver::subscribe(h.session.store());
    let mut second = AuthorizationObserver::subscribe(h.session.store());

    h.session.set_social_login_token("S1").unwrap();

    assert_eq!(next_change(&mut first).await, Some(true));
    assert_eq!(next_change(&mut second).await, Some(true));
}

#[tokio::test]
async fn expiry_latch_survives_successful_refresh() {
    let h = ready_harness().await;
    let mut expiry = ExpiryObserver::subscribe(h.session.events());

    h.session
        .events()
        .emit(brokerauth::AuthEvent::AccessTokenExpired);
    let fired = tokio::time::timeout(Duration::from_secs(1), expiry.expired())
        .await
        .unwrap();
    assert!(fired);

    h.session.set_social_login_token("S2").unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(expiry.is_expired());
}
