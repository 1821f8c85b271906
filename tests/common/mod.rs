pub mod sso_mock;

use std::sync::Arc;
use std::time::Duration;

use brokerauth::oauth::store::PENDING_KEY;
use brokerauth::oauth::PendingAuthorizationState;
use brokerauth::{
    KeyValueStore, MemoryNavigator, MemoryStore, OAuthSettings, RefreshRetryPolicy,
    SessionManager,
};
use reqwest::Url;
use wiremock::MockServer;

pub const CLIENT_ID: &str = "broker-platform";
pub const REDIRECT_URI: &str = "https://app.example.com/callback";
pub const START_URL: &str = "https://app.example.com/home";

/// A session wired to in-memory storage and navigation, pointed at a mock
/// authorization server.
pub struct Harness {
    pub sso: MockServer,
    pub session: Arc<SessionManager>,
    pub storage: Arc<MemoryStore>,
    pub navigator: Arc<MemoryNavigator>,
}

pub fn settings(issuer: &str) -> OAuthSettings {
    let mut settings = OAuthSettings::new(CLIENT_ID, issuer, REDIRECT_URI);
    settings.refresh_retry = RefreshRetryPolicy {
        max_attempts: 3,
        delay: Duration::from_millis(10),
    };
    settings
}

/// Harness with discovery mounted but `initialize` not yet called.
#[allow(dead_code)]
pub async fn harness() -> Harness {
    let sso = sso_mock::start_sso().await;
    let storage = Arc::new(MemoryStore::new());
    let navigator = Arc::new(MemoryNavigator::new(Url::parse(START_URL).unwrap()));
    let session = Arc::new(SessionManager::new(
        settings(&sso.uri()),
        storage.clone(),
        navigator.clone(),
    ));
    Harness {
        sso,
        session,
        storage,
        navigator,
    }
}

#[allow(dead_code)]
pub async fn ready_harness() -> Harness {
    let h = harness().await;
    h.session.initialize().await.unwrap();
    h
}

impl Harness {
    /// Peek at the pending authorization without consuming it.
    #[allow(dead_code)]
    pub fn pending(&self) -> Option<PendingAuthorizationState> {
        self.storage
            .get(PENDING_KEY)
            .unwrap()
            .map(|raw| serde_json::from_str(&raw).unwrap())
    }

    /// Simulate the browser landing back on the redirect URI.
    #[allow(dead_code)]
    pub fn land_on_callback(&self, query: &str) -> Url {
        let url = Url::parse(&format!("{REDIRECT_URI}?{query}")).unwrap();
        self.navigator.set_current(url.clone());
        url
    }
}

/// All values of a query parameter.
#[allow(dead_code)]
pub fn query_values(url: &Url, name: &str) -> Vec<String> {
    url.query_pairs()
        .filter(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
        .collect()
}

#[allow(dead_code)]
pub fn query_value(url: &Url, name: &str) -> Option<String> {
    query_values(url, name).into_iter().next()
}
