//! Abstraction over the browser location.
//!
//! The session manager never touches a window directly: it asks a
//! [`Navigator`] for the current URL and tells it where to go. A full
//! navigation ends the calling page, so callers of `assign`/`replace` should
//! treat the call as terminal.

use std::sync::Mutex;

use reqwest::Url;

pub trait Navigator: Send + Sync {
    /// The URL the user is currently on.
    fn current_url(&self) -> Url;

    /// Navigate to `url`, keeping the current entry in history.
    fn assign(&self, url: &Url);

    /// Navigate to `url`, replacing the current history entry.
    fn replace(&self, url: &Url);
}

/// A navigator that records every navigation instead of performing it.
///
/// Used headless and in tests; `set_current` simulates the browser landing
/// on a URL (e.g. the authorization server redirecting back).
#[derive(Debug)]
pub struct MemoryNavigator {
    inner: Mutex<NavigatorState>,
}

#[derive(Debug)]
struct NavigatorState {
    current: Url,
    history: Vec<Navigation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Assign(Url),
    Replace(Url),
}

impl Navigation {
    pub fn url(&self) -> &Url {
        match self {
            Navigation::Assign(url) | Navigation::Replace(url) => url,
        }
    }
}

impl MemoryNavigator {
    pub fn new(current: Url) -> Self {
        Self {
            inner: Mutex::new(NavigatorState {
                current,
                history: Vec::new(),
            }),
        }
    }

    pub fn set_current(&self, url: Url) {
        if let Ok(mut state) = self.inner.lock() {
            state.current = url;
        }
    }

    pub fn history(&self) -> Vec<Navigation> {
        self.inner
            .lock()
            .map(|state| state.history.clone())
            .unwrap_or_default()
    }

    pub fn last_navigation(&self) -> Option<Navigation> {
        self.inner
            .lock()
            .ok()
            .and_then(|state| state.history.last().cloned())
    }

    fn record(&self, navigation: Navigation) {
        if let Ok(mut state) = self.inner.lock() {
            state.current = navigation.url().clone();
            state.history.push(navigation);
        }
    }
}

impl Navigator for MemoryNavigator {
    fn current_url(&self) -> Url {
        match self.inner.lock() {
            Ok(state) => state.current.clone(),
            Err(poisoned) => poisoned.into_inner().current.clone(),
        }
    }

    fn assign(&self, url: &Url) {
        self.record(Navigation::Assign(url.clone()));
    }

    fn replace(&self, url: &Url) {
        self.record(Navigation::Replace(url.clone()));
    }
}

/// Opens authorization URLs in the system browser.
///
/// The "current location" is whatever the embedding program last reported
/// via [`BrowserNavigator::land_on`], e.g. the redirect captured by the
/// loopback callback listener.
#[derive(Debug)]
pub struct BrowserNavigator {
    location: MemoryNavigator,
}

impl BrowserNavigator {
    pub fn new(start: Url) -> Self {
        Self {
            location: MemoryNavigator::new(start),
        }
    }

    pub fn land_on(&self, url: Url) {
        self.location.set_current(url);
    }
}

impl Navigator for BrowserNavigator {
    fn current_url(&self) -> Url {
        self.location.current_url()
    }

    fn assign(&self, url: &Url) {
        if webbrowser::open(url.as_str()).is_err() {
            tracing::warn!("Could not open browser automatically. Please visit:\n{url}");
        }
        self.location.assign(url);
    }

    fn replace(&self, url: &Url) {
        tracing::debug!(%url, "navigation target after login");
        self.location.replace(url);
    }
}
