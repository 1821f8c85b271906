//! Reactive views of the session for UI routing.
//!
//! Each observer listens on the session's event channel from a background
//! task and publishes a boolean through a `watch` channel. Both must be
//! created inside a tokio runtime. Dropping an observer stops its task.

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::events::{AuthEvent, AuthEvents};
use crate::oauth::TokenStore;

/// Tracks "is authorized", re-reading the token store on every
/// `TokensChanged`.
#[derive(Debug)]
pub struct AuthorizationObserver {
    rx: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl AuthorizationObserver {
    pub fn subscribe(store: &TokenStore) -> Self {
        // Subscribe before the initial read so no write slips in between.
        let mut events = store.events().subscribe();
        let store = store.clone();
        let (tx, rx) = watch::channel(store.is_authorized());

        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(AuthEvent::TokensChanged) | Err(RecvError::Lagged(_)) => {
                        let authorized = store.is_authorized();
                        tx.send_if_modified(|current| {
                            let changed = *current != authorized;
                            *current = authorized;
                            changed
                        });
                    }
                    Ok(AuthEvent::AccessTokenExpired) => {}
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Self { rx, task }
    }

    pub fn current(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for the value to flip and return the new value.
    pub async fn changed(&mut self) -> Option<bool> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    pub fn watch(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }
}

impl Drop for AuthorizationObserver {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Latches `true` on the first `AccessTokenExpired` and stays there.
#[derive(Debug)]
pub struct ExpiryObserver {
    rx: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl ExpiryObserver {
    pub fn subscribe(events: &AuthEvents) -> Self {
        let mut events = events.subscribe();
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(AuthEvent::AccessTokenExpired) => {
                        tx.send_replace(true);
                        break;
                    }
                    Ok(AuthEvent::TokensChanged) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Self { rx, task }
    }

    pub fn is_expired(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the latch has fired; returns `false` if it never can.
    pub async fn expired(&mut self) -> bool {
        if *self.rx.borrow_and_update() {
            return true;
        }
        let _ = self.rx.changed().await;
        *self.rx.borrow()
    }
}

impl Drop for ExpiryObserver {
    fn drop(&mut self) {
        self.task.abort();
    }
}
