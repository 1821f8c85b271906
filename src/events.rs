//! Process-wide auth signals.
//!
//! Replaces page-level event dispatch with a broadcast channel: every
//! subscriber sees every event sent after it subscribed. Sending with no
//! subscribers is not an error.

use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// The live token pair was written or cleared.
    TokensChanged,
    /// A resource call was rejected with `AUTHENTICATION_EXPIRED`.
    AccessTokenExpired,
}

#[derive(Debug, Clone)]
pub struct AuthEvents {
    tx: broadcast::Sender<AuthEvent>,
}

impl Default for AuthEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn emit(&self, event: AuthEvent) {
        let receivers = self.tx.send(event).unwrap_or(0);
        tracing::trace!(?event, receivers, "auth event emitted");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
