//! Token store: the single live [`TokenPair`] plus the transient pending
//! authorization record.
//!
//! No in-memory cache: every read goes to the backing [`KeyValueStore`], so
//! independent readers always see the latest write.

use std::sync::Arc;

use crate::error::AuthError;
use crate::events::{AuthEvent, AuthEvents};
use crate::oauth::state::PendingAuthorizationState;
use crate::oauth::token::TokenPair;
use crate::storage::KeyValueStore;

pub const TOKENS_KEY: &str = "oauth-tokens";
pub const PENDING_KEY: &str = "oauth-pending-authorization";

#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn KeyValueStore>,
    events: AuthEvents,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore").finish_non_exhaustive()
    }
}

impl TokenStore {
    pub fn new(storage: Arc<dyn KeyValueStore>, events: AuthEvents) -> Self {
        Self { storage, events }
    }

    pub fn events(&self) -> &AuthEvents {
        &self.events
    }

    pub(crate) fn backing(&self) -> Arc<dyn KeyValueStore> {
        self.storage.clone()
    }

    /// The live token pair. Unreadable or corrupt entries read as absent.
    pub fn read(&self) -> Option<TokenPair> {
        let raw = match self.storage.get(TOKENS_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!("Failed to read tokens: {e}");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(pair) => Some(pair),
            Err(e) => {
                tracing::warn!("Ignoring corrupt token entry: {e}");
                None
            }
        }
    }

    /// An access token is present.
    pub fn is_authorized(&self) -> bool {
        self.read()
            .is_some_and(|tokens| !tokens.access_token.is_empty())
    }

    /// Replace the live pair and notify observers.
    pub fn write(&self, pair: &TokenPair) -> Result<(), AuthError> {
        let data = serde_json::to_string(pair)
            .map_err(|e| AuthError::Storage(format!("Failed to serialize tokens: {e}")))?;
        self.storage.set(TOKENS_KEY, &data)?;
        self.events.emit(AuthEvent::TokensChanged);
        Ok(())
    }

    /// Remove the live pair and notify observers.
    pub fn clear(&self) -> Result<(), AuthError> {
        self.storage.remove(TOKENS_KEY)?;
        self.events.emit(AuthEvent::TokensChanged);
        Ok(())
    }

    pub fn save_pending(&self, pending: &PendingAuthorizationState) -> Result<(), AuthError> {
        let data = serde_json::to_string(pending).map_err(|e| {
            AuthError::Storage(format!("Failed to serialize pending authorization: {e}"))
        })?;
        self.storage.set(PENDING_KEY, &data)
    }

    /// Read and remove the pending record. The entry is removed even when it
    /// fails to parse, so a bad record cannot be replayed.
    pub fn take_pending(&self) -> Result<Option<PendingAuthorizationState>, AuthError> {
        let Some(raw) = self.storage.get(PENDING_KEY)? else {
            return Ok(None);
        };
        self.storage.remove(PENDING_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(pending) => Ok(Some(pending)),
            Err(e) => {
                tracing::warn!("Discarding corrupt pending authorization: {e}");
                Ok(None)
            }
        }
    }
}
