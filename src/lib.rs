pub mod api;
pub mod cli;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod jwt;
pub mod navigator;
pub mod oauth;
pub mod observers;
pub mod storage;

pub use client::{ApiClient, ApiResponse, ErrorResponse, Payload, RawForm, RequestOptions};
pub use config::{load_config, AuthConfig};
pub use context::{handle_landing, Landing, Role};
pub use error::AuthError;
pub use events::{AuthEvent, AuthEvents};
pub use navigator::{BrowserNavigator, MemoryNavigator, Navigation, Navigator};
pub use oauth::{
    AuthorizationOptions, OAuthSettings, RefreshRetryPolicy, SessionManager, SessionState,
    TokenPair, TokenStore,
};
pub use observers::{AuthorizationObserver, ExpiryObserver};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
