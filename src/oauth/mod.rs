pub mod callback;
pub mod discovery;
pub mod pkce;
pub mod session;
pub mod state;
pub mod store;
pub mod token;

pub use callback::listen_for_callback;
pub use discovery::{discover_metadata, AuthorizationServerMetadata};
pub use pkce::{generate_pkce, PkceChallenge};
pub use session::{
    AuthorizationOptions, OAuthSettings, RefreshRetryPolicy, SessionManager, SessionState,
};
pub use state::PendingAuthorizationState;
pub use store::TokenStore;
pub use token::{TokenPair, TokenResponse};
