/// Client Module Index
///
/// The dashboard side of the session contract: where the credential lives, how every API call
/// carries it, and what happens when the server rejects it.

/// Durable storage for the single credential.
pub mod token_store;

/// HTTP client that attaches the credential and reacts to 401/403.
pub mod gateway;

/// Login, logout and route-to-view resolution.
pub mod session;

pub use gateway::{ApiClient, ClientError, SESSION_EXPIRED_NOTICE};
pub use session::{LogNavigator, Navigator, Session, View, resolve_view};
pub use token_store::{FileTokenStore, MemoryTokenStore, TOKEN_KEY, TokenStore};
