#![doc = include_str!("../README.md")]

pub mod claims;
pub mod config;
pub mod error;
pub mod flags;
pub mod session;
pub mod token;
pub mod types;

#[cfg(feature = "oauth")]
pub mod api;
#[cfg(feature = "oauth")]
pub mod oauth;
#[cfg(feature = "oauth")]
pub mod pkce;

#[cfg(feature = "middleware")]
pub mod middleware;

// Re-exports for convenient access
pub use claims::KindeSession;
pub use config::{ConfigSource, KindeConfig};
pub use error::Error;
pub use flags::{FeatureFlag, FlagError, FlagType, FlagValue};
pub use session::{InMemorySession, SessionData, SessionManager};
pub use token::{DecodedToken, is_token_valid};
pub use types::{KindeUser, Permission, SessionId, TokenKind, keys};

#[cfg(feature = "oauth")]
pub use api::{KindeApiClient, create_kinde_api_client};
#[cfg(feature = "oauth")]
pub use oauth::{AuthCodeClient, AuthCodeClientFactory, ClientFactory, OAuthClient, TokenResponse};
