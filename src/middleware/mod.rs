//! Kinde authentication for Axum.
//!
//! Mounts the login, register, callback and logout endpoints, keeps tokens
//! in a server-side session keyed by cookie, and exposes the resolved
//! session and management-API clients as extractors.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use kinde_session::AuthCodeClientFactory;
//! use kinde_session::middleware::{KindeAuth, KindeAuthConfig, MemorySessionStore, auth_routes};
//!
//! // 1. Configure from KINDE_* environment variables
//! let config = KindeAuthConfig::from_env()?;
//!
//! // 2. Build shared state with a session store (bring your own for production)
//! let auth = KindeAuth::new(config, AuthCodeClientFactory::default(), MemorySessionStore::new());
//!
//! // 3. Mount /kinde-auth/{login,register,callback,logout}
//! let app = axum::Router::new()
//!     .route("/dashboard", axum::routing::get(dashboard))
//!     .with_state(auth.clone())
//!     .merge(auth_routes(auth));
//!
//! // 4. Extract the session in handlers
//! async fn dashboard(kinde: kinde_session::KindeSession) -> String {
//!     format!("{:?}", kinde.get_boolean_flag("dark_mode", Some(false)))
//! }
//! ```

mod config;
mod cookies;
mod error;
mod extractor;
mod memory;
mod routes;
mod session;
mod state;
mod traits;

pub use config::KindeAuthConfig;
pub use error::AuthError;
pub use memory::MemorySessionStore;
pub use routes::{AuthRoute, auth_routes};
pub use session::SessionAdapter;
pub use state::KindeAuth;
pub use traits::SessionStore;
