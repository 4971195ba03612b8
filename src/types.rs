use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::token::DecodedToken;

/// Session keys written and read by this crate.
pub mod keys {
    pub const USER: &str = "user";
    pub const ID_TOKEN: &str = "id_token";
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const POST_LOGIN_REDIRECT_URL: &str = "post_login_redirect_url";
    pub const API_ACCESS_TOKEN: &str = "kinde_api_access_token";
    pub const STATE: &str = "ac-state-key";
    pub const CODE_VERIFIER: &str = "ac-code-verifier";
}

/// Opaque session identifier bound to the session cookie.
///
/// Minted by [`SessionStore::save`](crate::middleware::SessionStore::save);
/// the store chooses the format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct SessionId(pub String);

/// Authenticated user profile stored in the session under [`keys::USER`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct KindeUser {
    pub id: String,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

impl KindeUser {
    /// A profile with only the Kinde user id set.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            given_name: None,
            family_name: None,
            email: None,
            picture: None,
        }
    }

    /// Sets the email address.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Build the profile from ID token claims. Returns `None` without `sub`.
    #[must_use]
    pub fn from_id_token(claims: &DecodedToken) -> Option<Self> {
        let text = |key: &str| {
            claims
                .get_claim(key)
                .and_then(JsonValue::as_str)
                .map(str::to_owned)
        };
        Some(Self {
            id: text("sub")?,
            given_name: text("given_name"),
            family_name: text("family_name"),
            email: text("email"),
            picture: text("picture"),
        })
    }
}

/// Result of a successful permission check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub is_granted: bool,
    pub org_code: Option<String>,
}

/// Which decoded token a claim lookup reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenKind {
    #[default]
    AccessToken,
    IdToken,
}
