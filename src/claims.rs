//! Authorization data resolved from the session's stored tokens.

use serde_json::Value as JsonValue;

use crate::error::Error;
use crate::flags::{self, FeatureFlag, FlagError, FlagType, FlagValue};
use crate::session::SessionManager;
use crate::token::DecodedToken;
use crate::types::{KindeUser, Permission, TokenKind, keys};

/// The signed-in user's session: profile, tokens, permissions and flags.
///
/// Tokens are decoded without verification. A token that fails to decode
/// is treated as carrying no claims.
#[derive(Debug, Clone, Default)]
pub struct KindeSession {
    user: Option<KindeUser>,
    id_token_raw: Option<String>,
    access_token_raw: Option<String>,
    id_token: DecodedToken,
    access_token: DecodedToken,
    permissions: Vec<String>,
    user_organizations: Option<Vec<String>>,
    organization: Option<String>,
}

impl KindeSession {
    #[must_use]
    pub fn new(
        user: Option<KindeUser>,
        id_token_raw: Option<String>,
        access_token_raw: Option<String>,
    ) -> Self {
        let id_token = decode_or_empty(id_token_raw.as_deref(), "id_token");
        let access_token = decode_or_empty(access_token_raw.as_deref(), "access_token");

        let mut session = Self {
            user,
            id_token_raw,
            access_token_raw,
            id_token,
            access_token,
            ..Self::default()
        };

        session.permissions = session
            .get_claim(TokenKind::AccessToken, "permissions")
            .map(string_list)
            .unwrap_or_default();
        session.user_organizations = session
            .get_claim(TokenKind::IdToken, "org_codes")
            .map(string_list);
        session.organization = session
            .get_claim(TokenKind::AccessToken, "org_code")
            .and_then(JsonValue::as_str)
            .map(str::to_owned);
        session
    }

    /// Read `user`, `id_token` and `access_token` from a session.
    ///
    /// # Errors
    ///
    /// Only session access failures are returned; malformed values degrade
    /// to absent ones.
    pub async fn from_session<M: SessionManager>(session: &M) -> Result<Self, Error> {
        let user = session
            .get_session_item(keys::USER)
            .await?
            .and_then(|v| serde_json::from_value(v).ok());
        let id_token = session
            .get_session_item(keys::ID_TOKEN)
            .await?
            .and_then(raw_string);
        let access_token = session
            .get_session_item(keys::ACCESS_TOKEN)
            .await?
            .and_then(raw_string);
        Ok(Self::new(user, id_token, access_token))
    }

    /// Claim `claim` from the chosen token, `None` if that token has no claims.
    #[must_use]
    pub fn get_claim(&self, token: TokenKind, claim: &str) -> Option<&JsonValue> {
        let decoded = match token {
            TokenKind::AccessToken => &self.access_token,
            TokenKind::IdToken => &self.id_token,
        };
        if decoded.is_empty() {
            return None;
        }
        decoded.get_claim(claim)
    }

    /// `Some` iff `name` is among the access token's permissions.
    #[must_use]
    pub fn get_permission(&self, name: &str) -> Option<Permission> {
        self.permissions.iter().any(|p| p == name).then(|| Permission {
            is_granted: true,
            org_code: self.organization.clone(),
        })
    }

    /// Resolve a feature flag from the access token's `feature_flags` claim.
    ///
    /// # Errors
    ///
    /// [`FlagError::NotFound`] when the flag is absent and no default was
    /// given; [`FlagError::TypeMismatch`] when the token declares a different
    /// type than `kind`.
    pub fn get_flag(
        &self,
        code: &str,
        default_value: Option<FlagValue>,
        kind: FlagType,
    ) -> Result<FeatureFlag, FlagError> {
        let feature_flags = self.get_claim(TokenKind::AccessToken, "feature_flags");
        flags::resolve_flag(feature_flags, code, default_value, kind)
    }

    /// Boolean flag value, or `None` after logging a lookup failure.
    #[must_use]
    pub fn get_boolean_flag(&self, code: &str, default_value: Option<bool>) -> Option<bool> {
        self.typed_flag(code, default_value.map(FlagValue::from), FlagType::Boolean)
            .and_then(|v| v.as_bool())
    }

    /// String flag value, or `None` after logging a lookup failure.
    #[must_use]
    pub fn get_string_flag(&self, code: &str, default_value: Option<&str>) -> Option<String> {
        self.typed_flag(code, default_value.map(FlagValue::from), FlagType::String)
            .and_then(|v| v.as_str().map(str::to_owned))
    }

    /// Integer flag value, or `None` after logging a lookup failure.
    #[must_use]
    pub fn get_integer_flag(&self, code: &str, default_value: Option<i64>) -> Option<i64> {
        self.typed_flag(code, default_value.map(FlagValue::from), FlagType::Integer)
            .and_then(|v| v.as_i64())
    }

    // Flag lookups back page rendering; failures are logged and collapse to `None`.
    fn typed_flag(
        &self,
        code: &str,
        default_value: Option<FlagValue>,
        kind: FlagType,
    ) -> Option<FlagValue> {
        match self.get_flag(code, default_value, kind) {
            Ok(flag) => flag.value,
            Err(e) => {
                tracing::error!(error = %e, code = %code, "Feature flag lookup failed");
                None
            }
        }
    }

    /// The signed-in user's profile, if any.
    #[must_use]
    pub fn user(&self) -> Option<&KindeUser> {
        self.user.as_ref()
    }

    /// True when the session holds a user and a decodable access token.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() && !self.access_token.is_empty()
    }

    /// Decoded ID token payload; empty when absent or undecodable.
    #[must_use]
    pub fn id_token(&self) -> &DecodedToken {
        &self.id_token
    }

    /// Decoded access token payload; empty when absent or undecodable.
    #[must_use]
    pub fn access_token(&self) -> &DecodedToken {
        &self.access_token
    }

    /// The ID token as stored in the session.
    #[must_use]
    pub fn id_token_raw(&self) -> Option<&str> {
        self.id_token_raw.as_deref()
    }

    /// The access token as stored in the session.
    #[must_use]
    pub fn access_token_raw(&self) -> Option<&str> {
        self.access_token_raw.as_deref()
    }

    /// Permission names from the access token's `permissions` claim.
    #[must_use]
    pub fn permissions(&self) -> &[String] {
        &self.permissions
    }

    /// Organization codes from the ID token's `org_codes` claim.
    #[must_use]
    pub fn user_organizations(&self) -> Option<&[String]> {
        self.user_organizations.as_deref()
    }

    /// The access token's `org_code` claim.
    #[must_use]
    pub fn organization(&self) -> Option<&str> {
        self.organization.as_deref()
    }
}

fn decode_or_empty(raw: Option<&str>, which: &'static str) -> DecodedToken {
    let Some(raw) = raw else {
        return DecodedToken::default();
    };
    DecodedToken::payload(raw).unwrap_or_else(|e| {
        tracing::debug!(error = %e, token = which, "Ignoring undecodable token");
        DecodedToken::default()
    })
}

fn raw_string(value: JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) if !s.is_empty() => Some(s),
        _ => None,
    }
}

fn string_list(value: &JsonValue) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(JsonValue::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::InMemorySession;
    use crate::token::tests::{now, rs256};
    use serde_json::json;

    fn with_access_token(payload: JsonValue) -> KindeSession {
        KindeSession::new(None, None, Some(rs256(payload)))
    }

    #[test]
    fn test_permission_granted_with_org_code() {
        let session = with_access_token(json!({
            "permissions": ["read:users"],
            "org_code": "org_1",
            "exp": now() + 600,
        }));

        assert_eq!(
            session.get_permission("read:users"),
            Some(Permission {
                is_granted: true,
                org_code: Some("org_1".into()),
            })
        );
        assert_eq!(session.get_permission("write:users"), None);
        assert_eq!(session.organization(), Some("org_1"));
    }

    #[test]
    fn test_permission_absent_claims() {
        let empty = with_access_token(json!({"permissions": []}));
        assert_eq!(empty.get_permission("read:users"), None);

        let missing = with_access_token(json!({"org_code": "org_1"}));
        assert!(missing.permissions().is_empty());
        assert_eq!(missing.get_permission("read:users"), None);
    }

    #[test]
    fn test_boolean_flag() {
        let session = with_access_token(json!({
            "feature_flags": {"dark_mode": {"t": "b", "v": true}},
        }));
        assert_eq!(session.get_boolean_flag("dark_mode", Some(false)), Some(true));
        assert_eq!(session.get_boolean_flag("missing_flag", Some(false)), Some(false));
        assert_eq!(session.get_boolean_flag("missing_flag", None), None);
    }

    #[test]
    fn test_typed_flag_mismatch_yields_none() {
        let session = with_access_token(json!({
            "feature_flags": {"limit": {"t": "i", "v": 10}},
        }));
        assert_eq!(session.get_string_flag("limit", Some("x")), None);
        assert_eq!(session.get_integer_flag("limit", Some(1)), Some(10));

        let err = session
            .get_flag("limit", Some("x".into()), FlagType::String)
            .unwrap_err();
        assert!(matches!(err, FlagError::TypeMismatch { .. }));
    }

    #[test]
    fn test_value_of_wrong_kind_yields_none() {
        let session = with_access_token(json!({
            "feature_flags": {"beta": {"t": "b", "v": "yes"}},
        }));
        assert_eq!(session.get_boolean_flag("beta", Some(false)), None);
        assert!(matches!(
            session.get_flag("beta", Some(false.into()), FlagType::Boolean),
            Err(FlagError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_is_authenticated_needs_user_and_access_token() {
        let user = KindeUser::new("kp_1").with_email("ada@example.com");
        let token = rs256(json!({"permissions": []}));

        let signed_in = KindeSession::new(Some(user.clone()), None, Some(token.clone()));
        assert!(signed_in.is_authenticated());
        assert_eq!(signed_in.user().and_then(|u| u.email.as_deref()), Some("ada@example.com"));

        assert!(!KindeSession::new(Some(user), None, None).is_authenticated());
        assert!(!KindeSession::new(None, None, Some(token)).is_authenticated());
    }

    #[test]
    fn test_string_flag_default() {
        let session = with_access_token(json!({
            "feature_flags": {"theme": {"t": "s", "v": "pink"}},
        }));
        assert_eq!(session.get_string_flag("theme", None), Some("pink".into()));
        assert_eq!(session.get_string_flag("font", Some("serif")), Some("serif".into()));
    }

    #[test]
    fn test_undecodable_tokens_are_empty() {
        let session = KindeSession::new(None, Some("garbage".into()), Some("x.y.z".into()));

        assert!(session.access_token().is_empty());
        assert!(session.id_token().is_empty());
        assert_eq!(session.get_claim(TokenKind::AccessToken, "org_code"), None);
        assert_eq!(session.get_claim(TokenKind::IdToken, "org_codes"), None);
        assert_eq!(session.get_permission("read:users"), None);
        assert_eq!(session.get_boolean_flag("dark_mode", None), None);
        assert!(matches!(
            session.get_flag("dark_mode", None, FlagType::Boolean),
            Err(FlagError::NotFound { .. })
        ));
        assert_eq!(session.access_token_raw(), Some("x.y.z"));
    }

    #[test]
    fn test_user_organizations_from_id_token() {
        let session = KindeSession::new(
            None,
            Some(rs256(json!({"org_codes": ["org_1", "org_2"]}))),
            None,
        );
        assert_eq!(
            session.user_organizations(),
            Some(&["org_1".to_string(), "org_2".to_string()][..])
        );
        assert_eq!(session.organization(), None);
    }

    #[tokio::test]
    async fn test_from_session() {
        let store = InMemorySession::new();
        store
            .set_session_item(keys::USER, json!({"id": "kp_1", "email": "a@b.c"}))
            .await
            .unwrap();
        store
            .set_session_item(keys::ACCESS_TOKEN, json!(rs256(json!({"permissions": ["p"]}))))
            .await
            .unwrap();

        let session = KindeSession::from_session(&store).await.unwrap();
        assert_eq!(session.user().map(|u| u.id.as_str()), Some("kp_1"));
        assert!(session.is_authenticated());
        assert!(session.get_permission("p").is_some());
        assert_eq!(session.id_token_raw(), None);
    }

    #[tokio::test]
    async fn test_from_empty_session() {
        let session = KindeSession::from_session(&InMemorySession::new()).await.unwrap();
        assert!(session.user().is_none());
        assert!(!session.is_authenticated());
        assert!(session.permissions().is_empty());
    }
}
