use time::Duration;

use super::error::AuthError;
use crate::config::{ConfigSource, KindeConfig};

/// Cookie and routing settings shared by the router, extractors and
/// session adapters.
#[derive(Debug, Clone)]
pub(crate) struct AuthSettings {
    pub(crate) session_cookie_name: String,
    pub(crate) session_max_age: Duration,
    pub(crate) secure_cookies: bool,
    pub(crate) auth_path: String,
}

impl AuthSettings {
    pub(crate) fn defaults() -> Self {
        Self {
            session_cookie_name: "kinde_session".into(),
            session_max_age: Duration::hours(3),
            secure_cookies: true,
            auth_path: "/kinde-auth".into(),
        }
    }
}

/// Kinde authentication configuration.
///
/// Use [`from_env()`](KindeAuthConfig::from_env) for convention-based setup,
/// or [`new()`](KindeAuthConfig::new) with `with_*` methods for full control.
pub struct KindeAuthConfig {
    pub(super) source: ConfigSource,
    pub(super) settings: AuthSettings,
}

impl KindeAuthConfig {
    /// Create config with the given Kinde settings source.
    ///
    /// Cookie and routing options use defaults: cookie `kinde_session`,
    /// three-hour lifetime, `Secure`, routes under `/kinde-auth`.
    #[must_use]
    pub fn new(source: impl Into<ConfigSource>) -> Self {
        Self {
            source: source.into(),
            settings: AuthSettings::defaults(),
        }
    }

    /// Read Kinde settings from the environment on every request.
    ///
    /// The variables are validated once here so misconfiguration fails at
    /// startup; see [`KindeConfig::from_env`] for the list.
    ///
    /// # Optional env vars
    /// - `KINDE_INSECURE_COOKIES`: `"1"` or `"true"` drops the `Secure` cookie attribute
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if required env vars are missing or URLs are invalid.
    pub fn from_env() -> Result<Self, AuthError> {
        KindeConfig::from_env()?;

        let insecure = matches!(
            std::env::var("KINDE_INSECURE_COOKIES").as_deref(),
            Ok("1") | Ok("true"),
        );

        Ok(Self::new(ConfigSource::Environment).with_secure_cookies(!insecure))
    }

    /// Name of the session cookie.
    #[must_use]
    pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.settings.session_cookie_name = name.into();
        self
    }

    /// Lifetime of the session cookie.
    #[must_use]
    pub fn with_session_max_age(mut self, max_age: Duration) -> Self {
        self.settings.session_max_age = max_age;
        self
    }

    /// Whether cookies carry the `Secure` attribute.
    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.settings.secure_cookies = secure;
        self
    }

    /// Prefix the auth routes are mounted under.
    #[must_use]
    pub fn with_auth_path(mut self, path: impl Into<String>) -> Self {
        self.settings.auth_path = path.into();
        self
    }
}
