use std::sync::Arc;

use url::Url;

use crate::error::Error;

/// Kinde application settings.
///
/// Required fields are constructor parameters; optional ones use `with_*`.
/// The issuer is kept as the exact configured string, since tokens must
/// carry it verbatim as `iss`.
///
/// ```rust,ignore
/// use kinde_session::KindeConfig;
///
/// let config = KindeConfig::new(
///     "https://myapp.kinde.com",
///     "client-id",
///     "client-secret",
///     "https://myapp.com/kinde-auth/callback".parse()?,
///     "https://myapp.com".parse()?,
/// )
/// .with_audience("https://myapp.com/api");
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct KindeConfig {
    pub(crate) issuer: String,
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) callback_url: Url,
    pub(crate) post_logout_redirect_url: Url,
    pub(crate) post_login_redirect_url: String,
    pub(crate) audience: Option<String>,
    pub(crate) scopes: Vec<String>,
}

impl KindeConfig {
    #[must_use]
    pub fn new(
        issuer: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        callback_url: Url,
        post_logout_redirect_url: Url,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            callback_url,
            post_logout_redirect_url,
            post_login_redirect_url: "/".into(),
            audience: None,
            scopes: ["openid", "profile", "email", "offline"]
                .map(String::from)
                .to_vec(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `KINDE_ISSUER_URL`
    /// - `KINDE_CLIENT_ID`
    /// - `KINDE_CLIENT_SECRET`
    /// - `KINDE_CALLBACK_URL`
    /// - `KINDE_POST_LOGOUT_REDIRECT_URL`
    ///
    /// # Optional env vars
    /// - `KINDE_POST_LOGIN_REDIRECT_URL`: default landing page after callback (`/`)
    /// - `KINDE_AUDIENCE`: expected token audience
    /// - `KINDE_SCOPE`: space- or comma-separated scopes
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required env vars are missing or URLs are invalid.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::Config(format!("{name} is required")))
        };
        let url = |name: &str| -> Result<Url, Error> {
            required(name)?
                .parse()
                .map_err(|e| Error::Config(format!("{name}: {e}")))
        };

        let issuer = required("KINDE_ISSUER_URL")?;
        issuer
            .parse::<Url>()
            .map_err(|e| Error::Config(format!("KINDE_ISSUER_URL: {e}")))?;

        let mut config = Self::new(
            issuer,
            required("KINDE_CLIENT_ID")?,
            required("KINDE_CLIENT_SECRET")?,
            url("KINDE_CALLBACK_URL")?,
            url("KINDE_POST_LOGOUT_REDIRECT_URL")?,
        );

        if let Some(target) = lookup("KINDE_POST_LOGIN_REDIRECT_URL").filter(|v| !v.is_empty()) {
            config = config.with_post_login_redirect_url(target);
        }
        if let Some(audience) = lookup("KINDE_AUDIENCE").filter(|v| !v.is_empty()) {
            config = config.with_audience(audience);
        }
        if let Some(scope) = lookup("KINDE_SCOPE") {
            let scopes: Vec<String> = scope
                .split([' ', ','])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
            if !scopes.is_empty() {
                config = config.with_scopes(scopes);
            }
        }
        Ok(config)
    }

    /// Default landing page after login.
    #[must_use]
    pub fn with_post_login_redirect_url(mut self, target: impl Into<String>) -> Self {
        self.post_login_redirect_url = target.into();
        self
    }

    /// Audience requested on token calls and checked on cached tokens.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Scopes requested at login.
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Issuer exactly as configured; tokens must carry it as `iss`.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// OAuth client id of the Kinde application.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Client secret, sent on code exchange and client-credentials requests.
    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Redirect URI registered with Kinde.
    #[must_use]
    pub fn callback_url(&self) -> &Url {
        &self.callback_url
    }

    /// Where Kinde sends the browser after logout.
    #[must_use]
    pub fn post_logout_redirect_url(&self) -> &Url {
        &self.post_logout_redirect_url
    }

    /// Default landing page after a successful callback.
    #[must_use]
    pub fn post_login_redirect_url(&self) -> &str {
        &self.post_login_redirect_url
    }

    /// Expected token audience, if configured.
    #[must_use]
    pub fn audience(&self) -> Option<&str> {
        self.audience.as_deref()
    }

    /// Scopes requested at login.
    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Authorization endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the issuer cannot be extended into a URL.
    pub fn auth_url(&self) -> Result<Url, Error> {
        self.endpoint("oauth2/auth")
    }

    /// Token endpoint, used for both code exchange and client credentials.
    ///
    /// # Errors
    ///
    /// See [`KindeConfig::auth_url`].
    pub fn token_url(&self) -> Result<Url, Error> {
        self.endpoint("oauth2/token")
    }

    /// Provider logout endpoint, redirecting back to the post-logout URL.
    ///
    /// # Errors
    ///
    /// See [`KindeConfig::auth_url`].
    pub fn logout_url(&self) -> Result<Url, Error> {
        let mut url = self.endpoint("logout")?;
        url.query_pairs_mut()
            .append_pair("redirect", self.post_logout_redirect_url.as_str());
        Ok(url)
    }

    /// `path` under the issuer, ignoring any trailing slash on the issuer.
    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, Error> {
        format!("{}/{path}", self.issuer.trim_end_matches('/'))
            .parse()
            .map_err(|e| Error::Config(format!("invalid endpoint {path}: {e}")))
    }
}

/// Where request handlers get their [`KindeConfig`] from.
///
/// `Environment` re-reads the process environment on every request so a
/// deployment can change settings without rebuilding state.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    Environment,
    Fixed(Arc<KindeConfig>),
}

impl ConfigSource {
    /// Configuration for the current request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when reading the environment fails.
    pub fn resolve(&self) -> Result<KindeConfig, Error> {
        match self {
            Self::Environment => KindeConfig::from_env(),
            Self::Fixed(config) => Ok(KindeConfig::clone(config)),
        }
    }
}

impl From<KindeConfig> for ConfigSource {
    fn from(config: KindeConfig) -> Self {
        Self::Fixed(Arc::new(config))
    }
}
