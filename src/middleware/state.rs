use std::sync::Arc;

use axum::http::HeaderMap;
use axum::http::request::Parts;

use super::config::{AuthSettings, KindeAuthConfig};
use super::error::AuthError;
use super::session::SessionAdapter;
use super::traits::SessionStore;
use crate::api::{self, KindeApiClient};
use crate::claims::KindeSession;
use crate::config::{ConfigSource, KindeConfig};
use crate::oauth::ClientFactory;

/// Shared state for auth route handlers and extractors.
///
/// Cheap to clone. Holds no per-user state: everything user-specific lives
/// in the session store.
pub struct KindeAuth<F, S> {
    pub(super) factory: Arc<F>,
    pub(super) session_store: Arc<S>,
    pub(super) source: ConfigSource,
    pub(super) settings: Arc<AuthSettings>,
    pub(super) http: reqwest::Client,
}

// Manual Clone: avoid derive adding `F: Clone, S: Clone` bounds.
impl<F, S> Clone for KindeAuth<F, S> {
    fn clone(&self) -> Self {
        Self {
            factory: self.factory.clone(),
            session_store: self.session_store.clone(),
            source: self.source.clone(),
            settings: self.settings.clone(),
            http: self.http.clone(),
        }
    }
}

impl<F: ClientFactory, S: SessionStore> KindeAuth<F, S> {
    /// State from `config`, a client factory and a session store.
    #[must_use]
    pub fn new(config: KindeAuthConfig, factory: F, session_store: S) -> Self {
        Self {
            factory: Arc::new(factory),
            session_store: Arc::new(session_store),
            source: config.source,
            settings: Arc::new(config.settings),
            http: reqwest::Client::new(),
        }
    }

    /// HTTP client used for management-API calls.
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// The backing session store.
    #[must_use]
    pub fn session_store(&self) -> &S {
        &self.session_store
    }

    /// Kinde settings for the current request.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if the configuration source fails.
    pub fn config(&self) -> Result<KindeConfig, AuthError> {
        Ok(self.source.resolve()?)
    }

    /// Open the session named by the request's cookie.
    ///
    /// Each call yields an independent adapter. Extractors share one per
    /// request through [`request_session`](Self::request_session).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Store`] if the session store fails.
    pub async fn open_session(&self, headers: &HeaderMap) -> Result<SessionAdapter<S>, AuthError> {
        Ok(SessionAdapter::open(self.session_store.clone(), self.settings.clone(), headers).await?)
    }

    /// The request's session adapter, opened on first use and cached in the
    /// request extensions so every later caller shares it.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Store`] if the session store fails.
    pub async fn request_session(&self, parts: &mut Parts) -> Result<SessionAdapter<S>, AuthError> {
        if let Some(session) = parts.extensions.get::<SessionAdapter<S>>() {
            return Ok(session.clone());
        }
        let session = self.open_session(&parts.headers).await?;
        parts.extensions.insert(session.clone());
        Ok(session)
    }

    /// User, tokens, permissions and flags for the request's session.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Store`] if the session store fails.
    pub async fn session(&self, parts: &mut Parts) -> Result<KindeSession, AuthError> {
        let session = self.request_session(parts).await?;
        Ok(KindeSession::from_session(&session).await?)
    }

    /// Management-API clients authenticated with a cached or fresh
    /// client-credentials token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::OAuth`] if a token is needed and the token
    /// endpoint fails.
    pub async fn api_client(&self, parts: &mut Parts) -> Result<KindeApiClient, AuthError> {
        let config = self.config()?;
        let session = self.request_session(parts).await?;
        let client = api::create_kinde_api_client(&config, &session, &self.http).await?;

        if let Err(e) = session.persist().await {
            tracing::warn!(error = %e, "Failed to persist management API token");
        }
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;
    use axum::http::header::COOKIE;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::tests::test_config;
    use crate::middleware::memory::MemorySessionStore;
    use crate::oauth::AuthCodeClientFactory;
    use crate::session::{SessionData, SessionManager};
    use crate::token::tests::{now, rs256};
    use crate::types::keys;

    fn parts(cookie: &str) -> Parts {
        Request::get("/").header(COOKIE, cookie).body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn request_session_is_shared_within_a_request() {
        let server = MockServer::start().await;
        let token = rs256(json!({"iss": server.uri(), "exp": now() + 3600}));
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": token})))
            .expect(1)
            .mount(&server)
            .await;

        let auth = KindeAuth::new(
            KindeAuthConfig::new(test_config(&server.uri())),
            AuthCodeClientFactory::default(),
            MemorySessionStore::new(),
        );
        let id = auth.session_store().save(None, &SessionData::new()).await.unwrap();
        let mut parts = parts(&format!("kinde_session={id}"));

        let handler_session = auth.request_session(&mut parts).await.unwrap();
        auth.api_client(&mut parts).await.unwrap();
        assert_eq!(
            handler_session.get_session_item(keys::API_ACCESS_TOKEN).await.unwrap(),
            Some(json!(token))
        );

        handler_session
            .set_session_item("last_page", json!("/reports"))
            .await
            .unwrap();
        handler_session.persist().await.unwrap();

        let stored = auth.session_store().load(&id).await.unwrap().unwrap();
        assert_eq!(stored[keys::API_ACCESS_TOKEN], json!(token));
        assert_eq!(stored["last_page"], json!("/reports"));

        // A second client in the same request reuses the cached token.
        let again = auth.api_client(&mut parts).await.unwrap();
        assert_eq!(again.access_token(), token);
    }

    #[tokio::test]
    async fn separate_requests_get_separate_adapters() {
        let auth = KindeAuth::new(
            KindeAuthConfig::new(test_config("https://myapp.kinde.com")),
            AuthCodeClientFactory::default(),
            MemorySessionStore::new(),
        );
        let mut first = parts("kinde_session=a");
        let mut second = parts("kinde_session=a");

        let a = auth.request_session(&mut first).await.unwrap();
        let b = auth.request_session(&mut second).await.unwrap();
        a.set_session_item("k", json!(1)).await.unwrap();
        assert_eq!(b.get_session_item("k").await.unwrap(), None);
        assert!(auth.session(&mut first).await.unwrap().user().is_none());
    }
}
