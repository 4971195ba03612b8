use std::collections::HashMap;
use std::future::Future;

use serde::Deserialize;
use serde_json::Value as JsonValue;
use url::Url;

use crate::config::KindeConfig;
use crate::error::Error;
use crate::pkce::{self, PkcePair};
use crate::session::SessionManager;
use crate::token::DecodedToken;
use crate::types::{KindeUser, keys};

/// The identity provider as seen by the flow controller.
///
/// Each call reads and writes only through the given session; the client
/// itself keeps no per-user state.
pub trait OAuthClient: Send + Sync {
    /// Authorization URL for sign-in.
    fn login<M: SessionManager>(
        &self,
        session: &M,
    ) -> impl Future<Output = Result<Url, Error>> + Send;

    /// Authorization URL for sign-up.
    fn register<M: SessionManager>(
        &self,
        session: &M,
    ) -> impl Future<Output = Result<Url, Error>> + Send;

    /// Complete the authorization-code exchange, writing tokens into `session`.
    fn handle_redirect_to_app<M: SessionManager>(
        &self,
        session: &M,
        callback_url: &Url,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Provider logout URL.
    fn logout<M: SessionManager>(
        &self,
        session: &M,
    ) -> impl Future<Output = Result<Url, Error>> + Send;
}

/// Builds the per-request [`OAuthClient`] from the resolved configuration.
pub trait ClientFactory: Send + Sync + 'static {
    type Client: OAuthClient;

    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` cannot produce a client.
    fn build(&self, config: &KindeConfig) -> Result<Self::Client, Error>;
}

/// Token response from the Kinde token endpoint.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Authorization-code client with PKCE for a Kinde business.
pub struct AuthCodeClient {
    config: KindeConfig,
    http: reqwest::Client,
}

impl AuthCodeClient {
    /// Client for `config` with a fresh HTTP connection pool.
    #[must_use]
    pub fn new(config: KindeConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Settings this client was built from.
    #[must_use]
    pub fn config(&self) -> &KindeConfig {
        &self.config
    }

    async fn authorization_url<M: SessionManager>(
        &self,
        session: &M,
        start_page: Option<&str>,
    ) -> Result<Url, Error> {
        let state = pkce::generate_state();
        let pkce = PkcePair::generate();

        session
            .set_session_item(keys::STATE, JsonValue::String(state.clone()))
            .await?;
        session
            .set_session_item(keys::CODE_VERIFIER, JsonValue::String(pkce.verifier))
            .await?;

        let mut url = self.config.auth_url()?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.config.client_id)
                .append_pair("redirect_uri", self.config.callback_url.as_str())
                .append_pair("scope", &self.config.scopes.join(" "))
                .append_pair("state", &state)
                .append_pair("code_challenge", &pkce.challenge)
                .append_pair("code_challenge_method", "S256");
            if let Some(audience) = &self.config.audience {
                query.append_pair("audience", audience);
            }
            if let Some(page) = start_page {
                query.append_pair("start_page", page);
            }
        }
        Ok(url)
    }

    /// Exchange an authorization code for tokens using PKCE.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or
    /// [`Error::OAuth`] if the token endpoint returns an error.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, Error> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.callback_url.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code_verifier", code_verifier),
        ];
        self.token_request(&params, "token exchange").await
    }

    /// Use the session's refresh token to obtain and store fresh tokens.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OAuth`] if the session holds no refresh token or the
    /// provider rejects it, [`Error::Http`] on network failure.
    pub async fn refresh_tokens<M: SessionManager>(&self, session: &M) -> Result<(), Error> {
        let refresh_token = session
            .get_session_item(keys::REFRESH_TOKEN)
            .await?
            .and_then(|v| v.as_str().map(str::to_owned))
            .ok_or_else(|| Error::oauth("token refresh", "no refresh token in session"))?;

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        let tokens = self.token_request(&params, "token refresh").await?;
        store_tokens(session, tokens).await
    }

    async fn token_request(
        &self,
        params: &[(&str, &str)],
        operation: &'static str,
    ) -> Result<TokenResponse, Error> {
        let response = self
            .http
            .post(self.config.token_url()?)
            .form(params)
            .send()
            .await?;

        let response = ensure_success(response, operation).await?;
        response.json::<TokenResponse>().await.map_err(Into::into)
    }
}

impl OAuthClient for AuthCodeClient {
    async fn login<M: SessionManager>(&self, session: &M) -> Result<Url, Error> {
        self.authorization_url(session, None).await
    }

    async fn register<M: SessionManager>(&self, session: &M) -> Result<Url, Error> {
        self.authorization_url(session, Some("registration")).await
    }

    async fn handle_redirect_to_app<M: SessionManager>(
        &self,
        session: &M,
        callback_url: &Url,
    ) -> Result<(), Error> {
        let params: HashMap<String, String> = callback_url.query_pairs().into_owned().collect();

        if let Some(error) = params.get("error") {
            let desc = params
                .get("error_description")
                .map_or("Unknown error", String::as_str);
            tracing::warn!(error = %error, description = %desc, "OAuth2 error from Kinde");
            return Err(Error::oauth("authorization", format!("{error}: {desc}")));
        }

        let code = params
            .get("code")
            .ok_or_else(|| Error::oauth("callback", "missing code"))?;
        let received_state = params
            .get("state")
            .ok_or_else(|| Error::oauth("callback", "missing state"))?;

        let stored_state = session_string(session, keys::STATE).await?;
        if stored_state.as_ref() != Some(received_state) {
            tracing::warn!("OAuth state mismatch");
            return Err(Error::oauth("callback", "state mismatch"));
        }

        let code_verifier = session_string(session, keys::CODE_VERIFIER)
            .await?
            .ok_or_else(|| Error::oauth("callback", "missing code verifier"))?;

        let tokens = self.exchange_code(code, &code_verifier).await?;

        session.remove_session_item(keys::STATE).await?;
        session.remove_session_item(keys::CODE_VERIFIER).await?;
        store_tokens(session, tokens).await
    }

    async fn logout<M: SessionManager>(&self, session: &M) -> Result<Url, Error> {
        for key in [keys::ACCESS_TOKEN, keys::ID_TOKEN, keys::REFRESH_TOKEN, keys::USER] {
            session.remove_session_item(key).await?;
        }
        self.config.logout_url()
    }
}

/// Produces [`AuthCodeClient`]s sharing one HTTP connection pool.
#[derive(Clone, Default)]
pub struct AuthCodeClientFactory {
    http: reqwest::Client,
}

impl AuthCodeClientFactory {
    /// Factory whose clients share `http`.
    #[must_use]
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl ClientFactory for AuthCodeClientFactory {
    type Client = AuthCodeClient;

    fn build(&self, config: &KindeConfig) -> Result<AuthCodeClient, Error> {
        Ok(AuthCodeClient::new(config.clone()).with_http_client(self.http.clone()))
    }
}

async fn store_tokens<M: SessionManager>(session: &M, tokens: TokenResponse) -> Result<(), Error> {
    session
        .set_session_item(keys::ACCESS_TOKEN, JsonValue::String(tokens.access_token))
        .await?;

    if let Some(refresh_token) = tokens.refresh_token {
        session
            .set_session_item(keys::REFRESH_TOKEN, JsonValue::String(refresh_token))
            .await?;
    }

    if let Some(id_token) = tokens.id_token {
        let user = DecodedToken::payload(&id_token)
            .ok()
            .and_then(|claims| KindeUser::from_id_token(&claims));
        session
            .set_session_item(keys::ID_TOKEN, JsonValue::String(id_token))
            .await?;
        match user.map(serde_json::to_value) {
            Some(Ok(user)) => session.set_session_item(keys::USER, user).await?,
            Some(Err(e)) => tracing::warn!(error = %e, "Failed to serialize user profile"),
            None => tracing::warn!("ID token carries no usable profile"),
        }
    }
    Ok(())
}

async fn session_string<M: SessionManager>(session: &M, key: &str) -> Result<Option<String>, Error> {
    Ok(session
        .get_session_item(key)
        .await?
        .and_then(|v| v.as_str().map(str::to_owned)))
}

/// Checks HTTP response status; returns the response on success or an error with details.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response, Error> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(Error::OAuth {
        operation,
        status: Some(status),
        detail: body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;
    use crate::session::InMemorySession;
    use crate::token::tests::rs256;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn query(url: &Url) -> HashMap<String, String> {
        url.query_pairs().into_owned().collect()
    }

    #[tokio::test]
    async fn test_login_url_and_session_state() {
        let client = AuthCodeClient::new(test_config("https://myapp.kinde.com"));
        let session = InMemorySession::new();

        let url = client.login(&session).await.unwrap();
        let params = query(&url);

        assert_eq!(url.path(), "/oauth2/auth");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["client_id"], "test-client");
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(params["scope"], "openid profile email offline");
        assert!(!params.contains_key("start_page"));

        let items = session.snapshot();
        assert_eq!(items[keys::STATE], json!(params["state"]));
        let verifier = items[keys::CODE_VERIFIER].as_str().unwrap().to_owned();
        assert_eq!(
            PkcePair::from_verifier(verifier).challenge,
            params["code_challenge"]
        );
    }

    #[tokio::test]
    async fn test_register_url_with_audience() {
        let config = test_config("https://myapp.kinde.com").with_audience("https://api.example");
        let client = AuthCodeClient::new(config);

        let url = client.register(&InMemorySession::new()).await.unwrap();
        let params = query(&url);

        assert_eq!(params["start_page"], "registration");
        assert_eq!(params["audience"], "https://api.example");
    }

    #[tokio::test]
    async fn test_callback_exchanges_code_and_stores_tokens() {
        let server = MockServer::start().await;
        let id_token = rs256(json!({"sub": "kp_1", "email": "ada@example.com"}));
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at",
                "id_token": id_token,
                "refresh_token": "rt",
                "token_type": "bearer",
                "expires_in": 86399,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = AuthCodeClient::new(test_config(&server.uri()));
        let session = InMemorySession::new();
        session.set_session_item(keys::STATE, json!("st")).await.unwrap();
        session.set_session_item(keys::CODE_VERIFIER, json!("ver")).await.unwrap();

        let callback: Url = "https://app.example.com/kinde-auth/callback?code=abc&state=st"
            .parse()
            .unwrap();
        client.handle_redirect_to_app(&session, &callback).await.unwrap();

        let items = session.snapshot();
        assert_eq!(items[keys::ACCESS_TOKEN], json!("at"));
        assert_eq!(items[keys::REFRESH_TOKEN], json!("rt"));
        assert_eq!(items[keys::ID_TOKEN], json!(id_token));
        assert_eq!(items[keys::USER]["id"], json!("kp_1"));
        assert!(!items.contains_key(keys::STATE));
        assert!(!items.contains_key(keys::CODE_VERIFIER));
    }

    #[tokio::test]
    async fn test_callback_state_mismatch() {
        let client = AuthCodeClient::new(test_config("https://myapp.kinde.com"));
        let session = InMemorySession::new();
        session.set_session_item(keys::STATE, json!("expected")).await.unwrap();

        let callback: Url = "https://app.example.com/cb?code=abc&state=forged".parse().unwrap();
        let err = client
            .handle_redirect_to_app(&session, &callback)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::OAuth { operation: "callback", .. }));
    }

    #[tokio::test]
    async fn test_callback_provider_error() {
        let client = AuthCodeClient::new(test_config("https://myapp.kinde.com"));
        let callback: Url = "https://app.example.com/cb?error=access_denied&error_description=nope"
            .parse()
            .unwrap();
        let err = client
            .handle_redirect_to_app(&InMemorySession::new(), &callback)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("access_denied: nope"));
    }

    #[tokio::test]
    async fn test_token_endpoint_failure_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let client = AuthCodeClient::new(test_config(&server.uri()));
        let err = client.exchange_code("abc", "ver").await.unwrap_err();
        match err {
            Error::OAuth { status, detail, .. } => {
                assert_eq!(status, Some(400));
                assert_eq!(detail, "invalid_grant");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_refresh_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=rt1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at2",
                "refresh_token": "rt2",
            })))
            .mount(&server)
            .await;

        let client = AuthCodeClient::new(test_config(&server.uri()));
        let session = InMemorySession::new();
        session.set_session_item(keys::REFRESH_TOKEN, json!("rt1")).await.unwrap();

        client.refresh_tokens(&session).await.unwrap();
        let items = session.snapshot();
        assert_eq!(items[keys::ACCESS_TOKEN], json!("at2"));
        assert_eq!(items[keys::REFRESH_TOKEN], json!("rt2"));

        let empty = client.refresh_tokens(&InMemorySession::new()).await;
        assert!(matches!(empty, Err(Error::OAuth { .. })));
    }

    #[tokio::test]
    async fn test_logout_clears_tokens() {
        let client = AuthCodeClient::new(test_config("https://myapp.kinde.com"));
        let session = InMemorySession::new();
        session.set_session_item(keys::ACCESS_TOKEN, json!("at")).await.unwrap();
        session.set_session_item("other", json!(1)).await.unwrap();

        let url = client.logout(&session).await.unwrap();
        assert_eq!(url.path(), "/logout");
        assert_eq!(query(&url)["redirect"], "https://app.example.com/");

        let items = session.snapshot();
        assert!(!items.contains_key(keys::ACCESS_TOKEN));
        assert_eq!(items["other"], json!(1));
    }
}
