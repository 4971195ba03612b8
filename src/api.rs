//! Server-side clients for the Kinde management API.
//!
//! Authenticated with a client-credentials token that is cached in the
//! session under [`keys::API_ACCESS_TOKEN`] and re-fetched once it no longer
//! validates. Two concurrent requests on one session may both fetch; the
//! last session write wins.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use url::Url;

use crate::config::KindeConfig;
use crate::error::Error;
use crate::oauth::ensure_success;
use crate::session::SessionManager;
use crate::token;
use crate::types::keys;

/// Connection settings shared by every resource client.
#[derive(Debug)]
pub struct ApiConfiguration {
    base_path: Url,
    access_token: String,
    http: reqwest::Client,
}

impl ApiConfiguration {
    /// Management API root, the issuer URL.
    #[must_use]
    pub fn base_path(&self) -> &Url {
        &self.base_path
    }

    /// Bearer token sent with every request.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

/// JSON operations against one management-API resource prefix.
#[derive(Debug, Clone)]
pub struct ResourceClient {
    config: Arc<ApiConfiguration>,
    prefix: &'static str,
}

impl ResourceClient {
    fn new(config: Arc<ApiConfiguration>, prefix: &'static str) -> Self {
        Self { config, prefix }
    }

    /// Settings shared by all resource clients.
    #[must_use]
    pub fn configuration(&self) -> &ApiConfiguration {
        &self.config
    }

    /// Absolute URL of `path` under this resource (`""` = the collection).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the result is not a valid URL.
    pub fn url(&self, path: &str) -> Result<Url, Error> {
        let base = self.config.base_path.as_str().trim_end_matches('/');
        let full = match path.trim_start_matches('/') {
            "" => format!("{base}/{}", self.prefix),
            rest => format!("{base}/{}/{rest}", self.prefix),
        };
        full.parse()
            .map_err(|e| Error::Config(format!("invalid management API URL {full}: {e}")))
    }

    /// GET the collection.
    ///
    /// # Errors
    ///
    /// [`Error::Http`] on network failure, [`Error::OAuth`] on a non-2xx status.
    pub async fn list<T: DeserializeOwned>(&self) -> Result<T, Error> {
        self.get("").await
    }

    /// GET `path` under this resource.
    ///
    /// # Errors
    ///
    /// See [`ResourceClient::list`].
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let request = self.config.http.get(self.url(path)?);
        self.send(request, "management API get").await
    }

    /// POST `body` to the collection.
    ///
    /// # Errors
    ///
    /// See [`ResourceClient::list`].
    pub async fn create<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        body: &B,
    ) -> Result<T, Error> {
        let request = self.config.http.post(self.url("")?).json(body);
        self.send(request, "management API create").await
    }

    /// PATCH `path` with `body`.
    ///
    /// # Errors
    ///
    /// See [`ResourceClient::list`].
    pub async fn update<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Error> {
        let request = self.config.http.patch(self.url(path)?).json(body);
        self.send(request, "management API update").await
    }

    /// DELETE `path`; returns the response body, `Null` when empty.
    ///
    /// # Errors
    ///
    /// See [`ResourceClient::list`].
    pub async fn delete(&self, path: &str) -> Result<JsonValue, Error> {
        let request = self.config.http.delete(self.url(path)?);
        let response = request
            .bearer_auth(&self.config.access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        let body = ensure_success(response, "management API delete")
            .await?
            .bytes()
            .await?;
        if body.is_empty() {
            return Ok(JsonValue::Null);
        }
        serde_json::from_slice(&body)
            .map_err(|e| Error::oauth("management API delete", e.to_string()))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        operation: &'static str,
    ) -> Result<T, Error> {
        let response = request
            .bearer_auth(&self.config.access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        let response = ensure_success(response, operation).await?;
        response.json::<T>().await.map_err(Into::into)
    }
}

macro_rules! resource_clients {
    ($($(#[$meta:meta])* $name:ident => $prefix:literal),+ $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone)]
            pub struct $name(ResourceClient);

            impl $name {
                fn new(config: Arc<ApiConfiguration>) -> Self {
                    Self(ResourceClient::new(config, $prefix))
                }
            }

            impl std::ops::Deref for $name {
                type Target = ResourceClient;

                fn deref(&self) -> &ResourceClient {
                    &self.0
                }
            }
        )+
    };
}

resource_clients! {
    UsersApi => "api/v1/users",
    /// User profile and token introspection endpoints.
    OAuthApi => "oauth2",
    SubscribersApi => "api/v1/subscribers",
    OrganizationsApi => "api/v1/organizations",
    ConnectedAppsApi => "api/v1/connected_apps",
    FeatureFlagsApi => "api/v1/feature_flags",
    EnvironmentsApi => "api/v1/environment",
    PermissionsApi => "api/v1/permissions",
    RolesApi => "api/v1/roles",
    BusinessApi => "api/v1/business",
    IndustriesApi => "api/v1/industries",
    TimezonesApi => "api/v1/timezones",
    ApplicationsApi => "api/v1/applications",
    /// Redirect and logout URLs live under each application.
    CallbacksApi => "api/v1/applications",
    ApisApi => "api/v1/apis",
}

/// One client per management-API resource group, sharing a bearer token.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct KindeApiClient {
    pub users_api: UsersApi,
    pub oauth_api: OAuthApi,
    pub subscribers_api: SubscribersApi,
    pub organizations_api: OrganizationsApi,
    pub connected_apps_api: ConnectedAppsApi,
    pub feature_flags_api: FeatureFlagsApi,
    pub environments_api: EnvironmentsApi,
    pub permissions_api: PermissionsApi,
    pub roles_api: RolesApi,
    pub business_api: BusinessApi,
    pub industries_api: IndustriesApi,
    pub timezones_api: TimezonesApi,
    pub applications_api: ApplicationsApi,
    pub callbacks_api: CallbacksApi,
    pub apis_api: ApisApi,
}

impl KindeApiClient {
    /// Build all resource clients for `base_path` with `access_token`.
    #[must_use]
    pub fn new(base_path: Url, access_token: String, http: reqwest::Client) -> Self {
        let config = Arc::new(ApiConfiguration {
            base_path,
            access_token,
            http,
        });
        Self {
            users_api: UsersApi::new(config.clone()),
            oauth_api: OAuthApi::new(config.clone()),
            subscribers_api: SubscribersApi::new(config.clone()),
            organizations_api: OrganizationsApi::new(config.clone()),
            connected_apps_api: ConnectedAppsApi::new(config.clone()),
            feature_flags_api: FeatureFlagsApi::new(config.clone()),
            environments_api: EnvironmentsApi::new(config.clone()),
            permissions_api: PermissionsApi::new(config.clone()),
            roles_api: RolesApi::new(config.clone()),
            business_api: BusinessApi::new(config.clone()),
            industries_api: IndustriesApi::new(config.clone()),
            timezones_api: TimezonesApi::new(config.clone()),
            applications_api: ApplicationsApi::new(config.clone()),
            callbacks_api: CallbacksApi::new(config.clone()),
            apis_api: ApisApi::new(config),
        }
    }

    /// The bearer token every resource client sends.
    #[must_use]
    pub fn access_token(&self) -> &str {
        self.users_api.configuration().access_token()
    }
}

#[derive(serde::Deserialize)]
struct ClientCredentialsResponse {
    access_token: String,
}

/// Build management-API clients, reusing the session's cached token when it
/// still validates and fetching a client-credentials token otherwise.
///
/// # Errors
///
/// Returns [`Error::Http`] or [`Error::OAuth`] if a new token is needed and
/// the token endpoint fails. Failing to cache the new token is not an error.
pub async fn create_kinde_api_client<M: SessionManager>(
    config: &KindeConfig,
    session: &M,
    http: &reqwest::Client,
) -> Result<KindeApiClient, Error> {
    let cached = session.get_session_item(keys::API_ACCESS_TOKEN).await?;

    let access_token = match cached_token(config, cached) {
        Some(token) => token,
        None => {
            let token = fetch_client_credentials_token(config, http).await?;
            if let Err(e) = session
                .set_session_item(keys::API_ACCESS_TOKEN, JsonValue::String(token.clone()))
                .await
            {
                tracing::warn!(error = %e, "Failed to cache management API token");
            }
            token
        }
    };

    let base_path = config.endpoint("")?;
    Ok(KindeApiClient::new(base_path, access_token, http.clone()))
}

fn cached_token(config: &KindeConfig, cached: Option<JsonValue>) -> Option<String> {
    let cached = cached?;
    match token::is_token_valid(Some(&cached), config.issuer(), config.audience()) {
        Ok(true) => match cached {
            JsonValue::String(raw) => Some(raw),
            JsonValue::Object(mut map) => match map.remove("access_token") {
                Some(JsonValue::String(raw)) => Some(raw),
                _ => None,
            },
            _ => None,
        },
        Ok(false) => None,
        Err(e) => {
            tracing::debug!(error = %e, "Discarding undecodable cached management API token");
            None
        }
    }
}

/// Request a client-credentials token from the Kinde token endpoint.
///
/// # Errors
///
/// [`Error::Http`] on network failure, [`Error::OAuth`] on a non-2xx status.
pub async fn fetch_client_credentials_token(
    config: &KindeConfig,
    http: &reqwest::Client,
) -> Result<String, Error> {
    let params = [
        ("grant_type", "client_credentials"),
        ("client_id", config.client_id()),
        ("client_secret", config.client_secret()),
        ("audience", config.audience().unwrap_or_default()),
    ];

    let response = http
        .post(config.token_url()?)
        .form(&params)
        .send()
        .await?;

    let response = ensure_success(response, "client credentials").await?;
    let body = response.json::<ClientCredentialsResponse>().await?;
    Ok(body.access_token)
}
