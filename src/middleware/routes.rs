use std::str::FromStr;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, Uri};
use axum::response::{AppendHeaders, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum_extra::extract::cookie::Cookie;
use serde_json::Value as JsonValue;
use url::Url;

use super::error::AuthError;
use super::session::SessionAdapter;
use super::state::KindeAuth;
use super::traits::SessionStore;
use crate::oauth::{ClientFactory, OAuthClient};
use crate::session::SessionManager;
use crate::types::keys;

/// The four auth endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRoute {
    Login,
    Register,
    Callback,
    Logout,
}

impl FromStr for AuthRoute {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "login" => Ok(Self::Login),
            "register" => Ok(Self::Register),
            "callback" => Ok(Self::Callback),
            "logout" => Ok(Self::Logout),
            other => Err(AuthError::UnknownRoute(other.to_string())),
        }
    }
}

/// Create the Kinde authentication router: `GET {auth_path}/{route}`.
pub fn auth_routes<F, S>(auth: KindeAuth<F, S>) -> Router
where
    F: ClientFactory,
    S: SessionStore,
{
    let auth_path = auth.settings.auth_path.trim_end_matches('/').to_string();

    Router::new()
        .route(&format!("{auth_path}/{{route}}"), get(auth_handler::<F, S>))
        .with_state(auth)
}

async fn auth_handler<F: ClientFactory, S: SessionStore>(
    State(auth): State<KindeAuth<F, S>>,
    Path(route): Path<String>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, AuthError> {
    let route: AuthRoute = route.parse()?;
    auth.handle_auth(route, &uri, &headers).await
}

impl<F: ClientFactory, S: SessionStore> KindeAuth<F, S> {
    /// Run one step of the login flow and build its redirect.
    ///
    /// Provider failures are returned unchanged and never retried; a code
    /// exchange cannot be replayed.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::OAuth`] for provider or network failures,
    /// [`AuthError::Store`] / [`AuthError::Config`] for local ones.
    pub async fn handle_auth(
        &self,
        route: AuthRoute,
        uri: &Uri,
        headers: &HeaderMap,
    ) -> Result<Response, AuthError> {
        let config = self.config()?;
        let client = self.factory.build(&config)?;
        let session = self.open_session(headers).await?;

        match route {
            AuthRoute::Login => {
                let auth_url = client.login(&session).await?;
                self.start_flow(&session, uri, auth_url).await
            }
            AuthRoute::Register => {
                let auth_url = client.register(&session).await?;
                self.start_flow(&session, uri, auth_url).await
            }
            AuthRoute::Callback => {
                let mut callback_url = config.callback_url().clone();
                callback_url.set_query(uri.query());
                client.handle_redirect_to_app(&session, &callback_url).await?;

                let stashed = session.get_session_item(keys::POST_LOGIN_REDIRECT_URL).await?;
                session.remove_session_item(keys::POST_LOGIN_REDIRECT_URL).await?;

                let target = match stashed {
                    Some(JsonValue::String(url)) if !url.is_empty() => url,
                    _ => config.post_login_redirect_url().to_string(),
                };

                let cookie = session.commit(self.settings.session_max_age).await?;
                tracing::info!(session_id = ?session.id(), "Kinde login successful");
                Ok(redirect_with_cookie(&target, cookie))
            }
            AuthRoute::Logout => {
                let logout_url = client.logout(&session).await?;
                let cookie = session.destroy().await?;
                Ok(redirect_with_cookie(logout_url.as_str(), cookie))
            }
        }
    }

    async fn start_flow(
        &self,
        session: &SessionAdapter<S>,
        uri: &Uri,
        auth_url: Url,
    ) -> Result<Response, AuthError> {
        if let Some(return_to) = return_to(uri) {
            session
                .set_session_item(keys::POST_LOGIN_REDIRECT_URL, JsonValue::String(return_to))
                .await?;
        }
        let cookie = session.commit(self.settings.session_max_age).await?;
        Ok(redirect_with_cookie(auth_url.as_str(), cookie))
    }
}

fn return_to(uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "returnTo")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

fn redirect_with_cookie(target: &str, cookie: Cookie<'static>) -> Response {
    (
        AppendHeaders([(SET_COOKIE, cookie.to_string())]),
        Redirect::to(target),
    )
        .into_response()
}
