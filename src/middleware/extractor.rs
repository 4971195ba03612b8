use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::error::AuthError;
use super::session::SessionAdapter;
use super::state::KindeAuth;
use super::traits::SessionStore;
use crate::api::KindeApiClient;
use crate::claims::KindeSession;
use crate::oauth::ClientFactory;

/// Resolved Kinde session for the request's cookie.
///
/// Never rejects an anonymous request: check
/// [`is_authenticated`](KindeSession::is_authenticated) or the user field.
///
/// # Example
///
/// ```rust,ignore
/// async fn dashboard(kinde: KindeSession) -> impl IntoResponse {
///     match kinde.user() {
///         Some(user) => format!("Hello, {}", user.id),
///         None => "Hello, guest".to_string(),
///     }
/// }
/// ```
impl<F, S> FromRequestParts<KindeAuth<F, S>> for KindeSession
where
    F: ClientFactory,
    S: SessionStore,
{
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &KindeAuth<F, S>,
    ) -> Result<Self, Self::Rejection> {
        state.session(parts).await
    }
}

/// Management-API clients for the request.
///
/// Fetches a client-credentials token on first use and caches it in the
/// session; rejects with a generic 500 if the token endpoint fails.
impl<F, S> FromRequestParts<KindeAuth<F, S>> for KindeApiClient
where
    F: ClientFactory,
    S: SessionStore,
{
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &KindeAuth<F, S>,
    ) -> Result<Self, Self::Rejection> {
        state.api_client(parts).await
    }
}

/// The request's session adapter, shared with the other Kinde extractors.
///
/// Writes made through it are saved only by an explicit
/// [`persist`](SessionAdapter::persist) or [`commit`](SessionAdapter::commit).
impl<F, S> FromRequestParts<KindeAuth<F, S>> for SessionAdapter<S>
where
    F: ClientFactory,
    S: SessionStore,
{
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &KindeAuth<F, S>,
    ) -> Result<Self, Self::Rejection> {
        state.request_session(parts).await
    }
}
