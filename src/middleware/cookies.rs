use axum::http::HeaderMap;
use axum::http::header::COOKIE;
use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

use crate::types::SessionId;

/// Create session cookie.
pub(super) fn session_cookie(
    name: &str,
    session_id: &SessionId,
    max_age: Duration,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((name.to_string(), session_id.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/".to_string())
        .max_age(max_age)
        .build()
}

/// Create removal cookie for session.
pub(super) fn clear_session_cookie(name: &str, secure: bool) -> Cookie<'static> {
    Cookie::build((name.to_string(), ""))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/".to_string())
        .max_age(Duration::ZERO)
        .build()
}

/// Session ID from the inbound `Cookie` headers, if any.
pub(super) fn session_id_from_headers(headers: &HeaderMap, name: &str) -> Option<SessionId> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|c| c.name() == name && !c.value().is_empty())
        .map(|c| SessionId(c.value().to_string()))
}
