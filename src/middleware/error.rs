use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Authentication errors for the middleware layer.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Auth route segment is not one of login, register, callback, logout.
    #[error("Unknown auth route: {0}")]
    UnknownRoute(String),

    /// Provider or network failure during the OAuth flow.
    #[error("OAuth error: {0}")]
    OAuth(String),

    /// Session store operation failed.
    #[error("Session store error: {0}")]
    Store(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::UnknownRoute(_) => (StatusCode::NOT_FOUND, self.to_string()).into_response(),
            Self::OAuth(_) => {
                tracing::error!(error = %self, "Authentication failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Authentication failed").into_response()
            }
            Self::Store(_) | Self::Config(_) => {
                tracing::error!(error = %self, "Auth internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
            }
        }
    }
}

impl From<crate::error::Error> for AuthError {
    fn from(e: crate::error::Error) -> Self {
        match e {
            crate::error::Error::Session(msg) => Self::Store(msg),
            crate::error::Error::Config(msg) => Self::Config(msg),
            other => Self::OAuth(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn maps_library_errors() {
        assert!(matches!(
            AuthError::from(Error::Session("down".into())),
            AuthError::Store(_)
        ));
        assert!(matches!(
            AuthError::from(Error::Config("KINDE_CLIENT_ID is required".into())),
            AuthError::Config(_)
        ));
        assert!(matches!(
            AuthError::from(Error::Decode("bad".into())),
            AuthError::OAuth(_)
        ));
    }

    #[test]
    fn status_codes() {
        let not_found = AuthError::UnknownRoute("x".into()).into_response();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let failed = AuthError::OAuth("invalid_grant".into()).into_response();
        assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
