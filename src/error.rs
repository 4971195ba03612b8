#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("OAuth2 error during {operation}: {detail}")]
    OAuth {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },
    #[cfg(feature = "oauth")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Token decode error: {0}")]
    Decode(String),
    #[error("Session error: {0}")]
    Session(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn oauth(operation: &'static str, detail: impl Into<String>) -> Self {
        Self::OAuth {
            operation,
            status: None,
            detail: detail.into(),
        }
    }
}
