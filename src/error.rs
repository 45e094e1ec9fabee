use crate::auth::error::ProviderError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Missing or malformed setup; fatal at initialization.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A user record that cannot be stored or read back.
    #[error("invalid user record: {0}")]
    Validation(String),
    /// No in-flight flow matches the callback. Treat as "no active flow".
    #[error("no matching flow: {0}")]
    CallbackMismatch(String),
    /// The provider answered the request with an error response.
    #[error("authorization rejected by provider: {0}")]
    Authorization(ProviderError),
    #[error("token validation failed: {0}")]
    TokenValidation(String),
    #[error("flow {0} timed out")]
    Timeout(String),
    #[error("a popup flow is already awaiting its callback")]
    ConcurrentFlow,
    /// Transport failure talking to the provider, the storage backend or the navigator.
    #[error("network error: {0}")]
    Network(String),
    #[error("popup window closed before the flow completed")]
    PopupClosed,
}

impl Error {
    pub fn is_callback_mismatch(&self) -> bool {
        matches!(self, Self::CallbackMismatch(_))
    }

    /// The provider refused a prompt-less request because the user must interact.
    pub fn is_interaction_required(&self) -> bool {
        match self {
            Self::Authorization(e) => e.kind.is_interaction_required(),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Network(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Self::Configuration(e.to_string())
    }
}

impl From<ProviderError> for Error {
    fn from(e: ProviderError) -> Self {
        Self::Authorization(e)
    }
}
