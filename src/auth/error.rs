use std::collections::HashMap;

/// Error response returned by the provider, either in a callback URL or a token
/// endpoint body.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse<K> {
    #[serde(rename = "error")]
    pub kind: K,
    #[serde(rename = "error_description")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "error_uri")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

pub type ProviderError = ErrorResponse<AuthorizationErrorKind>;

impl ProviderError {
    /// Extracts an error response from decoded callback parameters, if one is present.
    pub fn from_params(params: &HashMap<String, String>) -> Option<Self> {
        let kind = params.get("error")?;
        Some(Self {
            kind: kind.clone().into(),
            description: params.get("error_description").cloned(),
            uri: params.get("error_uri").cloned(),
        })
    }
}

impl<K: std::fmt::Display> std::fmt::Display for ErrorResponse<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.description {
            Some(description) => write!(f, "{} ({})", self.kind, description),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl From<AuthorizationErrorKind> for ProviderError {
    fn from(kind: AuthorizationErrorKind) -> Self {
        Self {
            kind,
            description: None,
            uri: None,
        }
    }
}

/// RFC 6749 and OpenID Connect error codes. Anything else is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AuthorizationErrorKind {
    InvalidRequest,
    UnauthorizedClient,
    AccessDenied,
    UnsupportedResponseType,
    InvalidScope,
    ServerError,
    TemporarilyUnavailable,
    InvalidClient,
    InvalidGrant,
    UnsupportedGrantType,
    InteractionRequired,
    LoginRequired,
    AccountSelectionRequired,
    ConsentRequired,
    Other(String),
}

impl AuthorizationErrorKind {
    pub fn as_str(&self) -> &str {
        use AuthorizationErrorKind::*;

        match self {
            InvalidRequest => "invalid_request",
            UnauthorizedClient => "unauthorized_client",
            AccessDenied => "access_denied",
            UnsupportedResponseType => "unsupported_response_type",
            InvalidScope => "invalid_scope",
            ServerError => "server_error",
            TemporarilyUnavailable => "temporarily_unavailable",
            InvalidClient => "invalid_client",
            InvalidGrant => "invalid_grant",
            UnsupportedGrantType => "unsupported_grant_type",
            InteractionRequired => "interaction_required",
            LoginRequired => "login_required",
            AccountSelectionRequired => "account_selection_required",
            ConsentRequired => "consent_required",
            Other(s) => s,
        }
    }

    /// The codes a `prompt=none` request yields when the user has no usable session.
    pub fn is_interaction_required(&self) -> bool {
        use AuthorizationErrorKind::*;

        matches!(
            self,
            InteractionRequired | LoginRequired | AccountSelectionRequired | ConsentRequired
        )
    }
}

impl From<String> for AuthorizationErrorKind {
    fn from(s: String) -> Self {
        use AuthorizationErrorKind::*;

        match s.as_str() {
            "invalid_request" => InvalidRequest,
            "unauthorized_client" => UnauthorizedClient,
            "access_denied" => AccessDenied,
            "unsupported_response_type" => UnsupportedResponseType,
            "invalid_scope" => InvalidScope,
            "server_error" => ServerError,
            "temporarily_unavailable" => TemporarilyUnavailable,
            "invalid_client" => InvalidClient,
            "invalid_grant" => InvalidGrant,
            "unsupported_grant_type" => UnsupportedGrantType,
            "interaction_required" => InteractionRequired,
            "login_required" => LoginRequired,
            "account_selection_required" => AccountSelectionRequired,
            "consent_required" => ConsentRequired,
            _ => Other(s),
        }
    }
}

impl From<AuthorizationErrorKind> for String {
    fn from(kind: AuthorizationErrorKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for AuthorizationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
