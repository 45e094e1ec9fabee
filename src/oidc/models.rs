use url::Url;

use crate::core::types::{ClientId, StateToken};

use super::types::{Display, Nonce, Prompt};

/// OpenID Connect extension parameters of an authorization request.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct AuthorizationRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<Nonce>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<Display>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<Prompt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui_locales: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token_hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acr_values: Option<String>,
}

impl AuthorizationRequest {
    pub fn with_nonce(nonce: Option<Nonce>) -> Self {
        Self {
            nonce,
            ..Default::default()
        }
    }

    /// Parameters of a request that must complete without any user interaction.
    pub fn silent(nonce: Option<Nonce>, id_token_hint: Option<String>) -> Self {
        Self {
            nonce,
            prompt: Some(Prompt::None),
            id_token_hint,
            ..Default::default()
        }
    }
}

/// Parameters sent to the end-session endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EndSessionRequest {
    pub client_id: ClientId,
    pub state: StateToken,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token_hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_logout_redirect_uri: Option<Url>,
}
