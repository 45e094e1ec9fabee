use url::Url;

use crate::core::types::{ClientId, Scope};

#[derive(Debug, Clone)]
#[derive(serde::Serialize)]
#[serde(tag = "grant_type")]
pub enum TokenRequest {
    #[serde(rename = "authorization_code")]
    AuthorizationCode(AuthorizationCodeTokenRequest),
    #[serde(rename = "refresh_token")]
    RefreshToken(RefreshTokenRequest),
}

#[derive(Debug, Clone)]
#[derive(serde::Serialize)]
pub struct AuthorizationCodeTokenRequest {
    pub client_id: ClientId,
    pub redirect_uri: Url,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,
}

#[derive(Debug, Clone)]
#[derive(serde::Serialize)]
pub struct RefreshTokenRequest {
    pub client_id: ClientId,
    pub refresh_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
}

#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Deserialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<Scope>,
    #[serde(default)]
    pub id_token: Option<String>,
}
