use crate::core::types::ClientId;

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenTypeHint {
    AccessToken,
    RefreshToken,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RevocationRequest {
    pub client_id: ClientId,
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type_hint: Option<TokenTypeHint>,
}
