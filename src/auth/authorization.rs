use std::collections::BTreeMap;

use url::Url;

use crate::auth::pkce;
use crate::core::types::{ClientId, ResponseType, Scope, StateToken};
use crate::error::{Error, Result};
use crate::oidc;

/// Parameters sent to the authorization endpoint.
#[derive(Debug, Clone)]
#[derive(serde::Serialize)]
pub struct AuthorizationRequest {
    pub client_id: ClientId,
    pub redirect_uri: Url,
    pub response_type: ResponseType,
    pub scope: Scope,
    pub state: StateToken,
    #[serde(flatten)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pkce_challenge: Option<pkce::Challenge>,
    #[serde(flatten)]
    pub oidc: oidc::models::AuthorizationRequest,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl AuthorizationRequest {
    pub fn to_url(&self, endpoint: &Url) -> Result<Url> {
        let query = serde_urlencoded::to_string(self)
            .map_err(|e| Error::Configuration(format!("unencodable authorization request: {}", e)))?;
        Ok(append_query(endpoint, &query))
    }
}

/// Appends an already encoded query string, keeping any query the endpoint carries.
pub(crate) fn append_query(endpoint: &Url, query: &str) -> Url {
    let mut url = endpoint.clone();
    let joined = match endpoint.query() {
        Some(existing) if !existing.is_empty() => format!("{}&{}", existing, query),
        _ => query.to_string(),
    };
    url.set_query(Some(&joined));
    url
}

/// Successful parameters delivered back to the redirect URI, from the query (code flow)
/// or the fragment (implicit flow).
#[derive(Debug, Clone, Default, PartialEq)]
#[derive(serde::Deserialize)]
pub struct AuthorizationResponse {
    pub state: Option<StateToken>,
    pub code: Option<String>,
    pub id_token: Option<String>,
    pub access_token: Option<String>,
    pub token_type: Option<String>,
    pub expires_in: Option<u64>,
    pub scope: Option<Scope>,
    pub session_state: Option<String>,
}
