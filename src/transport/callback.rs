use std::collections::HashMap;

use url::Url;

use crate::auth::{AuthorizationResponse, ProviderError};
use crate::core::types::StateToken;
use crate::error::{Error, Result};

/// Decoded parameters of a callback URL.
#[derive(Debug, Clone)]
pub struct CallbackParams {
    pub state: StateToken,
    pub error: Option<ProviderError>,
    pub response: AuthorizationResponse,
}

/// Implicit responses arrive in the fragment, everything else in the query. The
/// fragment wins when it carries a `state` or an `error`.
fn raw_params(url: &Url) -> &str {
    let fragment = url.fragment().unwrap_or_default();
    let has_response = form_urlencoded::parse(fragment.as_bytes())
        .any(|(k, _)| k == "state" || k == "error");
    if has_response {
        fragment
    } else {
        url.query().unwrap_or_default()
    }
}

pub fn parse_callback(url: &Url) -> Result<CallbackParams> {
    let raw = raw_params(url);
    let params: HashMap<String, String> = form_urlencoded::parse(raw.as_bytes())
        .into_owned()
        .collect();

    let state = params
        .get("state")
        .filter(|s| !s.is_empty())
        .map(|s| StateToken(s.clone()))
        .ok_or_else(|| Error::CallbackMismatch("callback carries no state".into()))?;

    let error = ProviderError::from_params(&params);
    let response = if error.is_some() {
        AuthorizationResponse::default()
    } else {
        serde_urlencoded::from_str(raw)
            .map_err(|e| Error::CallbackMismatch(format!("malformed callback parameters: {}", e)))?
    };

    Ok(CallbackParams {
        state,
        error,
        response,
    })
}
