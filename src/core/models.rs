use std::time::Duration;

use url::Url;

use super::types::*;
use crate::auth::pkce::Verifier;
use crate::error::{Error, Result};
use crate::oidc::types::Nonce;
use crate::transport::{FlowStatus, Mechanism, Purpose};

/// One authenticated session.
///
/// Persisted as a single JSON record per storage namespace. A record whose expiry has
/// passed is never handed out as the current user.
#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct IdentityUser {
    pub subject: String,
    pub id_token: String,
    /// Cleared when the access token is revoked.
    pub access_token: Option<String>,
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_at: Expiry,
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_state: Option<String>,
    #[serde(default)]
    pub profile: serde_json::Map<String, serde_json::Value>,
}

impl IdentityUser {
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_past()
    }

    pub fn expires_in(&self) -> Option<Duration> {
        self.expires_at.remaining()
    }

    /// A user may only become current while its expiry lies in the future.
    pub fn validate(&self) -> Result<()> {
        if self.subject.is_empty() {
            return Err(Error::Validation("user has no subject".into()));
        }
        if self.is_expired() {
            return Err(Error::Validation(format!(
                "user expired at {}",
                self.expires_at.0
            )));
        }
        Ok(())
    }

    pub fn to_record(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_record(record: &str) -> Result<Self> {
        Ok(serde_json::from_str(record)?)
    }
}

/// One in-flight authorization or end-session request.
#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct FlowState {
    pub id: StateToken,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<Nonce>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<Verifier>,
    pub mechanism: Mechanism,
    pub purpose: Purpose,
    pub status: FlowStatus,
    pub response_type: ResponseType,
    pub scope: Scope,
    /// The callback URL is expected to land on this address.
    pub redirect_uri: Url,
    pub created_at: u64,
}

impl FlowState {
    pub fn age(&self) -> Duration {
        Duration::from_secs(now_secs().saturating_sub(self.created_at))
    }

    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.age() > max_age
    }

    /// Scheme, host, port and path of `url` equal the flow's redirect URI.
    pub fn matches_return_url(&self, url: &Url) -> bool {
        let expected = &self.redirect_uri;
        url.scheme() == expected.scheme()
            && url.host_str() == expected.host_str()
            && url.port_or_known_default() == expected.port_or_known_default()
            && url.path().trim_end_matches('/') == expected.path().trim_end_matches('/')
    }

    pub fn advance(&mut self, next: FlowStatus) -> Result<()> {
        if !self.status.can_advance_to(next) {
            return Err(Error::CallbackMismatch(format!(
                "flow {} cannot move from {:?} to {:?}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    pub fn to_record(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_record(record: &str) -> Result<Self> {
        Ok(serde_json::from_str(record)?)
    }
}

/// Provider-side session state observed through a prompt-less request.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct SessionStatus {
    pub active: bool,
    pub subject: Option<String>,
    pub session_state: Option<String>,
}

impl SessionStatus {
    pub fn inactive() -> Self {
        Self {
            active: false,
            subject: None,
            session_state: None,
        }
    }
}
