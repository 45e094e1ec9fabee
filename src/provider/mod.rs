//! Back-channel calls to the identity provider.

mod http;

pub use http::HttpProviderClient;

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use serde_json::{Map, Value};
use url::Url;

use crate::auth::{AccessTokenResponse, RevocationRequest, TokenRequest};
use crate::error::Result;
use crate::oidc::ProviderMetadata;

#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Fetches the discovery document for `authority`.
    async fn metadata(&self, authority: &Url) -> Result<ProviderMetadata>;

    async fn exchange(&self, token_endpoint: &Url, request: &TokenRequest) -> Result<AccessTokenResponse>;

    async fn user_info(&self, userinfo_endpoint: &Url, access_token: &str) -> Result<Map<String, Value>>;

    async fn revoke(&self, revocation_endpoint: &Url, request: &RevocationRequest) -> Result<()>;

    async fn jwks(&self, jwks_uri: &Url) -> Result<JwkSet>;
}
