use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{event, Level};
use url::Url;

use super::ProviderClient;
use crate::auth::{AccessTokenResponse, ProviderError, RevocationRequest, TokenRequest};
use crate::error::{Error, Result};
use crate::oidc::discovery::discovery_url;
use crate::oidc::ProviderMetadata;

#[derive(Debug, Clone, Default)]
pub struct HttpProviderClient {
    http: reqwest::Client,
}

impl HttpProviderClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Passes successful responses through. Error bodies in the OAuth shape become
    /// [`Error::Authorization`], anything else [`Error::Network`].
    async fn ensure_success(response: reqwest::Response, operation: &'static str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        event!(Level::WARN, operation, status = status.as_u16(), "Provider request failed");
        match serde_json::from_str::<ProviderError>(&body) {
            Ok(err) => Err(Error::Authorization(err)),
            Err(_) => Err(Error::Network(format!("{} returned {}: {}", operation, status, body))),
        }
    }

    async fn json<T: DeserializeOwned>(response: reqwest::Response, operation: &'static str) -> Result<T> {
        let response = Self::ensure_success(response, operation).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| Error::Validation(format!("{} returned an unreadable body: {}", operation, e)))
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    #[tracing::instrument(skip(self))]
    async fn metadata(&self, authority: &Url) -> Result<ProviderMetadata> {
        let url = discovery_url(authority)?;
        let response = self.http.get(url).send().await?;
        Self::json(response, "discovery").await
    }

    #[tracing::instrument(skip(self, request))]
    async fn exchange(&self, token_endpoint: &Url, request: &TokenRequest) -> Result<AccessTokenResponse> {
        let response = self
            .http
            .post(token_endpoint.clone())
            .form(request)
            .send()
            .await?;
        Self::json(response, "token exchange").await
    }

    #[tracing::instrument(skip(self, access_token))]
    async fn user_info(&self, userinfo_endpoint: &Url, access_token: &str) -> Result<Map<String, Value>> {
        let response = self
            .http
            .get(userinfo_endpoint.clone())
            .bearer_auth(access_token)
            .send()
            .await?;
        Self::json(response, "userinfo").await
    }

    #[tracing::instrument(skip(self, request))]
    async fn revoke(&self, revocation_endpoint: &Url, request: &RevocationRequest) -> Result<()> {
        let response = self
            .http
            .post(revocation_endpoint.clone())
            .form(request)
            .send()
            .await?;
        Self::ensure_success(response, "revocation").await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn jwks(&self, jwks_uri: &Url) -> Result<JwkSet> {
        let response = self.http.get(jwks_uri.clone()).send().await?;
        Self::json(response, "jwks").await
    }
}
