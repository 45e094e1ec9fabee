use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{DecodingKey, Header};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{event, Level};
use url::Url;

use super::claims::{profile_claims, IdClaims};
use crate::core::types::{now_secs, ClientId};
use crate::error::{Error, Result};
use crate::oidc::types::Nonce;
use crate::provider::ProviderClient;

/// Supplies the key an id token signature is checked against.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    async fn decoding_key(&self, header: &Header) -> Result<DecodingKey>;
}

/// A single key, whatever the token header says.
pub struct StaticKeyResolver {
    key: DecodingKey,
}

impl StaticKeyResolver {
    pub fn new(key: DecodingKey) -> Self {
        Self { key }
    }
}

#[async_trait]
impl KeyResolver for StaticKeyResolver {
    async fn decoding_key(&self, _header: &Header) -> Result<DecodingKey> {
        Ok(self.key.clone())
    }
}

/// Keys published at the provider's `jwks_uri`, refetched once when a `kid` is unknown.
pub struct JwksKeyResolver {
    provider: Arc<dyn ProviderClient>,
    jwks_uri: Url,
    cache: RwLock<Option<JwkSet>>,
}

impl JwksKeyResolver {
    pub fn new(provider: Arc<dyn ProviderClient>, jwks_uri: Url) -> Self {
        Self {
            provider,
            jwks_uri,
            cache: RwLock::new(None),
        }
    }

    fn select(set: &JwkSet, header: &Header) -> Option<Result<DecodingKey>> {
        let jwk = match &header.kid {
            Some(kid) => set.find(kid)?,
            None if set.keys.len() == 1 => &set.keys[0],
            None => return None,
        };
        Some(
            DecodingKey::from_jwk(jwk)
                .map_err(|e| Error::TokenValidation(format!("unusable signing key: {}", e))),
        )
    }
}

#[async_trait]
impl KeyResolver for JwksKeyResolver {
    async fn decoding_key(&self, header: &Header) -> Result<DecodingKey> {
        if let Some(set) = self.cache.read().await.as_ref() {
            if let Some(key) = Self::select(set, header) {
                return key;
            }
        }

        event!(Level::DEBUG, kid = ?header.kid, "Fetching provider signing keys");
        let set = self.provider.jwks(&self.jwks_uri).await?;
        let key = Self::select(&set, header);
        *self.cache.write().await = Some(set);
        key.unwrap_or_else(|| {
            Err(Error::TokenValidation(format!("no signing key for kid {:?}", header.kid)))
        })
    }
}

/// What a token must assert to be accepted.
#[derive(Debug, Clone)]
pub struct Expectations<'a> {
    pub issuer: &'a str,
    pub client_id: &'a ClientId,
    /// Required to match when the flow sent a nonce.
    pub nonce: Option<&'a Nonce>,
}

#[derive(Debug, Clone)]
pub struct ValidatedIdToken {
    pub claims: IdClaims,
    pub profile: Map<String, Value>,
}

/// Parses id tokens and checks their claims. Signatures are only verified when a
/// [`KeyResolver`] is configured.
#[derive(Clone, Default)]
pub struct TokenValidator {
    resolver: Option<Arc<dyn KeyResolver>>,
}

impl TokenValidator {
    pub fn unverified() -> Self {
        Self { resolver: None }
    }

    pub fn strict(resolver: Arc<dyn KeyResolver>) -> Self {
        Self {
            resolver: Some(resolver),
        }
    }

    pub fn is_strict(&self) -> bool {
        self.resolver.is_some()
    }

    pub async fn validate(&self, token: &str, expected: &Expectations<'_>) -> Result<ValidatedIdToken> {
        let raw = match &self.resolver {
            Some(resolver) => Self::decode_verified(token, resolver.as_ref()).await?,
            None => Self::decode_unverified(token)?,
        };
        let claims: IdClaims = serde_json::from_value(Value::Object(raw.clone()))
            .map_err(|e| Error::TokenValidation(format!("malformed claims: {}", e)))?;

        check_claims(&claims, expected)?;

        Ok(ValidatedIdToken {
            profile: profile_claims(&raw),
            claims,
        })
    }

    fn decode_unverified(token: &str) -> Result<Map<String, Value>> {
        let mut parts = token.split('.');
        let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(payload), Some(_), None) => payload,
            _ => return Err(Error::TokenValidation("token is not a JWT".into())),
        };
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| Error::TokenValidation(format!("undecodable payload: {}", e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::TokenValidation(format!("payload is not a claim set: {}", e)))
    }

    async fn decode_verified(token: &str, resolver: &dyn KeyResolver) -> Result<Map<String, Value>> {
        let header = jsonwebtoken::decode_header(token)
            .map_err(|e| Error::TokenValidation(format!("bad header: {}", e)))?;
        let key = resolver.decoding_key(&header).await?;

        // Registered claims are checked by `check_claims`.
        let mut validation = jsonwebtoken::Validation::new(header.alg);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        jsonwebtoken::decode::<Map<String, Value>>(token, &key, &validation)
            .map(|data| data.claims)
            .map_err(|e| Error::TokenValidation(format!("signature rejected: {}", e)))
    }
}

fn check_claims(claims: &IdClaims, expected: &Expectations<'_>) -> Result<()> {
    if claims.sub.is_empty() {
        return Err(Error::TokenValidation("sub is empty".into()));
    }
    if claims.iss.trim_end_matches('/') != expected.issuer.trim_end_matches('/') {
        return Err(Error::TokenValidation(format!(
            "iss: expected '{}', got '{}'",
            expected.issuer, claims.iss
        )));
    }
    let client_id = expected.client_id.as_ref();
    if !claims.aud.contains(client_id) {
        return Err(Error::TokenValidation(format!("aud does not contain '{}'", client_id)));
    }
    if claims.aud.is_multiple() && claims.azp.as_deref() != Some(client_id) {
        return Err(Error::TokenValidation("azp does not name this client".into()));
    }
    let now = now_secs();
    if claims.exp <= now {
        return Err(Error::TokenValidation(format!(
            "expired at {} (now {})",
            claims.exp, now
        )));
    }
    if let Some(nonce) = expected.nonce {
        match &claims.nonce {
            Some(got) if got == nonce => {}
            Some(_) => return Err(Error::TokenValidation("nonce mismatch".into())),
            None => return Err(Error::TokenValidation("nonce missing".into())),
        }
    }
    Ok(())
}
