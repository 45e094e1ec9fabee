use url::Url;

use crate::error::{Error, Result};

pub const WELL_KNOWN_PATH: &str = ".well-known/openid-configuration";

/// The subset of provider metadata the session engine uses.
#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: Url,
    #[serde(default)]
    pub token_endpoint: Option<Url>,
    #[serde(default)]
    pub userinfo_endpoint: Option<Url>,
    #[serde(default)]
    pub end_session_endpoint: Option<Url>,
    #[serde(default)]
    pub revocation_endpoint: Option<Url>,
    #[serde(default)]
    pub jwks_uri: Option<Url>,
}

impl ProviderMetadata {
    /// Conventional endpoint layout under the authority, for providers whose metadata
    /// is configured rather than discovered.
    pub fn derive_from_authority(authority: &Url) -> Result<Self> {
        let base = with_trailing_slash(authority);
        Ok(Self {
            issuer: authority.as_str().trim_end_matches('/').to_string(),
            authorization_endpoint: base.join("authorize")?,
            token_endpoint: Some(base.join("token")?),
            userinfo_endpoint: Some(base.join("userinfo")?),
            end_session_endpoint: Some(base.join("endsession")?),
            revocation_endpoint: Some(base.join("revocation")?),
            jwks_uri: Some(base.join(".well-known/jwks")?),
        })
    }

    /// Discovered metadata must name the authority it was fetched from as its issuer.
    pub fn check_issuer(&self, authority: &Url) -> Result<()> {
        let expected = issuer_of(authority);
        if self.issuer.trim_end_matches('/') != expected {
            return Err(Error::Configuration(format!(
                "provider issuer {} does not match authority {}",
                self.issuer, expected
            )));
        }
        Ok(())
    }

    pub fn token_endpoint(&self) -> Result<&Url> {
        self.token_endpoint
            .as_ref()
            .ok_or_else(|| Error::Configuration("provider has no token endpoint".into()))
    }

    pub fn end_session_endpoint(&self) -> Result<&Url> {
        self.end_session_endpoint
            .as_ref()
            .ok_or_else(|| Error::Configuration("provider has no end session endpoint".into()))
    }

    pub fn revocation_endpoint(&self) -> Result<&Url> {
        self.revocation_endpoint
            .as_ref()
            .ok_or_else(|| Error::Configuration("provider has no revocation endpoint".into()))
    }
}

pub fn discovery_url(authority: &Url) -> Result<Url> {
    if authority.path().ends_with(WELL_KNOWN_PATH) {
        return Ok(authority.clone());
    }
    Ok(with_trailing_slash(authority).join(WELL_KNOWN_PATH)?)
}

/// The issuer identifier an authority stands for, without a trailing slash.
pub fn issuer_of(authority: &Url) -> String {
    let mut authority = authority.clone();
    authority.set_query(None);
    authority.set_fragment(None);
    authority
        .as_str()
        .trim_end_matches(WELL_KNOWN_PATH)
        .trim_end_matches('/')
        .to_string()
}

fn with_trailing_slash(url: &Url) -> Url {
    let mut url = url.clone();
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
