use std::collections::BTreeMap;
use std::time::Duration;

use url::Url;

use super::types::{ClientId, ResponseType, Scope};
use crate::error::{Error, Result};
use crate::oidc::ProviderMetadata;
use crate::transport::Mechanism;

/// Settings of one [`UserManager`](crate::UserManager). Fixed once the manager is built.
#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Deserialize)]
pub struct IdentityConfiguration {
    pub authority: Url,
    pub client_id: ClientId,
    #[serde(default)]
    pub redirect_uri: Option<Url>,
    #[serde(default)]
    pub popup_redirect_uri: Option<Url>,
    #[serde(default)]
    pub silent_redirect_uri: Option<Url>,
    #[serde(default)]
    pub post_logout_redirect_uri: Option<Url>,
    #[serde(default)]
    pub popup_post_logout_redirect_uri: Option<Url>,
    #[serde(default)]
    pub response_type: ResponseType,
    #[serde(default = "default_scope")]
    pub scope: Scope,
    #[serde(default)]
    pub storage_namespace: Option<String>,
    #[serde(default = "default_lead_time", with = "duration_secs")]
    pub silent_renew_lead_time: Duration,
    #[serde(default = "default_true")]
    pub automatic_silent_renew: bool,
    #[serde(default = "default_silent_timeout", with = "duration_secs")]
    pub silent_request_timeout: Duration,
    #[serde(default = "default_retry_delay", with = "duration_secs")]
    pub silent_renew_retry_delay: Duration,
    #[serde(default = "default_stale_age", with = "duration_secs")]
    pub stale_state_max_age: Duration,
    #[serde(default)]
    pub load_user_info: bool,
    /// Verify id token signatures against the provider keys.
    #[serde(default)]
    pub validate_signature: bool,
    /// Skips discovery when set.
    #[serde(default)]
    pub metadata: Option<ProviderMetadata>,
    #[serde(default)]
    pub extra_query_params: BTreeMap<String, String>,
}

fn default_scope() -> Scope {
    Scope::from_delimited_parts("openid profile")
}

fn default_lead_time() -> Duration {
    Duration::from_secs(60)
}

fn default_true() -> bool {
    true
}

fn default_silent_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_stale_age() -> Duration {
    Duration::from_secs(300)
}

impl IdentityConfiguration {
    pub fn new(authority: Url, client_id: impl Into<String>) -> Self {
        Self {
            authority,
            client_id: ClientId(client_id.into()),
            redirect_uri: None,
            popup_redirect_uri: None,
            silent_redirect_uri: None,
            post_logout_redirect_uri: None,
            popup_post_logout_redirect_uri: None,
            response_type: ResponseType::default(),
            scope: default_scope(),
            storage_namespace: None,
            silent_renew_lead_time: default_lead_time(),
            automatic_silent_renew: true,
            silent_request_timeout: default_silent_timeout(),
            silent_renew_retry_delay: default_retry_delay(),
            stale_state_max_age: default_stale_age(),
            load_user_info: false,
            validate_signature: false,
            metadata: None,
            extra_query_params: BTreeMap::new(),
        }
    }

    pub fn with_redirect_uri(mut self, uri: Url) -> Self {
        self.redirect_uri = Some(uri);
        self
    }

    pub fn with_popup_redirect_uri(mut self, uri: Url) -> Self {
        self.popup_redirect_uri = Some(uri);
        self
    }

    pub fn with_silent_redirect_uri(mut self, uri: Url) -> Self {
        self.silent_redirect_uri = Some(uri);
        self
    }

    pub fn with_post_logout_redirect_uri(mut self, uri: Url) -> Self {
        self.post_logout_redirect_uri = Some(uri);
        self
    }

    pub fn with_popup_post_logout_redirect_uri(mut self, uri: Url) -> Self {
        self.popup_post_logout_redirect_uri = Some(uri);
        self
    }

    pub fn with_response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_storage_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.storage_namespace = Some(namespace.into());
        self
    }

    pub fn with_silent_renew_lead_time(mut self, lead_time: Duration) -> Self {
        self.silent_renew_lead_time = lead_time;
        self
    }

    pub fn with_automatic_silent_renew(mut self, enabled: bool) -> Self {
        self.automatic_silent_renew = enabled;
        self
    }

    pub fn with_silent_request_timeout(mut self, timeout: Duration) -> Self {
        self.silent_request_timeout = timeout;
        self
    }

    pub fn with_stale_state_max_age(mut self, max_age: Duration) -> Self {
        self.stale_state_max_age = max_age;
        self
    }

    pub fn with_load_user_info(mut self, enabled: bool) -> Self {
        self.load_user_info = enabled;
        self
    }

    pub fn with_validate_signature(mut self, enabled: bool) -> Self {
        self.validate_signature = enabled;
        self
    }

    pub fn with_metadata(mut self, metadata: ProviderMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_extra_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_query_params.insert(key.into(), value.into());
        self
    }

    /// Key under which the current user is persisted.
    pub fn storage_namespace(&self) -> String {
        match &self.storage_namespace {
            Some(namespace) => namespace.clone(),
            None => format!(
                "oidc.user:{}:{}",
                self.authority.as_str().trim_end_matches('/'),
                self.client_id.0
            ),
        }
    }

    /// Prefix under which in-flight flow states are persisted.
    pub fn state_prefix(&self) -> String {
        format!("{}.state.", self.storage_namespace())
    }

    pub fn validate(&self) -> Result<()> {
        if !matches!(self.authority.scheme(), "http" | "https") || self.authority.host_str().is_none() {
            return Err(Error::Configuration(format!(
                "authority {} is not an http(s) URL",
                self.authority
            )));
        }
        if self.client_id.0.trim().is_empty() {
            return Err(Error::Configuration("client_id is empty".into()));
        }
        if self.redirect_uri.is_none()
            && self.popup_redirect_uri.is_none()
            && self.silent_redirect_uri.is_none()
        {
            return Err(Error::Configuration(
                "at least one of redirect_uri, popup_redirect_uri or silent_redirect_uri is required".into(),
            ));
        }
        if self.silent_request_timeout.is_zero() {
            return Err(Error::Configuration("silent_request_timeout must be positive".into()));
        }
        if self.response_type.is_implicit() && !self.scope.has_openid() {
            return Err(Error::Configuration(format!(
                "response_type {:?} requires the openid scope",
                self.response_type.as_str()
            )));
        }
        Ok(())
    }

    /// Redirect URI for a sign-in flow over `mechanism`. Popup and frame fall back to
    /// `redirect_uri`.
    pub fn redirect_uri_for(&self, mechanism: Mechanism) -> Result<&Url> {
        let uri = match mechanism {
            Mechanism::Popup => self.popup_redirect_uri.as_ref().or(self.redirect_uri.as_ref()),
            Mechanism::Iframe => self.silent_redirect_uri.as_ref().or(self.redirect_uri.as_ref()),
            Mechanism::Redirect => self.redirect_uri.as_ref(),
        };
        uri.ok_or_else(|| {
            Error::Configuration(format!("no redirect URI configured for {} flows", mechanism))
        })
    }

    pub fn post_logout_redirect_uri_for(&self, mechanism: Mechanism) -> Option<&Url> {
        match mechanism {
            Mechanism::Popup => self
                .popup_post_logout_redirect_uri
                .as_ref()
                .or(self.post_logout_redirect_uri.as_ref()),
            _ => self.post_logout_redirect_uri.as_ref(),
        }
    }

    /// Reads `OIDC_*` variables, after loading a `.env` file when one exists.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let authority = required_env("OIDC_AUTHORITY")?.parse()?;
        let client_id = required_env("OIDC_CLIENT_ID")?;
        let mut config = Self::new(authority, client_id);

        config.redirect_uri = optional_url_env("OIDC_REDIRECT_URI")?;
        config.popup_redirect_uri = optional_url_env("OIDC_POPUP_REDIRECT_URI")?;
        config.silent_redirect_uri = optional_url_env("OIDC_SILENT_REDIRECT_URI")?;
        config.post_logout_redirect_uri = optional_url_env("OIDC_POST_LOGOUT_REDIRECT_URI")?;
        if let Ok(scope) = std::env::var("OIDC_SCOPE") {
            config.scope = Scope::from_delimited_parts(&scope);
        }
        if let Ok(response_type) = std::env::var("OIDC_RESPONSE_TYPE") {
            config.response_type = response_type.parse().map_err(Error::Configuration)?;
        }
        if let Ok(secs) = std::env::var("OIDC_SILENT_RENEW_LEAD_TIME") {
            let secs = secs
                .parse()
                .map_err(|_| Error::Configuration("OIDC_SILENT_RENEW_LEAD_TIME is not a number".into()))?;
            config.silent_renew_lead_time = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }
}

fn required_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| Error::Configuration(format!("Supply {}", name)))
}

fn optional_url_env(name: &str) -> Result<Option<Url>> {
    match std::env::var(name) {
        Ok(value) => Ok(Some(value.parse()?)),
        Err(_) => Ok(None),
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
