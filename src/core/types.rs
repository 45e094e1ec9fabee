use std::{
    collections::HashSet,
    time::{Duration, SystemTime},
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Default, Eq)]
pub struct Scope(HashSet<String>);

impl Scope {
    pub fn from_parts(mut parts: Vec<String>) -> Self {
        let set = parts.drain(..).filter(|s| !s.is_empty()).collect();
        Self(set)
    }

    pub fn from_delimited_parts(parts: &str) -> Self {
        let parts = parts
            .split(' ')
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect();
        Self(parts)
    }

    /// Space-delimited, sorted so that the same scope always renders the same way.
    pub fn as_joined(&self) -> String {
        let mut parts = self.borrow_parts();
        parts.sort_unstable();
        parts.join(" ")
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(scope)
    }

    pub fn borrow_parts(&self) -> Vec<&str> {
        self.0.iter().map(AsRef::as_ref).collect()
    }

}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<'de> Deserialize<'de> for Scope {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let parts = String::deserialize(deserializer)?;
        Ok(Self::from_delimited_parts(&parts))
    }
}

impl Serialize for Scope {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let joined = self.as_joined();
        serializer.serialize_str(&joined)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResponseType {
    #[default]
    #[serde(rename = "code")]
    Code,
    #[serde(rename = "id_token token")]
    IdTokenToken,
    #[serde(rename = "id_token")]
    IdToken,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::IdTokenToken => "id_token token",
            Self::IdToken => "id_token",
        }
    }

    pub fn is_code(&self) -> bool {
        matches!(self, Self::Code)
    }

    /// Implicit responses carry an id token in the fragment and must be bound to a nonce.
    pub fn is_implicit(&self) -> bool {
        !self.is_code()
    }
}

impl std::str::FromStr for ResponseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code" => Ok(Self::Code),
            "id_token token" | "token id_token" => Ok(Self::IdTokenToken),
            "id_token" => Ok(Self::IdToken),
            other => Err(format!("unsupported response_type {:?}", other)),
        }
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ClientId(pub String);

impl std::str::FromStr for ClientId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl AsRef<str> for ClientId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Correlates the start of a flow with its callback.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct StateToken(pub String);

impl AsRef<str> for StateToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StateToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Absolute point in time, whole seconds since the unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Expiry(pub u64);

impl Expiry {
    pub fn after(lifetime: Duration) -> Self {
        Self(now_secs().saturating_add(lifetime.as_secs()))
    }

    pub fn as_system_time(&self) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(self.0)
    }

    /// Time left until expiry; `None` once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.as_system_time()
            .duration_since(SystemTime::now())
            .ok()
            .filter(|d| !d.is_zero())
    }

    pub fn is_past(&self) -> bool {
        self.0 <= now_secs()
    }
}


pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs()
}
