use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Deserialize, serde::Serialize)]
pub enum Transformation {
    #[serde(rename = "plain")]
    Plain,
    S256,
}

impl Default for Transformation {
    fn default() -> Self {
        Self::S256
    }
}

#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct Challenge {
    #[serde(rename = "code_challenge")]
    pub code: String,
    #[serde(rename = "code_challenge_method")]
    #[serde(default)]
    pub method: Transformation,
}

impl Challenge {
    /// `BASE64URL(SHA256(verifier))`
    pub fn from_verifier(verifier: &Verifier) -> Self {
        let digest = Sha256::digest(verifier.value.as_bytes());
        Self {
            code: URL_SAFE_NO_PAD.encode(digest),
            method: Transformation::S256,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct Verifier {
    #[serde(rename = "code_verifier")]
    pub value: String,
}
