use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::auth::pkce::Verifier;
use crate::core::types::StateToken;
use crate::oidc::types::Nonce;

pub trait FromRandom {
    fn from_random() -> Self;
}

impl FromRandom for StateToken {
    fn from_random() -> Self {
        StateToken(random_string(32))
    }
}

impl FromRandom for Nonce {
    fn from_random() -> Self {
        Nonce(random_string(32))
    }
}

impl FromRandom for Verifier {
    fn from_random() -> Self {
        Verifier {
            value: random_string(48),
        }
    }
}

/// `size` random bytes, base64url encoded without padding.
fn random_string(size: usize) -> String {
    use rand::RngCore;

    let mut bytes = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
