use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};

/// PKCE verifier and its S256 challenge (RFC 7636).
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    /// Fresh random verifier (64 URL-safe chars) with its challenge.
    #[must_use]
    pub fn generate() -> Self {
        let random_bytes: [u8; 48] = rand::rng().random();
        Self::from_verifier(URL_SAFE_NO_PAD.encode(random_bytes))
    }

    /// `challenge = BASE64URL(SHA256(verifier))`
    #[must_use]
    pub fn from_verifier(verifier: String) -> Self {
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }
}

/// Random `state` parameter: 16 bytes, base64url (22 chars).
#[must_use]
pub fn generate_state() -> String {
    let random_bytes: [u8; 16] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verifier_shape() {
        let pair = PkcePair::generate();
        assert_eq!(pair.verifier.len(), 64);
        assert!(
            pair.verifier
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "verifier should be URL-safe: {}",
            pair.verifier
        );
        assert_ne!(pair.verifier, PkcePair::generate().verifier);
    }

    #[test]
    fn test_rfc7636_challenge_vector() {
        let pair = PkcePair::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".into());
        assert_eq!(pair.challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn test_state_length() {
        let state = generate_state();
        assert_eq!(state.len(), 22);
        assert_ne!(state, generate_state());
    }
}
