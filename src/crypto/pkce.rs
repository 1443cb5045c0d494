use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// Random bytes behind a verifier; 48 bytes encode to 64 url-safe characters.
const VERIFIER_BYTES: usize = 48;

/// A PKCE code verifier and its S256 challenge.
///
/// The verifier only ever leaves the process in the token exchange body,
/// so `Debug` is implemented by hand and omits it.
#[derive(Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl std::fmt::Debug for PkcePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkcePair")
            .field("verifier", &"[redacted]")
            .field("challenge", &self.challenge)
            .finish()
    }
}

impl PkcePair {
    /// Generates a fresh pair for one login attempt.
    pub fn generate() -> Self {
        let verifier = generate_code_verifier();
        let challenge = code_challenge(&verifier);
        Self { verifier, challenge }
    }
}

/// Generates a cryptographically random code verifier (RFC 7636, 43-128 chars).
pub fn generate_code_verifier() -> String {
    let mut random_bytes = [0u8; VERIFIER_BYTES];
    OsRng.fill_bytes(&mut random_bytes);
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// `challenge = BASE64URL(SHA256(verifier))`
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}
