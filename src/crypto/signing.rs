use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::aes::{KEY_SIZE, SecureKey};

type HmacSha256 = Hmac<Sha256>;

/// Length of an HMAC-SHA256 tag in bytes.
pub const TAG_SIZE: usize = 32;

/// HMAC signing key derived from the session secret.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SigningKey([u8; KEY_SIZE]);

/// Derives a purpose-bound 32-byte key from the session secret.
fn derive(secret: &[u8], purpose: &str) -> [u8; KEY_SIZE] {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(purpose.as_bytes());
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&mac.finalize().into_bytes());
    key
}

/// Splits one secret into independent signing and encryption keys.
pub fn derive_keys(secret: &str) -> (SigningKey, SecureKey) {
    let signing = SigningKey(derive(secret.as_bytes(), "portal-session/sign/v1"));
    let encryption = SecureKey::new(derive(secret.as_bytes(), "portal-session/encrypt/v1"));
    (signing, encryption)
}

impl SigningKey {
    /// Computes the HMAC-SHA256 tag of `data`.
    pub fn sign(&self, data: &[u8]) -> [u8; TAG_SIZE] {
        let mut mac = HmacSha256::new_from_slice(&self.0).expect("HMAC can take key of any size");
        mac.update(data);
        let mut tag = [0u8; TAG_SIZE];
        tag.copy_from_slice(&mac.finalize().into_bytes());
        tag
    }

    /// Constant-time check of `tag` against `data`.
    pub fn verify(&self, data: &[u8], tag: &[u8]) -> bool {
        if tag.len() != TAG_SIZE {
            return false;
        }
        self.sign(data)[..].ct_eq(tag).into()
    }
}
