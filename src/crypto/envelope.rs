//! At-rest envelope for gateway credentials.
//!
//! Layout: `hex(nonce) ":" hex(ciphertext || tag)`, AES-256-GCM with a fresh 12-byte
//! nonce per call. The key is the first 32 bytes of the process secret.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;

use crate::error::{PaymentError, PaymentResult};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
const SEPARATOR: char = ':';

#[derive(Clone)]
pub struct SecretCipher {
    key: [u8; KEY_LEN],
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher").field("key", &"<redacted>").finish()
    }
}

impl SecretCipher {
    /// Builds a cipher from the configured secret. Secrets shorter than 32 bytes are
    /// refused rather than padded.
    pub fn from_secret(secret: &str) -> PaymentResult<Self> {
        let bytes = secret.as_bytes();
        if bytes.len() < KEY_LEN {
            return Err(PaymentError::Decryption(format!(
                "wrong key length: encryption secret must be at least {KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }

        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&bytes[..KEY_LEN]);
        Ok(Self { key })
    }

    pub fn encrypt(&self, plaintext: &str) -> PaymentResult<String> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| PaymentError::internal("encryption_error", e))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| PaymentError::internal("encryption_error", "Failed to encrypt payment credentials"))?;

        Ok(format!(
            "{}{SEPARATOR}{}",
            hex::encode(nonce_bytes),
            hex::encode(ciphertext)
        ))
    }

    pub fn decrypt(&self, envelope: &str) -> PaymentResult<String> {
        let segments: Vec<&str> = envelope.trim().split(SEPARATOR).collect();
        if segments.len() != 2 {
            return Err(PaymentError::Decryption(format!(
                "malformed secret envelope: expected 2 segments, found {}",
                segments.len()
            )));
        }

        let nonce = hex::decode(segments[0])
            .map_err(|e| PaymentError::Decryption(format!("malformed secret envelope: nonce is not hex ({e})")))?;
        if nonce.len() != NONCE_LEN {
            return Err(PaymentError::Decryption(format!(
                "malformed secret envelope: nonce must be {NONCE_LEN} bytes, found {}",
                nonce.len()
            )));
        }

        let ciphertext = hex::decode(segments[1]).map_err(|e| {
            PaymentError::Decryption(format!("malformed secret envelope: ciphertext is not hex ({e})"))
        })?;

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|_| PaymentError::Decryption("wrong key length".to_string()))?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|_| {
                PaymentError::Decryption(
                    "secret envelope failed authentication: corrupt or encrypted under a different key"
                        .to_string(),
                )
            })?;

        String::from_utf8(plaintext)
            .map_err(|e| PaymentError::Decryption(format!("decrypted secret is not UTF-8: {e}")))
    }
}
