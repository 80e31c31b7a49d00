//! Field cipher for values sent to the verification endpoint.
//!
//! The key is derived from the shared environment secret with Argon2id and a
//! fixed application salt, so every holder of the secret derives the same key.
//! Each value is sealed with ChaCha20-Poly1305 under a fresh random nonce and
//! encoded as `base64(nonce || ciphertext)`.

use std::fmt;

use argon2::Argon2;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;
use thiserror::Error;

/// Salt for deriving the field key from the shared secret.
const KEY_SALT: &[u8] = b"cring-partner/field-cipher/v1";

/// ChaCha20-Poly1305 nonce length in bytes
const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Encryption failed")]
    Encrypt,

    #[error("Decryption failed - wrong key or tampered value")]
    Decrypt,

    #[error("Malformed ciphertext: {0}")]
    Malformed(String),
}

pub struct FieldCipher {
    cipher: ChaCha20Poly1305,
}

impl FieldCipher {
    pub fn from_secret(secret: &str) -> Result<Self, CryptoError> {
        let mut key = [0u8; 32];
        Argon2::default()
            .hash_password_into(secret.as_bytes(), KEY_SALT, &mut key)
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

        Ok(Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
        })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, CryptoError> {
        let sealed = STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError::Malformed(e.to_string()))?;
        if sealed.len() <= NONCE_LEN {
            return Err(CryptoError::Malformed(format!(
                "{} bytes is shorter than nonce plus tag",
                sealed.len()
            )));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Decrypt)?;

        String::from_utf8(plaintext).map_err(|e| CryptoError::Malformed(e.to_string()))
    }
}

impl fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldCipher").finish_non_exhaustive()
    }
}
