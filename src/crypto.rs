//! Encryption of stored `Authorization` header values.
//!
//! Values are sealed with AES-256-GCM under a key derived from the
//! configured secret key, and stored as `hex(nonce || ciphertext)`.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use sha2::{Digest, Sha256};
use thiserror::Error;

const NONCE_LEN: usize = 12;

/// Errors from sealing or opening an authorization value.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encrypted value is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("encrypted value is too short")]
    Truncated,

    #[error("failed to decrypt value (wrong secret key or corrupted data)")]
    Decrypt,

    #[error("failed to encrypt value")]
    Encrypt,

    #[error("decrypted value is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Seals and opens `Authorization` header values.
#[derive(Clone)]
pub struct AuthorizationCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for AuthorizationCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationCipher").finish_non_exhaustive()
    }
}

impl AuthorizationCipher {
    /// Derives the cipher key from `secret_key`.
    #[must_use]
    pub fn new(secret_key: &str) -> Self {
        let key = Sha256::digest(secret_key.as_bytes());
        Self {
            cipher: Aes256Gcm::new(&key),
        }
    }

    /// Encrypts `plaintext` with a fresh random nonce.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Encrypt`] if the AEAD seal fails.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;

        let mut out = nonce.to_vec();
        out.extend_from_slice(&sealed);
        Ok(hex::encode(out))
    }

    /// Decrypts a value produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// Fails on malformed hex, truncated input, authentication failure or
    /// non UTF-8 plaintext.
    pub fn decrypt(&self, encoded: &str) -> Result<String, CryptoError> {
        let bytes = hex::decode(encoded.trim())?;
        if bytes.len() <= NONCE_LEN {
            return Err(CryptoError::Truncated);
        }
        let (nonce, sealed) = bytes.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CryptoError::Decrypt)?;
        Ok(String::from_utf8(plain)?)
    }
}
