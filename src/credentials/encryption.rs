//! AES-256-GCM encryption for stored credential records.
//!
//! Each record is sealed with a fresh random nonce. The stored form is a
//! single printable string: `base64(nonce || ciphertext_with_tag)`, suitable
//! for a TEXT column.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// Size of the encryption key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes (96 bits, standard for GCM)
const NONCE_SIZE: usize = 12;

/// Errors from sealing or opening a credential record.
#[derive(Debug, PartialEq)]
pub enum CryptoError {
    /// Encryption itself failed (should not happen with a valid key)
    EncryptionFailed,
    /// Stored string is not valid base64 or is too short to hold a nonce
    InvalidEncoding,
    /// Authentication tag did not verify: wrong key, tampering, or corruption
    DecryptionFailed,
}

impl std::fmt::Display for CryptoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CryptoError::EncryptionFailed => write!(f, "Encryption failed"),
            CryptoError::InvalidEncoding => write!(f, "Stored ciphertext has invalid encoding"),
            CryptoError::DecryptionFailed => {
                write!(f, "Decryption failed (wrong key, tampered or corrupted data)")
            }
        }
    }
}

impl std::error::Error for CryptoError {}

/// Encrypts plaintext bytes, returning the combined storage string.
///
/// Draws a fresh random nonce on every call; reusing a nonce under the same
/// key breaks confidentiality, so callers must never cache the output of one
/// call as a template for another.
pub fn seal(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<String, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    combined.extend_from_slice(&nonce);
    combined.extend_from_slice(&ciphertext);

    Ok(BASE64.encode(&combined))
}

/// Decrypts a storage string produced by [`seal`].
///
/// Fails with `DecryptionFailed` if the authentication tag does not verify.
/// That failure must be surfaced to the caller; garbage plaintext is never
/// returned.
pub fn open(key: &[u8; KEY_SIZE], stored: &str) -> Result<Vec<u8>, CryptoError> {
    let combined = BASE64
        .decode(stored)
        .map_err(|_| CryptoError::InvalidEncoding)?;

    if combined.len() <= NONCE_SIZE {
        return Err(CryptoError::InvalidEncoding);
    }

    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}
