//! Catalog credential records and their encrypted storage form.
//!
//! A credential record is the scheme-specific secret bundle a user supplies
//! at login: a bearer token, an OAuth2 client-credentials grant, or an AWS
//! access key pair. Records are serialized to JSON and encrypted with
//! AES-256-GCM before they touch the database; plaintext records exist only
//! in process memory.
//!
//! The record is a tagged enum: the `authType` tag and the payload are
//! validated together at deserialization time, so a stored row whose payload
//! does not match its declared scheme is rejected instead of trusted.

use serde::{Deserialize, Serialize};

mod encryption;

pub use encryption::{open, seal, CryptoError, KEY_SIZE};

/// Scheme-specific catalog credentials.
///
/// # Security
/// - Never serialized into API responses
/// - Encrypted at rest via [`seal_record`] / [`open_record`]
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "authType", rename_all = "lowercase")]
pub enum CatalogCredentials {
    /// Static bearer token attached verbatim to outbound requests
    #[serde(rename_all = "camelCase")]
    Bearer { token: String },

    /// OAuth2 client-credentials grant, exchanged for a token per request
    #[serde(rename_all = "camelCase")]
    OAuth2 {
        token_endpoint: String,
        client_id: String,
        client_secret: String,
        scope: String,
    },

    /// AWS access key pair used for Signature Version 4 signing
    #[serde(rename_all = "camelCase")]
    SigV4 {
        access_key: String,
        secret_key: String,
        region: String,
        service: String,
    },
}

impl CatalogCredentials {
    /// Scheme tag as stored in the sessions table and shown to the client.
    pub fn auth_type(&self) -> &'static str {
        match self {
            CatalogCredentials::Bearer { .. } => "bearer",
            CatalogCredentials::OAuth2 { .. } => "oauth2",
            CatalogCredentials::SigV4 { .. } => "sigv4",
        }
    }
}

/// Serializes and encrypts a credential record for storage.
pub fn seal_record(
    key: &[u8; KEY_SIZE],
    record: &CatalogCredentials,
) -> Result<String, CryptoError> {
    let plaintext = serde_json::to_vec(record).map_err(|_| CryptoError::EncryptionFailed)?;
    encryption::seal(key, &plaintext)
}

/// Decrypts and deserializes a stored credential record.
///
/// A record that decrypts but does not parse as a known scheme is treated as
/// a decryption failure: either way the stored bytes cannot be trusted.
pub fn open_record(
    key: &[u8; KEY_SIZE],
    stored: &str,
) -> Result<CatalogCredentials, CryptoError> {
    let plaintext = encryption::open(key, stored)?;
    serde_json::from_slice(&plaintext).map_err(|_| CryptoError::DecryptionFailed)
}
