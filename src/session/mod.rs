//! Session records binding an opaque client-held identifier to encrypted
//! catalog credentials and connection parameters.

use crate::credentials::{CatalogCredentials, CryptoError};

mod store;

pub use store::SessionStore;

/// Fixed session lifetime: 24 hours, non-renewable.
pub const SESSION_TTL_MS: i64 = 24 * 60 * 60 * 1000;

/// A logged-in browsing context, with credentials already decrypted.
///
/// The credential field is plaintext for in-process use only and must never
/// be serialized back to the client.
#[derive(Clone, Debug)]
pub struct Session {
    pub session_id: String,
    pub credentials: CatalogCredentials,
    /// Target catalog base URL, stored without a trailing slash
    pub endpoint: String,
    pub warehouse: Option<String>,
    pub created_at: i64,
    pub expires_at: i64,
    pub last_used_at: i64,
}

/// Errors from session lookup or persistence.
#[derive(Debug)]
pub enum SessionError {
    /// Stored credentials failed to decrypt: key loss or storage corruption.
    /// Logged server-side as a distinct event, but shown to the client as an
    /// invalid session.
    Decryption(CryptoError),
    /// The backing store could not be read or written
    Storage(anyhow::Error),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Decryption(e) => write!(f, "Credential decryption failed: {}", e),
            SessionError::Storage(e) => write!(f, "Session storage failure: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<CryptoError> for SessionError {
    fn from(e: CryptoError) -> Self {
        SessionError::Decryption(e)
    }
}

impl From<anyhow::Error> for SessionError {
    fn from(e: anyhow::Error) -> Self {
        SessionError::Storage(e)
    }
}
