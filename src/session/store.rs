//! Encrypted session storage using SQLite.
//!
//! Each row holds one logged-in browsing context. Credentials are encrypted
//! with AES-256-GCM before insertion; timestamps are epoch milliseconds.
//! Expiry is enforced at read time: an expired row is indistinguishable from
//! a missing one from the caller's perspective, so no background sweep is
//! needed.
//!
//! # Schema
//! ```sql
//! CREATE TABLE sessions (
//!     session_id TEXT PRIMARY KEY,
//!     auth_type TEXT NOT NULL,
//!     encrypted_credentials TEXT NOT NULL,
//!     endpoint TEXT NOT NULL,
//!     warehouse TEXT,
//!     created_at INTEGER NOT NULL,
//!     expires_at INTEGER NOT NULL,
//!     last_used_at INTEGER NOT NULL
//! );
//! ```
//!
//! # Thread Safety
//! - Connection is wrapped in Mutex for safe concurrent access
//! - Lost updates to `last_used_at` under concurrent lookups of the same
//!   session are acceptable (non-critical metadata)

use super::{Session, SessionError, SESSION_TTL_MS};
use crate::credentials::{self, CatalogCredentials, KEY_SIZE};
use anyhow::{Context, Result};
use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// Bytes of entropy in a session identifier (256 bits, hex-encoded).
const SESSION_ID_BYTES: usize = 32;

/// Encrypted session storage backed by SQLite.
pub struct SessionStore {
    conn: Mutex<Connection>,
    encryption_key: [u8; KEY_SIZE],
}

impl SessionStore {
    /// Creates or opens a session store.
    ///
    /// # Arguments
    /// * `db_path` - Path to SQLite database file
    /// * `encryption_key` - 32-byte master key from the key store
    pub fn new<P: AsRef<Path>>(db_path: P, encryption_key: [u8; KEY_SIZE]) -> Result<Self> {
        let conn = Connection::open(db_path).context("Failed to open session database")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                auth_type TEXT NOT NULL,
                encrypted_credentials TEXT NOT NULL,
                endpoint TEXT NOT NULL,
                warehouse TEXT,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                last_used_at INTEGER NOT NULL
            )
            "#,
            [],
        )
        .context("Failed to create sessions table")?;

        Ok(Self {
            conn: Mutex::new(conn),
            encryption_key,
        })
    }

    /// Creates a session and returns the full record including its new id.
    ///
    /// The id carries 256 bits of entropy; `expires_at` is fixed at creation
    /// time plus 24 hours and is never renewed.
    pub fn create(
        &self,
        credentials: &CatalogCredentials,
        endpoint: &str,
        warehouse: Option<&str>,
    ) -> Result<Session, SessionError> {
        self.create_at(credentials, endpoint, warehouse, Utc::now().timestamp_millis())
    }

    fn create_at(
        &self,
        credentials: &CatalogCredentials,
        endpoint: &str,
        warehouse: Option<&str>,
        now_ms: i64,
    ) -> Result<Session, SessionError> {
        let mut id_bytes = [0u8; SESSION_ID_BYTES];
        OsRng.fill_bytes(&mut id_bytes);
        let session_id = hex::encode(id_bytes);

        let sealed = credentials::seal_record(&self.encryption_key, credentials)?;

        // Endpoint is stored without a trailing slash so path concatenation
        // in the proxy is unambiguous.
        let endpoint = endpoint.trim_end_matches('/').to_string();
        let expires_at = now_ms + SESSION_TTL_MS;

        self.conn
            .lock()
            .unwrap()
            .execute(
                r#"
                INSERT INTO sessions (
                    session_id, auth_type, encrypted_credentials,
                    endpoint, warehouse,
                    created_at, expires_at, last_used_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    session_id,
                    credentials.auth_type(),
                    sealed,
                    endpoint,
                    warehouse,
                    now_ms,
                    expires_at,
                    now_ms,
                ],
            )
            .context("Failed to insert session")
            .map_err(SessionError::Storage)?;

        Ok(Session {
            session_id,
            credentials: credentials.clone(),
            endpoint,
            warehouse: warehouse.map(|w| w.to_string()),
            created_at: now_ms,
            expires_at,
            last_used_at: now_ms,
        })
    }

    /// Looks up a session, returning `None` for unknown or expired ids.
    ///
    /// A successful lookup touches `last_used_at`. An expired row is deleted
    /// lazily and reported as missing. Credentials in the returned session
    /// are decrypted plaintext for in-process use only.
    pub fn get(&self, session_id: &str) -> Result<Option<Session>, SessionError> {
        self.get_at(session_id, Utc::now().timestamp_millis())
    }

    fn get_at(&self, session_id: &str, now_ms: i64) -> Result<Option<Session>, SessionError> {
        let conn = self.conn.lock().unwrap();

        let row = conn
            .query_row(
                r#"
                SELECT auth_type, encrypted_credentials, endpoint, warehouse,
                       created_at, expires_at, last_used_at
                FROM sessions
                WHERE session_id = ?1
                "#,
                params![session_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, i64>(6)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query session")
            .map_err(SessionError::Storage)?;

        let Some((auth_type, sealed, endpoint, warehouse, created_at, expires_at, _last_used)) =
            row
        else {
            return Ok(None);
        };

        if expires_at <= now_ms {
            // Expired rows are indistinguishable from missing ones; drop the
            // row while we hold the connection.
            conn.execute(
                "DELETE FROM sessions WHERE session_id = ?1",
                params![session_id],
            )
            .context("Failed to delete expired session")
            .map_err(SessionError::Storage)?;
            return Ok(None);
        }

        conn.execute(
            "UPDATE sessions SET last_used_at = ?1 WHERE session_id = ?2",
            params![now_ms, session_id],
        )
        .context("Failed to touch session")
        .map_err(SessionError::Storage)?;

        let credentials = credentials::open_record(&self.encryption_key, &sealed)?;

        // Defense against a row whose tag column disagrees with its payload
        if credentials.auth_type() != auth_type {
            return Err(SessionError::Decryption(
                crate::credentials::CryptoError::DecryptionFailed,
            ));
        }

        Ok(Some(Session {
            session_id: session_id.to_string(),
            credentials,
            endpoint,
            warehouse,
            created_at,
            expires_at,
            last_used_at: now_ms,
        }))
    }

    /// Deletes a session unconditionally; unknown ids are not an error.
    pub fn delete(&self, session_id: &str) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute(
                "DELETE FROM sessions WHERE session_id = ?1",
                params![session_id],
            )
            .context("Failed to delete session")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store() -> SessionStore {
        SessionStore::new(":memory:", [0u8; KEY_SIZE]).expect("Failed to create test store")
    }

    fn bearer_creds() -> CatalogCredentials {
        CatalogCredentials::Bearer {
            token: "abc123".to_string(),
        }
    }

    #[test]
    fn test_create_and_get_roundtrip_all_schemes() {
        let store = create_test_store();

        let records = vec![
            bearer_creds(),
            CatalogCredentials::OAuth2 {
                token_endpoint: "https://idp.example.com/token".to_string(),
                client_id: "client".to_string(),
                client_secret: "s3cr3t".to_string(),
                scope: "catalog".to_string(),
            },
            CatalogCredentials::SigV4 {
                access_key: "AKIDEXAMPLE".to_string(),
                secret_key: "wJalrXUtnFEMI".to_string(),
                region: "us-east-1".to_string(),
                service: "glue".to_string(),
            },
        ];

        for creds in records {
            let created = store
                .create(&creds, "https://catalog.example.com", Some("prod"))
                .unwrap();

            let fetched = store.get(&created.session_id).unwrap().unwrap();
            assert_eq!(fetched.credentials, creds);
            assert_eq!(fetched.endpoint, "https://catalog.example.com");
            assert_eq!(fetched.warehouse.as_deref(), Some("prod"));
            assert_eq!(fetched.expires_at, created.created_at + SESSION_TTL_MS);
        }
    }

    #[test]
    fn test_session_id_entropy() {
        let store = create_test_store();
        let a = store.create(&bearer_creds(), "https://c", None).unwrap();
        let b = store.create(&bearer_creds(), "https://c", None).unwrap();

        // 32 bytes hex-encoded
        assert_eq!(a.session_id.len(), 64);
        assert_ne!(a.session_id, b.session_id);
    }

    #[test]
    fn test_get_unknown_id() {
        let store = create_test_store();
        assert!(store.get("deadbeef").unwrap().is_none());
    }

    #[test]
    fn test_expired_session_behaves_like_missing() {
        let store = create_test_store();
        let t0 = 1_700_000_000_000i64;

        let created = store
            .create_at(&bearer_creds(), "https://c", None, t0)
            .unwrap();
        assert_eq!(created.expires_at, t0 + SESSION_TTL_MS);

        // One millisecond before expiry: still valid
        let fetched = store
            .get_at(&created.session_id, t0 + SESSION_TTL_MS - 1)
            .unwrap();
        assert!(fetched.is_some());

        // At and past expiry: gone
        assert!(store
            .get_at(&created.session_id, t0 + SESSION_TTL_MS)
            .unwrap()
            .is_none());
        assert!(store
            .get_at(&created.session_id, t0 + SESSION_TTL_MS + 1)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_get_touches_last_used_at() {
        let store = create_test_store();
        let t0 = 1_700_000_000_000i64;

        let created = store
            .create_at(&bearer_creds(), "https://c", None, t0)
            .unwrap();

        let fetched = store.get_at(&created.session_id, t0 + 5000).unwrap().unwrap();
        assert_eq!(fetched.last_used_at, t0 + 5000);

        // The touch is persisted
        let again = store.get_at(&created.session_id, t0 + 9000).unwrap().unwrap();
        assert_eq!(again.created_at, t0);
        assert_eq!(again.last_used_at, t0 + 9000);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = create_test_store();
        let created = store.create(&bearer_creds(), "https://c", None).unwrap();

        store.delete(&created.session_id).unwrap();
        assert!(store.get(&created.session_id).unwrap().is_none());

        // Deleting again (or an id that never existed) is not an error
        store.delete(&created.session_id).unwrap();
        store.delete("never-existed").unwrap();
    }

    #[test]
    fn test_endpoint_trailing_slash_normalized() {
        let store = create_test_store();
        let created = store
            .create(&bearer_creds(), "https://catalog.example.com/", None)
            .unwrap();
        assert_eq!(created.endpoint, "https://catalog.example.com");
    }

    #[test]
    fn test_corrupted_row_surfaces_decryption_failure() {
        let store = create_test_store();
        let created = store.create(&bearer_creds(), "https://c", None).unwrap();

        // Corrupt the stored ciphertext directly
        store
            .conn
            .lock()
            .unwrap()
            .execute(
                "UPDATE sessions SET encrypted_credentials = ?1 WHERE session_id = ?2",
                params!["AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA", created.session_id],
            )
            .unwrap();

        match store.get(&created.session_id) {
            Err(SessionError::Decryption(_)) => {}
            other => panic!("Expected decryption failure, got {:?}", other.map(|_| ())),
        }
    }
}
