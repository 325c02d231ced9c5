//! Master encryption key provisioning.
//!
//! A single 256-bit key encrypts every stored credential record. The key is
//! generated lazily on first use and persisted as a raw blob in its own
//! SQLite database, separate from the sessions table. There is no rotation
//! or versioning: losing the blob makes existing sessions permanently
//! undecryptable, which is an accepted failure mode.
//!
//! # Schema
//! ```sql
//! CREATE TABLE master_key (
//!     id INTEGER PRIMARY KEY CHECK (id = 1),
//!     key_bytes BLOB NOT NULL,
//!     created_at TEXT NOT NULL
//! );
//! ```
//!
//! Provisioning is race-free: the generated candidate is written with
//! `INSERT OR IGNORE` and the row is then re-read, so when two cold starts
//! race, the loser adopts the winner's key instead of persisting a second
//! key that would orphan encrypted data.

use crate::credentials::KEY_SIZE;
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed store for the process-wide master key.
pub struct KeyStore {
    conn: Mutex<Connection>,
}

impl KeyStore {
    /// Opens (or creates) the key database at `db_path`.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path).context("Failed to open key database")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS master_key (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                key_bytes BLOB NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            [],
        )
        .context("Failed to create master_key table")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Returns the persisted master key, generating it on first call.
    ///
    /// Subsequent calls (including from other processes sharing the same
    /// database file) always return the same key.
    pub fn get_or_create_key(&self) -> Result<[u8; KEY_SIZE]> {
        let mut candidate = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut candidate);

        let conn = self.conn.lock().unwrap();

        // Conditional write: only the first writer's key ever lands.
        conn.execute(
            "INSERT OR IGNORE INTO master_key (id, key_bytes, created_at) VALUES (1, ?1, ?2)",
            params![candidate.as_slice(), Utc::now().to_rfc3339()],
        )
        .context("Failed to persist master key")?;

        let stored: Vec<u8> = conn
            .query_row("SELECT key_bytes FROM master_key WHERE id = 1", [], |row| {
                row.get(0)
            })
            .context("Failed to read master key")?;

        stored
            .as_slice()
            .try_into()
            .map_err(|_| anyhow!("Persisted master key has wrong length: {} bytes", stored.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_key_is_stable_across_calls() {
        let dir = tempdir().unwrap();
        let store = KeyStore::open(dir.path().join("keys.db")).unwrap();

        let first = store.get_or_create_key().unwrap();
        let second = store.get_or_create_key().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_key_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keys.db");

        let first = KeyStore::open(&path).unwrap().get_or_create_key().unwrap();
        let second = KeyStore::open(&path).unwrap().get_or_create_key().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_concurrent_provisioning_converges() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keys.db");

        // Two handles racing to provision still agree on one key
        let a = KeyStore::open(&path).unwrap();
        let b = KeyStore::open(&path).unwrap();
        assert_eq!(a.get_or_create_key().unwrap(), b.get_or_create_key().unwrap());
    }

    #[test]
    fn test_distinct_stores_get_distinct_keys() {
        let dir = tempdir().unwrap();
        let a = KeyStore::open(dir.path().join("a.db")).unwrap();
        let b = KeyStore::open(dir.path().join("b.db")).unwrap();
        assert_ne!(a.get_or_create_key().unwrap(), b.get_or_create_key().unwrap());
    }
}
