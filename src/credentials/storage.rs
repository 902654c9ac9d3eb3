//! Encrypted credential storage backed by SQLite.
//!
//! One row per adapter id. Tokens are sealed with AES-256-GCM before
//! they touch the database; the master key lives in memory only.

use super::{encryption, Credentials};
use crate::error::AdapterError;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// Encrypted credential store.
///
/// # Schema
/// ```sql
/// CREATE TABLE credentials (
///     adapter_id TEXT PRIMARY KEY,
///     access_token TEXT NOT NULL,   -- sealed
///     refresh_token TEXT,           -- sealed (optional)
///     expires_at TEXT,              -- ISO 8601 (optional)
///     created_at TEXT NOT NULL,
///     updated_at TEXT NOT NULL
/// );
/// ```
///
/// # Thread safety
/// The connection is wrapped in a Mutex; SQLite itself runs in
/// serialized mode.
pub struct CredentialStore {
    conn: Mutex<Connection>,
    master_key: Vec<u8>,
}

impl CredentialStore {
    /// Creates or opens a credential store.
    ///
    /// `master_key_base64` must decode to exactly 32 bytes.
    pub fn new<P: AsRef<Path>>(db_path: P, master_key_base64: &str) -> Result<Self> {
        let master_key =
            encryption::validate_key(master_key_base64).context("Invalid encryption key")?;

        let conn = Connection::open(db_path).context("Failed to open credential database")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS credentials (
                adapter_id TEXT PRIMARY KEY,
                access_token TEXT NOT NULL,
                refresh_token TEXT,
                expires_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )
        .context("Failed to create credentials table")?;

        Ok(Self {
            conn: Mutex::new(conn),
            master_key,
        })
    }

    /// Stores credentials for an adapter (upsert).
    pub fn store(&self, adapter_id: &str, credentials: &Credentials) -> Result<()> {
        let access_sealed = encryption::seal(&credentials.access_token, &self.master_key)
            .context("Failed to encrypt access token")?;

        let refresh_sealed = credentials
            .refresh_token
            .as_deref()
            .map(|token| encryption::seal(token, &self.master_key))
            .transpose()
            .context("Failed to encrypt refresh token")?;

        let expires_at = credentials.expires_at.map(|dt| dt.to_rfc3339());
        let now = chrono::Utc::now().to_rfc3339();

        self.conn
            .lock()
            .unwrap()
            .execute(
                r#"
                INSERT INTO credentials (
                    adapter_id, access_token, refresh_token,
                    expires_at, created_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                ON CONFLICT(adapter_id) DO UPDATE SET
                    access_token = excluded.access_token,
                    refresh_token = excluded.refresh_token,
                    expires_at = excluded.expires_at,
                    updated_at = excluded.updated_at
                "#,
                params![adapter_id, access_sealed, refresh_sealed, expires_at, now],
            )
            .context("Failed to store credentials")?;

        Ok(())
    }

    /// Retrieves and decrypts credentials for an adapter.
    pub fn get(&self, adapter_id: &str) -> Result<Option<Credentials>> {
        let row: Option<(String, Option<String>, Option<String>)> = self
            .conn
            .lock()
            .unwrap()
            .query_row(
                "SELECT access_token, refresh_token, expires_at
                 FROM credentials WHERE adapter_id = ?1",
                params![adapter_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .context("Failed to query credentials")?;

        let Some((access_sealed, refresh_sealed, expires_at)) = row else {
            return Ok(None);
        };

        let access_token = encryption::open(&access_sealed, &self.master_key)
            .context("Failed to decrypt access token")?;

        let refresh_token = refresh_sealed
            .as_deref()
            .map(|sealed| encryption::open(sealed, &self.master_key))
            .transpose()
            .context("Failed to decrypt refresh token")?;

        let expires_at = expires_at
            .as_deref()
            .map(|s| {
                chrono::DateTime::parse_from_rfc3339(s)
                    .map(|dt| dt.with_timezone(&chrono::Utc))
            })
            .transpose()
            .context("Invalid expires_at timestamp in store")?;

        Ok(Some(Credentials {
            access_token,
            refresh_token,
            expires_at,
        }))
    }

    /// Returns the decrypted access token for an adapter, failing with a
    /// structured error when it is missing or undecryptable.
    pub fn access_token(&self, adapter_id: &str) -> Result<String, AdapterError> {
        match self.get(adapter_id) {
            Ok(Some(creds)) => Ok(creds.access_token),
            Ok(None) => Err(AdapterError::Credential(format!(
                "no credentials stored for adapter '{}'",
                adapter_id
            ))),
            Err(e) => Err(AdapterError::Credential(format!(
                "failed to load credentials for adapter '{}': {}",
                adapter_id, e
            ))),
        }
    }

    /// Deletes credentials for an adapter. Returns true if a row existed.
    pub fn delete(&self, adapter_id: &str) -> Result<bool> {
        let deleted = self
            .conn
            .lock()
            .unwrap()
            .execute(
                "DELETE FROM credentials WHERE adapter_id = ?1",
                params![adapter_id],
            )
            .context("Failed to delete credentials")?;
        Ok(deleted > 0)
    }

    /// Lists all adapter ids that have stored credentials.
    pub fn list_adapters(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT adapter_id FROM credentials ORDER BY adapter_id")
            .context("Failed to prepare list query")?;

        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("Failed to list credentials")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to read credential rows")?;

        Ok(ids)
    }
}
