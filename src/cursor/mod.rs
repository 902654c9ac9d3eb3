//! Poll cursor persistence.
//!
//! Each polled resource stream keeps a "last seen" marker (timestamp or
//! opaque id) so restarts resume where the previous run stopped instead
//! of replaying from epoch or silently skipping. The store is a trait:
//! in-memory for tests, SQLite for production.

use anyhow::{Context, Result};
use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// Last-processed marker for one resource stream.
///
/// Advanced only after a fully successful batch, which yields
/// at-least-once delivery across restarts.
pub trait CursorStore: Send + Sync {
    /// Returns the stored cursor for `source_key`, if any.
    fn get(&self, source_key: &str) -> Result<Option<String>>;

    /// Replaces the cursor for `source_key`.
    fn set(&self, source_key: &str, last_seen: &str) -> Result<()>;

    /// Removes the cursor for `source_key` (stream deleted).
    fn clear(&self, source_key: &str) -> Result<()>;
}

/// In-memory cursor store. State resets on restart; use for tests and
/// throwaway runs only.
#[derive(Default)]
pub struct InMemoryCursorStore {
    cursors: DashMap<String, String>,
}

impl InMemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CursorStore for InMemoryCursorStore {
    fn get(&self, source_key: &str) -> Result<Option<String>> {
        Ok(self.cursors.get(source_key).map(|v| v.clone()))
    }

    fn set(&self, source_key: &str, last_seen: &str) -> Result<()> {
        self.cursors
            .insert(source_key.to_string(), last_seen.to_string());
        Ok(())
    }

    fn clear(&self, source_key: &str) -> Result<()> {
        self.cursors.remove(source_key);
        Ok(())
    }
}

/// SQLite-backed cursor store for production wiring.
pub struct SqliteCursorStore {
    conn: Mutex<Connection>,
}

impl SqliteCursorStore {
    /// Opens (or creates) the database and ensures the table exists.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path).context("Failed to open cursor database")?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS poll_cursors (
                source_key TEXT PRIMARY KEY,
                last_seen TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )
        .context("Failed to create poll_cursors table")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl CursorStore for SqliteCursorStore {
    fn get(&self, source_key: &str) -> Result<Option<String>> {
        self.conn
            .lock()
            .unwrap()
            .query_row(
                "SELECT last_seen FROM poll_cursors WHERE source_key = ?1",
                params![source_key],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to read poll cursor")
    }

    fn set(&self, source_key: &str, last_seen: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .lock()
            .unwrap()
            .execute(
                r#"
                INSERT INTO poll_cursors (source_key, last_seen, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(source_key) DO UPDATE SET
                    last_seen = excluded.last_seen,
                    updated_at = excluded.updated_at
                "#,
                params![source_key, last_seen, now],
            )
            .context("Failed to write poll cursor")?;
        Ok(())
    }

    fn clear(&self, source_key: &str) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute(
                "DELETE FROM poll_cursors WHERE source_key = ?1",
                params![source_key],
            )
            .context("Failed to clear poll cursor")?;
        Ok(())
    }
}
