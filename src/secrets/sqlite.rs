//! SQLite-backed private state.

use super::state::{validate_entry, PrivateState};
use crate::error::{PolicyError, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, info};

/// Current schema version. Increment when adding new migrations.
const SCHEMA_VERSION: u32 = 1;

/// Private state persisted in a SQLite file, one row per (resource, key).
///
/// The pool lets parallel workers operate on different resources at once;
/// rows for a single resource are only ever written by one of them.
#[derive(Clone)]
pub struct SqliteState {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteState {
    /// Open (or create) the database at `path` and apply migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| {
                    PolicyError::Storage(format!(
                        "cannot create state directory {}: {e}",
                        dir.display()
                    ))
                })?;
            }
        }

        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| conn.execute_batch("PRAGMA busy_timeout = 5000;"));
        let pool = Pool::builder().max_size(8).build(manager)?;
        run_migrations(&*pool.get()?)?;

        info!(db = %path.display(), "private state store ready");
        Ok(Self { pool })
    }

    /// Keys stored for `resource`, sorted.
    pub fn keys(&self, resource: &str) -> Result<Vec<String>> {
        let conn = self.pool.get()?;
        let mut stmt =
            conn.prepare("SELECT key FROM private_state WHERE resource = ?1 ORDER BY key")?;
        let keys = stmt
            .query_map([resource], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(keys)
    }
}

impl PrivateState for SqliteState {
    fn get_key(&self, resource: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.pool.get()?;
        let value = conn
            .query_row(
                "SELECT value FROM private_state WHERE resource = ?1 AND key = ?2",
                params![resource, key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_key(&self, resource: &str, key: &str, value: &[u8]) -> Result<()> {
        validate_entry(key, value)?;
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO private_state (resource, key, value, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(resource, key) DO UPDATE
             SET value = excluded.value, updated_at = excluded.updated_at",
            params![resource, key, value, chrono::Utc::now().to_rfc3339()],
        )?;
        debug!(resource, key, bytes = value.len(), "private state written");
        Ok(())
    }

    fn clear(&self, resource: &str) -> Result<()> {
        let conn = self.pool.get()?;
        let removed = conn.execute("DELETE FROM private_state WHERE resource = ?1", [resource])?;
        debug!(resource, removed, "private state cleared");
        Ok(())
    }
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS meta (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;

    let current_version = get_schema_version(conn)?;
    if current_version >= SCHEMA_VERSION {
        debug!(version = current_version, "private state schema up to date");
        return Ok(());
    }

    if current_version < 1 {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS private_state (
                resource   TEXT NOT NULL,
                key        TEXT NOT NULL,
                value      BLOB NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (resource, key)
            );",
        )?;
    }

    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;
    debug!(version = SCHEMA_VERSION, "private state schema migrated");
    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<u32> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    match raw {
        None => Ok(0),
        Some(v) => v.parse::<u32>().map_err(|e| {
            PolicyError::Storage(format!("invalid private state schema version {v:?}: {e}"))
        }),
    }
}
