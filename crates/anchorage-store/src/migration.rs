//! Database schema migrations for the SQLite device registry.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{RegistryError, RegistryResult};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> RegistryResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
        tracing::debug!(from = current, to = CURRENT_VERSION, "registry schema migrated");
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> RegistryResult<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(RegistryError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> RegistryResult<()> {
    conn.execute_batch(
        r#"
        -- One row per enrolled device; re-registration overwrites in place
        CREATE TABLE devices (
            device_id TEXT PRIMARY KEY,
            public_key BLOB NOT NULL,          -- as supplied at registration
            registered_at INTEGER NOT NULL,    -- first enrollment (Unix ms)
            updated_at INTEGER NOT NULL,       -- last key replacement (Unix ms)
            key_version INTEGER NOT NULL DEFAULT 1
        );
        "#,
    )?;

    Ok(())
}

pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
