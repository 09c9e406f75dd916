//! SQLite implementation of the device registry.
//!
//! Uses rusqlite with bundled SQLite, wrapped in async via
//! `tokio::task::spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use anchorage_core::{DeviceId, DevicePublicKey};

use crate::error::{RegistryError, RegistryResult};
use crate::migration::{self, now_millis};
use crate::traits::{validate_registration, DeviceRegistry};

/// SQLite-backed device registry.
///
/// Thread-safe via an internal Mutex, which also serializes writers.
pub struct SqliteRegistry {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRegistry {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> RegistryResult<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> RegistryResult<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> RegistryResult<T>
    where
        F: FnOnce(&Connection) -> RegistryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| RegistryError::Task(format!("mutex poisoned: {}", e)))?;
            f(&conn)
        })
        .await
        .map_err(|e| RegistryError::Task(e.to_string()))?
    }
}

#[async_trait]
impl DeviceRegistry for SqliteRegistry {
    async fn register(
        &self,
        device_id: &DeviceId,
        public_key: &DevicePublicKey,
    ) -> RegistryResult<()> {
        validate_registration(public_key)?;
        let id = device_id.as_str().to_string();
        let key = public_key.as_bytes().to_vec();

        let replaced = self
            .with_conn(move |conn| {
                let now = now_millis();
                let existing: Option<i64> = conn
                    .query_row(
                        "SELECT key_version FROM devices WHERE device_id = ?1",
                        params![id],
                        |row| row.get(0),
                    )
                    .optional()?;

                conn.execute(
                    "INSERT INTO devices (device_id, public_key, registered_at, updated_at)
                     VALUES (?1, ?2, ?3, ?3)
                     ON CONFLICT(device_id) DO UPDATE SET
                        public_key = excluded.public_key,
                        updated_at = excluded.updated_at,
                        key_version = devices.key_version + 1",
                    params![id, key, now],
                )?;
                Ok(existing.is_some())
            })
            .await?;

        if replaced {
            tracing::warn!(device_id = %device_id, "device re-registered, previous key replaced");
        }
        Ok(())
    }

    async fn lookup(&self, device_id: &DeviceId) -> RegistryResult<DevicePublicKey> {
        let id = device_id.as_str().to_string();
        let key: Option<Vec<u8>> = self
            .with_conn(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT public_key FROM devices WHERE device_id = ?1",
                        params![id],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;

        key.map(DevicePublicKey::from_bytes)
            .ok_or_else(|| RegistryError::NotFound(device_id.clone()))
    }

    async fn list_devices(&self) -> RegistryResult<Vec<DeviceId>> {
        let ids: Vec<String> = self
            .with_conn(|conn| {
                let mut stmt = conn.prepare("SELECT device_id FROM devices ORDER BY device_id")?;
                let rows = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?;
                Ok(rows)
            })
            .await?;

        ids.into_iter()
            .map(|id| DeviceId::new(id).map_err(|e| RegistryError::InvalidInput(e.to_string())))
            .collect()
    }
}
