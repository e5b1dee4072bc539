pub mod log;
pub mod media;
pub mod migrations;
pub mod snapshots;
pub mod subscriptions;
pub mod threads;

pub use log::MessageLog;
pub use media::{DiskMedia, MediaStore, UploadError};
pub use snapshots::{MemorySnapshots, SnapshotKey, SnapshotStore};
pub use subscriptions::Subscriptions;
pub use threads::{PrivateThread, ThreadStore};

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

/// SQLite database holding the JSON snapshots of every in-memory store.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Self::init(Connection::open(path)?)?;
        info!("Database opened at {}", path.display());
        Ok(db)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        // WAL mode so a snapshot write never blocks a concurrent read
        conn.pragma_update(None, "journal_mode", "WAL")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }
}
