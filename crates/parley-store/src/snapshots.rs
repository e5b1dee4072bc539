use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use rusqlite::OptionalExtension;

use crate::Database;

/// The independently persisted stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotKey {
    History,
    PrivateChats,
    Subscriptions,
}

impl SnapshotKey {
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotKey::History => "history",
            SnapshotKey::PrivateChats => "private_chats",
            SnapshotKey::Subscriptions => "subscriptions",
        }
    }
}

/// Durable storage for whole-store JSON snapshots.
///
/// Calls are blocking; async callers go through `spawn_blocking`.
pub trait SnapshotStore: Send + Sync + 'static {
    fn save(&self, key: SnapshotKey, body: &str) -> Result<()>;
    fn load(&self, key: SnapshotKey) -> Result<Option<String>>;
}

impl SnapshotStore for Database {
    fn save(&self, key: SnapshotKey, body: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO snapshots (key, body, saved_at) VALUES (?1, ?2, datetime('now'))
                 ON CONFLICT(key) DO UPDATE SET body = excluded.body, saved_at = excluded.saved_at",
                (key.as_str(), body),
            )?;
            Ok(())
        })
    }

    fn load(&self, key: SnapshotKey) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let body = conn
                .query_row(
                    "SELECT body FROM snapshots WHERE key = ?1",
                    [key.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(body)
        })
    }
}

/// Snapshot store kept in process memory. Counts saves per key so callers
/// can check how often a store was written.
#[derive(Default)]
pub struct MemorySnapshots {
    bodies: Mutex<HashMap<SnapshotKey, String>>,
    saves: Mutex<HashMap<SnapshotKey, usize>>,
}

impl MemorySnapshots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save_count(&self, key: SnapshotKey) -> usize {
        self.saves
            .lock()
            .map(|s| s.get(&key).copied().unwrap_or_default())
            .unwrap_or_default()
    }
}

impl SnapshotStore for MemorySnapshots {
    fn save(&self, key: SnapshotKey, body: &str) -> Result<()> {
        self.bodies
            .lock()
            .map_err(|e| anyhow!("snapshot lock poisoned: {}", e))?
            .insert(key, body.to_string());
        *self
            .saves
            .lock()
            .map_err(|e| anyhow!("snapshot lock poisoned: {}", e))?
            .entry(key)
            .or_default() += 1;
        Ok(())
    }

    fn load(&self, key: SnapshotKey) -> Result<Option<String>> {
        Ok(self
            .bodies
            .lock()
            .map_err(|e| anyhow!("snapshot lock poisoned: {}", e))?
            .get(&key)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_upserts_per_key() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.load(SnapshotKey::History).unwrap(), None);

        db.save(SnapshotKey::History, "[1]").unwrap();
        db.save(SnapshotKey::History, "[1,2]").unwrap();
        db.save(SnapshotKey::Subscriptions, "{}").unwrap();

        assert_eq!(db.load(SnapshotKey::History).unwrap().as_deref(), Some("[1,2]"));
        assert_eq!(db.load(SnapshotKey::Subscriptions).unwrap().as_deref(), Some("{}"));
        assert_eq!(db.load(SnapshotKey::PrivateChats).unwrap(), None);
    }

    #[test]
    fn memory_store_counts_saves() {
        let store = MemorySnapshots::new();
        store.save(SnapshotKey::PrivateChats, "{}").unwrap();
        store.save(SnapshotKey::PrivateChats, "{}").unwrap();
        assert_eq!(store.save_count(SnapshotKey::PrivateChats), 2);
        assert_eq!(store.save_count(SnapshotKey::History), 0);
    }
}
