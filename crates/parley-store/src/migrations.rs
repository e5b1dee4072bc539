use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (snapshots)");
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS snapshots (
                key         TEXT PRIMARY KEY,
                body        TEXT NOT NULL,
                saved_at    TEXT NOT NULL DEFAULT (datetime('now'))
            );

            PRAGMA user_version = 1;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
