//! Schema initialisation for the `server_configs` table.

use rusqlite::Connection;

use crate::error::Result;

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS server_configs (
            server_id          TEXT PRIMARY KEY,
            server_name        TEXT NOT NULL,
            error_policy       TEXT NOT NULL CHECK (error_policy IN ('skip', 'stop')),
            embedding_model_id TEXT NOT NULL,
            created_at         TEXT NOT NULL,
            updated_at         TEXT NOT NULL
        );",
    )?;
    Ok(())
}
