//! Schema for conversation turns, voice sessions, and transcriptions.

use rusqlite::Connection;

use crate::error::Result;

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS conv_turns (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     TEXT NOT NULL,
            server_id   TEXT NOT NULL,
            role        TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
            content     TEXT NOT NULL,
            timestamp   TEXT NOT NULL,
            session_id  TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_conv_turns_user_server
            ON conv_turns(user_id, server_id, timestamp);

        CREATE TABLE IF NOT EXISTS voice_sessions (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL,
            guild_id    TEXT NOT NULL,
            channel_id  TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            ended_at    TEXT
        );

        CREATE TABLE IF NOT EXISTS transcriptions (
            session_id   TEXT NOT NULL,
            chunk_index  INTEGER NOT NULL,
            text         TEXT NOT NULL,
            confidence   REAL,
            duration_sec REAL,
            timestamp    TEXT NOT NULL,
            PRIMARY KEY (session_id, chunk_index)
        );",
    )?;
    Ok(())
}
