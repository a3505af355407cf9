use std::sync::Mutex;

use chrono::Utc;
use rusqlite::Connection;
use tracing::{info, instrument};
use uuid::Uuid;

use discorder_core::types::{ConvTurn, ServerId, Transcription, TurnRole, UserId, VoiceSession};

use crate::error::{Result, StoreError};

/// Durable append-only log of chat turns, plus voice session and
/// transcription rows. No in-memory mirror — reads go straight to SQLite,
/// since history reads are cold-path relative to the chat hot path.
pub struct ConversationStore {
    db: Mutex<Connection>,
}

impl ConversationStore {
    pub fn new(conn: Connection) -> Result<Self> {
        crate::db::init_schema(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    #[instrument(skip(self, content))]
    pub fn append_turn(
        &self,
        user_id: &UserId,
        server_id: &ServerId,
        role: TurnRole,
        content: &str,
        session_id: Option<&str>,
    ) -> Result<ConvTurn> {
        let db = self.db.lock().unwrap();
        let now = Utc::now();
        db.execute(
            "INSERT INTO conv_turns (user_id, server_id, role, content, timestamp, session_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                user_id.as_str(),
                server_id.as_str(),
                role.to_string(),
                content,
                now.to_rfc3339(),
                session_id,
            ],
        )?;
        let id = db.last_insert_rowid();
        Ok(ConvTurn {
            id,
            user_id: user_id.clone(),
            server_id: server_id.clone(),
            role,
            content: content.to_string(),
            timestamp: now,
            session_id: session_id.map(str::to_string),
        })
    }

    /// Most recent `limit` turns for `(user_id, server_id)`, oldest first.
    #[instrument(skip(self))]
    pub fn get_history(
        &self,
        user_id: &UserId,
        server_id: &ServerId,
        limit: usize,
    ) -> Result<Vec<ConvTurn>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, user_id, server_id, role, content, timestamp, session_id
             FROM conv_turns
             WHERE user_id = ?1 AND server_id = ?2
             ORDER BY timestamp DESC, id DESC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![user_id.as_str(), server_id.as_str(), limit as i64],
            row_to_turn,
        )?;
        let mut turns: Vec<ConvTurn> = rows.filter_map(|r| r.ok()).collect();
        turns.reverse();
        Ok(turns)
    }

    /// Bulk-delete all turns for `(user_id, server_id)`. Backs
    /// `!clear-conversation-history`.
    #[instrument(skip(self))]
    pub fn clear(&self, user_id: &UserId, server_id: &ServerId) -> Result<usize> {
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "DELETE FROM conv_turns WHERE user_id = ?1 AND server_id = ?2",
            rusqlite::params![user_id.as_str(), server_id.as_str()],
        )?;
        info!(user_id = user_id.as_str(), deleted = n, "conversation history cleared");
        Ok(n)
    }

    #[instrument(skip(self))]
    pub fn create_voice_session(
        &self,
        user_id: &UserId,
        guild_id: &str,
        channel_id: &str,
    ) -> Result<VoiceSession> {
        let db = self.db.lock().unwrap();
        let session = VoiceSession {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.clone(),
            guild_id: guild_id.to_string(),
            channel_id: channel_id.to_string(),
            created_at: Utc::now(),
            ended_at: None,
        };
        db.execute(
            "INSERT INTO voice_sessions (id, user_id, guild_id, channel_id, created_at, ended_at)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
            rusqlite::params![
                session.id,
                session.user_id.as_str(),
                session.guild_id,
                session.channel_id,
                session.created_at.to_rfc3339(),
            ],
        )?;
        Ok(session)
    }

    #[instrument(skip(self))]
    pub fn end_voice_session(&self, session_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let n = db.execute(
            "UPDATE voice_sessions SET ended_at = ?1 WHERE id = ?2 AND ended_at IS NULL",
            rusqlite::params![now, session_id],
        )?;
        if n == 0 {
            return Err(StoreError::SessionNotFound(session_id.to_string()));
        }
        Ok(())
    }

    /// Rows with no `ended_at` — either genuinely in flight, or orphaned by a
    /// crash. Used by startup recovery to re-run the cleanup transition for
    /// channels that may still exist in Discord.
    pub fn list_active_voice_sessions(&self) -> Result<Vec<VoiceSession>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, user_id, guild_id, channel_id, created_at, ended_at
             FROM voice_sessions WHERE ended_at IS NULL",
        )?;
        let rows = stmt.query_map([], row_to_voice_session)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn get_voice_session(&self, session_id: &str) -> Result<Option<VoiceSession>> {
        let db = self.db.lock().unwrap();
        let result = db.query_row(
            "SELECT id, user_id, guild_id, channel_id, created_at, ended_at
             FROM voice_sessions WHERE id = ?1",
            rusqlite::params![session_id],
            row_to_voice_session,
        );
        match result {
            Ok(s) => Ok(Some(s)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// Append a transcription chunk. `chunk_index` must strictly increase
    /// within a session — enforced by the caller (Audio Sink), not here.
    pub fn append_transcription(&self, t: &Transcription) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO transcriptions (session_id, chunk_index, text, confidence, duration_sec, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                t.session_id,
                t.chunk_index,
                t.text,
                t.confidence,
                t.duration_sec,
                t.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn list_transcriptions(&self, session_id: &str) -> Result<Vec<Transcription>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT session_id, chunk_index, text, confidence, duration_sec, timestamp
             FROM transcriptions WHERE session_id = ?1 ORDER BY chunk_index ASC",
        )?;
        let rows = stmt.query_map(rusqlite::params![session_id], row_to_transcription)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

fn row_to_turn(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConvTurn> {
    let role_str: String = row.get(3)?;
    let ts_str: String = row.get(5)?;
    Ok(ConvTurn {
        id: row.get(0)?,
        user_id: UserId::from(row.get::<_, String>(1)?),
        server_id: ServerId::from(row.get::<_, String>(2)?),
        role: role_str.parse().unwrap_or(TurnRole::User),
        content: row.get(4)?,
        timestamp: parse_ts(&ts_str),
        session_id: row.get(6)?,
    })
}

fn row_to_voice_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<VoiceSession> {
    let created_str: String = row.get(4)?;
    let ended_str: Option<String> = row.get(5)?;
    Ok(VoiceSession {
        id: row.get(0)?,
        user_id: UserId::from(row.get::<_, String>(1)?),
        guild_id: row.get(2)?,
        channel_id: row.get(3)?,
        created_at: parse_ts(&created_str),
        ended_at: ended_str.map(|s| parse_ts(&s)),
    })
}

fn row_to_transcription(row: &rusqlite::Row<'_>) -> rusqlite::Result<Transcription> {
    let ts_str: String = row.get(5)?;
    Ok(Transcription {
        session_id: row.get(0)?,
        chunk_index: row.get(1)?,
        text: row.get(2)?,
        confidence: row.get(3)?,
        duration_sec: row.get(4)?,
        timestamp: parse_ts(&ts_str),
    })
}

fn parse_ts(s: &str) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ConversationStore {
        ConversationStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn append_and_read_history_in_order() {
        let s = store();
        let user = UserId::from("u1");
        let server = ServerId::dm();
        s.append_turn(&user, &server, TurnRole::User, "hi", None).unwrap();
        s.append_turn(&user, &server, TurnRole::Assistant, "hello", None)
            .unwrap();
        let history = s.get_history(&user, &server, 10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, TurnRole::User);
        assert_eq!(history[1].role, TurnRole::Assistant);
    }

    #[test]
    fn clear_removes_only_that_scope() {
        let s = store();
        let u1 = UserId::from("u1");
        let u2 = UserId::from("u2");
        let server = ServerId::dm();
        s.append_turn(&u1, &server, TurnRole::User, "a", None).unwrap();
        s.append_turn(&u2, &server, TurnRole::User, "b", None).unwrap();
        let deleted = s.clear(&u1, &server).unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(s.get_history(&u1, &server, 10).unwrap().len(), 0);
        assert_eq!(s.get_history(&u2, &server, 10).unwrap().len(), 1);
    }

    #[test]
    fn voice_session_lifecycle() {
        let s = store();
        let user = UserId::from("u1");
        let session = s.create_voice_session(&user, "g1", "c1").unwrap();
        assert!(session.ended_at.is_none());
        s.end_voice_session(&session.id).unwrap();
        let reloaded = s.get_voice_session(&session.id).unwrap().unwrap();
        assert!(reloaded.ended_at.is_some());
    }

    #[test]
    fn ending_unknown_session_errors() {
        let s = store();
        assert!(matches!(
            s.end_voice_session("missing"),
            Err(StoreError::SessionNotFound(_))
        ));
    }

    #[test]
    fn transcriptions_ordered_by_chunk_index() {
        let s = store();
        let user = UserId::from("u1");
        let session = s.create_voice_session(&user, "g1", "c1").unwrap();
        s.append_transcription(&Transcription {
            session_id: session.id.clone(),
            chunk_index: 1,
            text: "second".into(),
            confidence: Some(0.9),
            duration_sec: Some(1.2),
            timestamp: Utc::now(),
        })
        .unwrap();
        s.append_transcription(&Transcription {
            session_id: session.id.clone(),
            chunk_index: 0,
            text: "first".into(),
            confidence: Some(0.95),
            duration_sec: Some(1.0),
            timestamp: Utc::now(),
        })
        .unwrap();
        let chunks = s.list_transcriptions(&session.id).unwrap();
        assert_eq!(chunks[0].text, "first");
        assert_eq!(chunks[1].text, "second");
    }
}
