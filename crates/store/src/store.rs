//! SQLite-backed session store.

use crate::{Part, Result, Role, SessionId, Transcript, Turn};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::warn;

const PREVIEW_LEN: usize = 60;

/// A short, human-facing description of a persisted session.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    /// First text part of the transcript, truncated.
    pub preview: Option<String>,
}

struct ActiveSession {
    id: SessionId,
    created_at: DateTime<Utc>,
    transcript: Transcript,
}

/// Owns the durable record of sessions and the transcript of the active one.
///
/// Each session is one row holding its full serialized turn list; every
/// append rewrites the document. Non-incremental, but transcripts stay small
/// enough that the simplicity wins over an append-only log.
pub struct SessionStore {
    conn: Connection,
    active: Option<ActiveSession>,
}

impl SessionStore {
    /// Open or create a session store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn, active: None };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory session store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn, active: None };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                document TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Id of the active session, if one has been created.
    pub fn session_id(&self) -> Option<SessionId> {
        self.active.as_ref().map(|s| s.id)
    }

    /// Turns of the active session's transcript.
    pub fn turns(&self) -> &[Turn] {
        self.active.as_ref().map(|s| s.transcript.turns()).unwrap_or(&[])
    }

    /// Append a part to the active session, creating the session on first
    /// append. The merge rule lives in [`Transcript::push`]; every append
    /// rewrites the session's durable record.
    pub fn append(&mut self, role: Role, part: Part) -> Result<()> {
        let session = self.active.get_or_insert_with(|| ActiveSession {
            id: SessionId::new(),
            created_at: Utc::now(),
            transcript: Transcript::new(),
        });
        session.transcript.push(role, part);
        self.persist()
    }

    pub fn append_text(&mut self, role: Role, text: impl Into<String>) -> Result<()> {
        self.append(role, Part::text(text))
    }

    pub fn append_function_call(
        &mut self,
        role: Role,
        name: impl Into<String>,
        args: Map<String, Value>,
    ) -> Result<()> {
        self.append(
            role,
            Part::FunctionCall {
                name: name.into(),
                args,
            },
        )
    }

    pub fn append_function_response(
        &mut self,
        role: Role,
        name: impl Into<String>,
        response: Value,
    ) -> Result<()> {
        self.append(
            role,
            Part::FunctionResponse {
                name: name.into(),
                response,
            },
        )
    }

    pub fn append_file_data(
        &mut self,
        role: Role,
        mime_type: impl Into<String>,
        uri: impl Into<String>,
        expiry_time: DateTime<Utc>,
    ) -> Result<()> {
        self.append(
            role,
            Part::FileData {
                mime_type: mime_type.into(),
                uri: uri.into(),
                expiry_time,
            },
        )
    }

    fn persist(&self) -> Result<()> {
        let Some(session) = &self.active else {
            return Ok(());
        };
        let document = serde_json::to_string(&session.transcript)?;
        self.conn.execute(
            "INSERT INTO sessions (id, created_at, document) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET document = excluded.document",
            params![
                session.id.to_string(),
                session.created_at.to_rfc3339(),
                document
            ],
        )?;
        Ok(())
    }

    /// Make the given session active, replaying its persisted turns.
    ///
    /// A missing or unreadable record is treated as an empty session, never
    /// a fatal error: the system must stay usable on first run and after a
    /// corrupted file.
    pub fn load(&mut self, id: SessionId) -> Result<()> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT created_at, document FROM sessions WHERE id = ?1",
                [id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (created_at, transcript) = match row {
            Some((created, document)) => {
                let created_at = created
                    .parse::<DateTime<Utc>>()
                    .unwrap_or_else(|_| Utc::now());
                match serde_json::from_str::<Vec<Turn>>(&document) {
                    Ok(turns) => (created_at, Transcript::replay(turns)),
                    Err(e) => {
                        warn!(session = %id, error = %e, "corrupt session record, starting empty");
                        (created_at, Transcript::new())
                    }
                }
            }
            None => {
                warn!(session = %id, "no record for session, starting empty");
                (Utc::now(), Transcript::new())
            }
        };

        self.active = Some(ActiveSession {
            id,
            created_at,
            transcript,
        });
        Ok(())
    }

    /// Enumerate persisted sessions, newest first.
    pub fn list(&self) -> Result<Vec<SessionSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, created_at, document FROM sessions ORDER BY created_at DESC",
        )?;

        let summaries = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let created_at: String = row.get(1)?;
                let document: String = row.get(2)?;
                Ok((id, created_at, document))
            })?
            .filter_map(|r| r.ok())
            .filter_map(|(id, created_at, document)| {
                let id: SessionId = id.parse().ok()?;
                let created_at = created_at.parse::<DateTime<Utc>>().ok()?;
                let preview = match serde_json::from_str::<Vec<Turn>>(&document) {
                    Ok(turns) => Transcript::replay(turns).first_text().map(truncate_preview),
                    Err(e) => {
                        warn!(session = %id, error = %e, "unreadable session record in listing");
                        None
                    }
                };
                Some(SessionSummary {
                    id,
                    created_at,
                    preview,
                })
            })
            .collect();

        Ok(summaries)
    }
}

fn truncate_preview(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= PREVIEW_LEN {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(PREVIEW_LEN).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn session_created_on_first_append() {
        let mut store = SessionStore::in_memory().unwrap();
        assert!(store.session_id().is_none());
        store.append_text(Role::User, "hello").unwrap();
        assert!(store.session_id().is_some());
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn load_round_trips_the_transcript() {
        let mut store = SessionStore::in_memory().unwrap();
        store.append_text(Role::User, "list files").unwrap();
        store
            .append_function_call(Role::Model, "list_dir", Map::new())
            .unwrap();
        store
            .append_function_response(Role::User, "list_dir", json!(["a.txt"]))
            .unwrap();
        store.append_text(Role::Model, "One file: a.txt").unwrap();

        let id = store.session_id().unwrap();
        let before = store.turns().to_vec();
        store.load(id).unwrap();
        assert_eq!(store.turns(), before.as_slice());
    }

    #[test]
    fn load_drops_expired_file_references() {
        let mut store = SessionStore::in_memory().unwrap();
        store.append_text(Role::User, "see attachment").unwrap();
        store
            .append_file_data(
                Role::User,
                "application/pdf",
                "files/stale",
                Utc::now() - Duration::minutes(5),
            )
            .unwrap();
        store.append_text(Role::Model, "Read it.").unwrap();

        let id = store.session_id().unwrap();
        store.load(id).unwrap();

        let parts: Vec<_> = store.turns().iter().flat_map(|t| &t.parts).collect();
        assert_eq!(parts.len(), 2);
        assert!(!parts.iter().any(|p| matches!(p, Part::FileData { .. })));
    }

    #[test]
    fn missing_record_is_an_empty_session() {
        let mut store = SessionStore::in_memory().unwrap();
        let id = SessionId::new();
        store.load(id).unwrap();
        assert_eq!(store.session_id(), Some(id));
        assert!(store.turns().is_empty());
    }

    #[test]
    fn corrupt_record_is_an_empty_session() {
        let mut store = SessionStore::in_memory().unwrap();
        store.append_text(Role::User, "hi").unwrap();
        let id = store.session_id().unwrap();
        store
            .conn
            .execute("UPDATE sessions SET document = 'not json'", [])
            .unwrap();
        store.load(id).unwrap();
        assert!(store.turns().is_empty());
    }

    #[test]
    fn list_previews_first_text_part() {
        let mut store = SessionStore::in_memory().unwrap();
        store
            .append_function_call(Role::Model, "probe", Map::new())
            .unwrap();
        store
            .append_text(Role::Model, "a ".repeat(100))
            .unwrap();

        let sessions = store.list().unwrap();
        assert_eq!(sessions.len(), 1);
        let preview = sessions[0].preview.as_deref().unwrap();
        assert!(preview.chars().count() <= PREVIEW_LEN + 1);
        assert!(preview.starts_with("a a"));
    }
}
