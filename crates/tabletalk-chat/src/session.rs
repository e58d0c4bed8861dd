//! Session state: one uploaded data file, its derived schema, and the
//! append-only operation history.
//!
//! A `SessionStore` is an explicit object handed to every handler; there
//! is deliberately no process-wide singleton. Each session owns its data
//! file exclusively; idle sessions expire and their files are deleted.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use tabletalk_core::types::{DataFormat, HistoryEntry, Schema, SessionSummary};
use tabletalk_store::SessionDb;

use crate::error::ChatError;

/// Mutable per-session state behind one lock.
struct SessionState {
    schema: Schema,
    history: Vec<HistoryEntry>,
    last_message_at: DateTime<Utc>,
}

/// One user's session: data file, schema, history.
pub struct Session {
    pub id: Uuid,
    /// Original upload filename, used for the download name.
    pub name: String,
    pub created_at: DateTime<Utc>,
    db: SessionDb,
    state: Mutex<SessionState>,
    /// Serializes message processing: one turn runs to completion before
    /// the next is accepted.
    turn: tokio::sync::Mutex<()>,
}

impl Session {
    fn new(id: Uuid, name: String, db: SessionDb, schema: Schema) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            created_at: now,
            db,
            state: Mutex::new(SessionState {
                schema,
                history: Vec::new(),
                last_message_at: now,
            }),
            turn: tokio::sync::Mutex::new(()),
        }
    }

    /// The session's data store.
    pub fn db(&self) -> &SessionDb {
        &self.db
    }

    /// Acquire the turn lock for the duration of one message.
    pub async fn lock_turn(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.turn.lock().await
    }

    fn state(&self) -> Result<std::sync::MutexGuard<'_, SessionState>, ChatError> {
        self.state
            .lock()
            .map_err(|e| ChatError::Storage(format!("session lock poisoned: {}", e)))
    }

    /// Current schema snapshot.
    pub fn schema(&self) -> Result<Schema, ChatError> {
        Ok(self.state()?.schema.clone())
    }

    /// Replace the schema after a successful mutation.
    pub fn set_schema(&self, schema: Schema) -> Result<(), ChatError> {
        self.state()?.schema = schema;
        Ok(())
    }

    /// Append a history entry. Prior entries are never touched.
    pub fn record(&self, entry: HistoryEntry) -> Result<(), ChatError> {
        self.state()?.history.push(entry);
        Ok(())
    }

    /// Snapshot of schema and history for rendering.
    pub fn snapshot(&self) -> Result<(Schema, Vec<HistoryEntry>), ChatError> {
        let state = self.state()?;
        Ok((state.schema.clone(), state.history.clone()))
    }

    /// Bump the idle clock.
    pub fn touch(&self) -> Result<(), ChatError> {
        self.state()?.last_message_at = Utc::now();
        Ok(())
    }

    fn is_expired(&self, timeout_minutes: i64) -> bool {
        match self.state.lock() {
            Ok(state) => {
                Utc::now() - state.last_message_at > Duration::minutes(timeout_minutes)
            }
            Err(_) => true,
        }
    }

    fn summary(&self) -> SessionSummary {
        let (table_count, history_len, last_message_at) = match self.state.lock() {
            Ok(state) => (
                state.schema.tables.len(),
                state.history.len(),
                state.last_message_at,
            ),
            Err(_) => (0, 0, self.created_at),
        };
        SessionSummary {
            id: self.id,
            name: self.name.clone(),
            table_count,
            history_len,
            created_at: self.created_at,
            last_message_at,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// Registry of live sessions keyed by id.
pub struct SessionStore {
    data_dir: PathBuf,
    timeout_minutes: i64,
    sessions: Mutex<HashMap<Uuid, Arc<Session>>>,
}

impl SessionStore {
    /// Create a store writing session files under `<data_dir>/sessions`.
    pub fn new(data_dir: PathBuf, timeout_minutes: i64) -> Self {
        Self {
            data_dir,
            timeout_minutes,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn sessions(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, Arc<Session>>>, ChatError> {
        self.sessions
            .lock()
            .map_err(|e| ChatError::Storage(format!("store lock poisoned: {}", e)))
    }

    /// Start a session from an upload: infer the format from the filename,
    /// build the data file, derive the initial schema.
    pub fn start(&self, filename: &str, bytes: &[u8]) -> Result<Arc<Session>, ChatError> {
        let format = DataFormat::from_filename(filename).ok_or_else(|| {
            ChatError::Format(format!(
                "Unsupported file type: {:?} (expected .db, .sqlite, .csv, .tsv, or .xlsx)",
                filename
            ))
        })?;

        let id = Uuid::new_v4();
        let path = self.data_dir.join("sessions").join(format!("{}.db", id));
        let db = SessionDb::create(&path, filename, bytes, format)?;
        let schema = db.schema()?;

        let session = Arc::new(Session::new(id, filename.to_string(), db, schema));
        self.sessions()?.insert(id, Arc::clone(&session));
        info!(session_id = %id, name = %filename, "Session started");
        Ok(session)
    }

    /// Look up a live session. Expired sessions are removed (file deleted)
    /// and reported as not found.
    pub fn get(&self, id: Uuid) -> Result<Arc<Session>, ChatError> {
        let mut sessions = self.sessions()?;
        let session = sessions
            .get(&id)
            .cloned()
            .ok_or(ChatError::SessionNotFound(id))?;
        if session.is_expired(self.timeout_minutes) {
            sessions.remove(&id);
            drop(sessions);
            session.db().delete_file();
            debug!(session_id = %id, "Expired session removed");
            return Err(ChatError::SessionNotFound(id));
        }
        Ok(session)
    }

    /// Remove a session and delete its data file.
    pub fn remove(&self, id: Uuid) -> Result<(), ChatError> {
        let session = self
            .sessions()?
            .remove(&id)
            .ok_or(ChatError::SessionNotFound(id))?;
        session.db().delete_file();
        info!(session_id = %id, "Session removed");
        Ok(())
    }

    /// Summaries of all live sessions.
    pub fn list(&self) -> Vec<SessionSummary> {
        match self.sessions.lock() {
            Ok(sessions) => sessions.values().map(|s| s.summary()).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired session, deleting its file. Returns how many were
    /// removed.
    pub fn sweep_expired(&self) -> usize {
        let expired: Vec<Arc<Session>> = match self.sessions.lock() {
            Ok(mut sessions) => {
                let ids: Vec<Uuid> = sessions
                    .iter()
                    .filter(|(_, s)| s.is_expired(self.timeout_minutes))
                    .map(|(id, _)| *id)
                    .collect();
                ids.iter().filter_map(|id| sessions.remove(id)).collect()
            }
            Err(_) => return 0,
        };
        for session in &expired {
            session.db().delete_file();
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "Expired sessions swept");
        }
        expired.len()
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("data_dir", &self.data_dir)
            .finish()
    }
}
