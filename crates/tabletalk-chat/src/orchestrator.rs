//! Chat orchestrator: sequences one request/response cycle.
//!
//! Accept text, translate it against the current schema, execute the
//! statement, update session state, return the completed turn. A linear
//! pipeline; translation and execution failures are recorded as failure
//! turns, never retried.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use tabletalk_core::config::{ChatConfig, LimitsConfig};
use tabletalk_core::error::TabletalkError;
use tabletalk_core::types::{FailureStage, HistoryEntry, Outcome, RowSet};
use tabletalk_llm::Translator;
use tabletalk_store::ingest::quote_identifier;
use tabletalk_store::{affected_table, Execution};

use crate::error::ChatError;
use crate::session::{Session, SessionStore};

/// Coordinates translator, data store, and session state for each message.
pub struct ChatOrchestrator<T: Translator> {
    translator: T,
    store: Arc<SessionStore>,
    chat: ChatConfig,
    limits: LimitsConfig,
}

impl<T: Translator> ChatOrchestrator<T> {
    pub fn new(
        translator: T,
        store: Arc<SessionStore>,
        chat: ChatConfig,
        limits: LimitsConfig,
    ) -> Self {
        Self {
            translator,
            store,
            chat,
            limits,
        }
    }

    /// The session registry this orchestrator serves.
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Process one user message to completion and return the recorded
    /// history entry.
    ///
    /// Exactly one entry is appended per call, success or failure.
    /// `Err` is returned only for request-level problems (bad message,
    /// unknown session) that never reach the pipeline.
    pub async fn handle_message(
        &self,
        session_id: Uuid,
        message: &str,
    ) -> Result<HistoryEntry, ChatError> {
        if message.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if message.chars().count() > self.chat.max_message_chars {
            return Err(ChatError::MessageTooLong(self.chat.max_message_chars));
        }

        let session = self.store.get(session_id)?;

        // One turn at a time per session; concurrent messages queue here.
        let _turn = session.lock_turn().await;
        session.touch()?;

        // Step 1: translate. On failure, record and stop; nothing executes.
        let schema = session.schema()?;
        let sql = match self.translator.translate(message, &schema).await {
            Ok(sql) => sql,
            Err(e) => {
                let message_text = error_detail(e);
                warn!(session_id = %session_id, error = %message_text, "Translation failed");
                return self.record_turn(
                    &session,
                    HistoryEntry::new(
                        message.to_string(),
                        None,
                        Outcome::Failed {
                            stage: FailureStage::Translation,
                            message: message_text,
                        },
                    ),
                );
            }
        };

        // Step 2: execute. On failure, record with the engine's message.
        let outcome = match session.db().execute(&sql, self.limits.max_result_rows) {
            Ok(Execution::Rows(table)) => Outcome::Table { table },
            Ok(Execution::Affected(rows)) => {
                // Step 3: the file changed, so refresh the schema snapshot.
                let schema = session.db().schema()?;
                session.set_schema(schema)?;
                let preview = self.preview_affected(&session, &sql);
                Outcome::Affected { rows, preview }
            }
            Err(e) => {
                let message_text = error_detail(e);
                warn!(session_id = %session_id, error = %message_text, "Execution failed");
                Outcome::Failed {
                    stage: FailureStage::Execution,
                    message: message_text,
                }
            }
        };

        debug!(session_id = %session_id, sql = %sql, "Turn completed");
        self.record_turn(
            &session,
            HistoryEntry::new(message.to_string(), Some(sql), outcome),
        )
    }

    fn record_turn(
        &self,
        session: &Arc<Session>,
        entry: HistoryEntry,
    ) -> Result<HistoryEntry, ChatError> {
        session.record(entry.clone())?;
        Ok(entry)
    }

    /// A short look at the table a write touched. Best effort: a miss on
    /// the table name or the read just means no preview.
    fn preview_affected(&self, session: &Arc<Session>, sql: &str) -> Option<RowSet> {
        let table = affected_table(sql)?;
        let preview_sql = format!(
            "SELECT * FROM {} LIMIT {}",
            quote_identifier(&table),
            self.limits.preview_rows
        );
        match session.db().execute(&preview_sql, self.limits.preview_rows) {
            Ok(Execution::Rows(rows)) if !rows.rows.is_empty() => Some(rows),
            _ => None,
        }
    }
}

impl<T: Translator> std::fmt::Debug for ChatOrchestrator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatOrchestrator").finish()
    }
}

/// Unwrap the subsystem message for display; the variant prefix is noise in
/// a chat turn.
fn error_detail(err: TabletalkError) -> String {
    match err {
        TabletalkError::Translation(msg)
        | TabletalkError::Execution(msg)
        | TabletalkError::Storage(msg) => msg,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabletalk_llm::MockTranslator;

    const CSV: &[u8] = b"id,name,work_mode\n1,alice,remote\n2,bob,hybrid\n3,carol,hybrid\n";

    fn setup(
        translator: MockTranslator,
        dir: &tempfile::TempDir,
    ) -> (ChatOrchestrator<MockTranslator>, Uuid) {
        let store = Arc::new(SessionStore::new(dir.path().to_path_buf(), 60));
        let session = store.start("employees.csv", CSV).unwrap();
        let orch = ChatOrchestrator::new(
            translator,
            store,
            ChatConfig::default(),
            LimitsConfig::default(),
        );
        (orch, session.id)
    }

    fn history_len(orch: &ChatOrchestrator<MockTranslator>, id: Uuid) -> usize {
        let session = orch.store().get(id).unwrap();
        session.snapshot().unwrap().1.len()
    }

    // ---- validation ----

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, id) = setup(MockTranslator::fixed("SELECT 1"), &dir);
        let err = orch.handle_message(id, "   ").await.unwrap_err();
        assert!(matches!(err, ChatError::EmptyMessage));
        assert_eq!(history_len(&orch, id), 0);
    }

    #[tokio::test]
    async fn test_too_long_message_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, id) = setup(MockTranslator::fixed("SELECT 1"), &dir);
        let long = "a".repeat(ChatConfig::default().max_message_chars + 1);
        let err = orch.handle_message(id, &long).await.unwrap_err();
        assert!(matches!(err, ChatError::MessageTooLong(_)));
    }

    #[tokio::test]
    async fn test_unknown_session_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, _) = setup(MockTranslator::fixed("SELECT 1"), &dir);
        let err = orch
            .handle_message(Uuid::new_v4(), "show users")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::SessionNotFound(_)));
    }

    // ---- read turns ----

    #[tokio::test]
    async fn test_read_turn_returns_table() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, id) = setup(
            MockTranslator::fixed("SELECT name FROM employees ORDER BY id"),
            &dir,
        );

        let entry = orch.handle_message(id, "show all employees").await.unwrap();
        assert_eq!(entry.prompt, "show all employees");
        assert_eq!(
            entry.sql.as_deref(),
            Some("SELECT name FROM employees ORDER BY id")
        );
        match &entry.outcome {
            Outcome::Table { table } => {
                assert_eq!(table.columns, vec!["name"]);
                assert_eq!(table.row_count(), 3);
            }
            other => panic!("expected table outcome, got {:?}", other),
        }
        assert_eq!(history_len(&orch, id), 1);
    }

    // ---- write turns ----

    #[tokio::test]
    async fn test_write_turn_reports_affected_and_preview() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, id) = setup(
            MockTranslator::fixed("DELETE FROM employees WHERE work_mode = 'hybrid'"),
            &dir,
        );

        let entry = orch
            .handle_message(id, "delete employees who are working hybrid")
            .await
            .unwrap();
        match &entry.outcome {
            Outcome::Affected { rows, preview } => {
                assert_eq!(*rows, 2);
                let preview = preview.as_ref().expect("preview of remaining rows");
                assert_eq!(preview.row_count(), 1);
            }
            other => panic!("expected affected outcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_write_turn_refreshes_schema() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, id) = setup(MockTranslator::fixed("DROP TABLE employees"), &dir);

        let session = orch.store().get(id).unwrap();
        assert!(!session.schema().unwrap().is_empty());

        let entry = orch.handle_message(id, "drop the table").await.unwrap();
        assert!(matches!(entry.outcome, Outcome::Affected { .. }));
        assert!(session.schema().unwrap().is_empty());
    }

    // ---- translation failure ----

    #[tokio::test]
    async fn test_translation_failure_records_and_skips_execution() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, id) = setup(MockTranslator::failing("service unreachable"), &dir);

        let before = {
            let session = orch.store().get(id).unwrap();
            session.db().serialize().unwrap()
        };

        let entry = orch.handle_message(id, "delete everything").await.unwrap();
        assert!(entry.sql.is_none());
        match &entry.outcome {
            Outcome::Failed { stage, message } => {
                assert_eq!(*stage, FailureStage::Translation);
                assert!(message.contains("service unreachable"));
            }
            other => panic!("expected failed outcome, got {:?}", other),
        }
        assert_eq!(history_len(&orch, id), 1);

        // Nothing executed: the file is untouched.
        let session = orch.store().get(id).unwrap();
        assert_eq!(session.db().serialize().unwrap(), before);
    }

    // ---- execution failure ----

    #[tokio::test]
    async fn test_execution_failure_records_engine_message() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, id) = setup(MockTranslator::fixed("SELECT * FROM no_such_table"), &dir);

        let before = {
            let session = orch.store().get(id).unwrap();
            session.db().serialize().unwrap()
        };

        let entry = orch.handle_message(id, "show the data").await.unwrap();
        assert_eq!(entry.sql.as_deref(), Some("SELECT * FROM no_such_table"));
        match &entry.outcome {
            Outcome::Failed { stage, message } => {
                assert_eq!(*stage, FailureStage::Execution);
                assert!(message.contains("no_such_table"));
            }
            other => panic!("expected failed outcome, got {:?}", other),
        }

        let session = orch.store().get(id).unwrap();
        assert_eq!(session.db().serialize().unwrap(), before);
        assert_eq!(history_len(&orch, id), 1);
    }

    // ---- history growth ----

    #[tokio::test]
    async fn test_history_grows_by_one_per_message() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, id) = setup(
            MockTranslator::sequence(vec![
                Ok("SELECT * FROM employees".to_string()),
                Err("down".to_string()),
                Ok("DELETE FROM employees WHERE id = 1".to_string()),
                Ok("SELECT 1 FROM missing_table".to_string()),
            ]),
            &dir,
        );

        orch.handle_message(id, "one").await.unwrap();
        assert_eq!(history_len(&orch, id), 1);
        orch.handle_message(id, "two").await.unwrap();
        assert_eq!(history_len(&orch, id), 2);
        orch.handle_message(id, "three").await.unwrap();
        assert_eq!(history_len(&orch, id), 3);
        orch.handle_message(id, "four").await.unwrap();
        assert_eq!(history_len(&orch, id), 4);
    }

    #[tokio::test]
    async fn test_history_preserves_order_and_prompts() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, id) = setup(MockTranslator::fixed("SELECT 1"), &dir);

        orch.handle_message(id, "first question").await.unwrap();
        orch.handle_message(id, "second question").await.unwrap();

        let session = orch.store().get(id).unwrap();
        let (_, history) = session.snapshot().unwrap();
        assert_eq!(history[0].prompt, "first question");
        assert_eq!(history[1].prompt, "second question");
    }

    // ---- multi-statement ----

    #[tokio::test]
    async fn test_multi_statement_write_is_atomic_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, id) = setup(
            MockTranslator::fixed("DELETE FROM employees; DELETE FROM no_such_table"),
            &dir,
        );

        orch.handle_message(id, "clean up").await.unwrap();

        // First delete rolled back with the failing batch.
        let session = orch.store().get(id).unwrap();
        match session.db().execute("SELECT COUNT(*) FROM employees", 10) {
            Ok(Execution::Rows(rows)) => assert_eq!(rows.rows[0][0], serde_json::json!(3)),
            other => panic!("expected rows, got {:?}", other),
        }
    }

    // ---- concurrency ----

    #[tokio::test]
    async fn test_concurrent_messages_all_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SessionStore::new(dir.path().to_path_buf(), 60));
        let session = store.start("employees.csv", CSV).unwrap();
        let orch = Arc::new(ChatOrchestrator::new(
            MockTranslator::fixed("SELECT 1"),
            store,
            ChatConfig::default(),
            LimitsConfig::default(),
        ));

        let mut handles = Vec::new();
        for i in 0..8 {
            let orch = Arc::clone(&orch);
            let id = session.id;
            handles.push(tokio::spawn(async move {
                orch.handle_message(id, &format!("message {}", i)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(history_len(&orch, session.id), 8);
    }
}
