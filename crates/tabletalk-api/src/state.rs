//! Application state shared across all route handlers.
//!
//! AppState holds the configuration, the session store, and the chat
//! orchestrator. It is passed to handlers via axum's State extractor.

use std::sync::Arc;
use std::time::Instant;

use tabletalk_chat::{ChatOrchestrator, SessionStore};
use tabletalk_core::config::TabletalkConfig;
use tabletalk_llm::DynTranslator;

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks. The
/// translator is boxed so tests can substitute a mock.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration (read-only after startup).
    pub config: Arc<TabletalkConfig>,
    /// Session registry (data files, schemas, histories).
    pub store: Arc<SessionStore>,
    /// The message pipeline: translate, execute, record.
    pub orchestrator: Arc<ChatOrchestrator<Box<dyn DynTranslator>>>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Create a new AppState wiring the given translator to a fresh
    /// orchestrator over `store`.
    pub fn new(
        config: TabletalkConfig,
        store: Arc<SessionStore>,
        translator: Box<dyn DynTranslator>,
    ) -> Self {
        let orchestrator = Arc::new(ChatOrchestrator::new(
            translator,
            Arc::clone(&store),
            config.chat.clone(),
            config.limits.clone(),
        ));
        Self {
            config: Arc::new(config),
            store,
            orchestrator,
            start_time: Instant::now(),
        }
    }
}
