//! Error types for the chat pipeline.

use tabletalk_core::error::TabletalkError;

/// Errors from session management and message handling.
///
/// Translation and execution failures are NOT errors at this level: they
/// become failure history entries and flow back to the user as chat turns.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("session not found: {0}")]
    SessionNotFound(uuid::Uuid),
    #[error("format error: {0}")]
    Format(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<TabletalkError> for ChatError {
    fn from(err: TabletalkError) -> Self {
        match err {
            TabletalkError::Format(msg) => ChatError::Format(msg),
            other => ChatError::Storage(other.to_string()),
        }
    }
}
