//! TableTalk HTTP API.
//!
//! Serves the embedded chat page and the JSON endpoints the page talks to:
//! upload, chat messages, schema, history, download, session management.

pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
