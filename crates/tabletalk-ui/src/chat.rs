//! Chat page HTML generation and embedding.
//!
//! The TableTalk UI is a single self-contained HTML file with all CSS and
//! JavaScript inlined. It provides the upload screen, the chat transcript
//! with generated SQL and result tables, the schema sidebar, the recent
//! actions list, and the database download action.
//!
//! The HTML is embedded at compile time via `include_str!` so the binary
//! has no external file dependencies at runtime.

/// The complete self-contained chat page HTML.
///
/// A single HTML file with CSS in `<style>` tags and JavaScript in
/// `<script>` tags, with no CDN links, no npm packages, no build step. It talks
/// to the TableTalk API on the same origin:
///
/// - `POST /sessions?name=...` to upload a data file
/// - `POST /sessions/{id}/messages` to send a chat message
/// - `GET  /sessions/{id}/schema` for the sidebar
/// - `GET  /sessions/{id}/history` for recent actions
/// - `GET  /sessions/{id}/download` for the updated database file
pub const CHAT_HTML: &str = include_str!("../assets/chat.html");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_html_is_not_empty() {
        assert!(!CHAT_HTML.is_empty());
    }

    #[test]
    fn chat_html_is_valid_html() {
        assert!(CHAT_HTML.starts_with("<!DOCTYPE html>"));
        assert!(CHAT_HTML.contains("<html"));
        assert!(CHAT_HTML.contains("</html>"));
    }

    #[test]
    fn chat_html_contains_main_views() {
        assert!(CHAT_HTML.contains("id=\"upload-view\""));
        assert!(CHAT_HTML.contains("id=\"chat-view\""));
        assert!(CHAT_HTML.contains("id=\"transcript\""));
        assert!(CHAT_HTML.contains("id=\"schema-list\""));
        assert!(CHAT_HTML.contains("id=\"actions-list\""));
        assert!(CHAT_HTML.contains("id=\"download-link\""));
    }

    #[test]
    fn chat_html_has_embedded_css_and_js() {
        assert!(CHAT_HTML.contains("<style>"));
        assert!(CHAT_HTML.contains("</style>"));
        assert!(CHAT_HTML.contains("<script>"));
        assert!(CHAT_HTML.contains("</script>"));
    }

    #[test]
    fn chat_html_references_api_routes() {
        assert!(CHAT_HTML.contains("/sessions"));
        assert!(CHAT_HTML.contains("/messages"));
        assert!(CHAT_HTML.contains("/download"));
    }
}
