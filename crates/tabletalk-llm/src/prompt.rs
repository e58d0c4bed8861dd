//! Prompt construction and response shaping.
//!
//! The system prompt embeds the schema description and a couple of
//! few-shot examples; the response cleanup strips the markdown wrappers
//! models add despite being told not to.

use tabletalk_core::types::Schema;

/// Statement keywords the shape check accepts as a first word.
const STATEMENT_KEYWORDS: &[&str] = &[
    "SELECT", "WITH", "VALUES", "INSERT", "UPDATE", "DELETE", "CREATE", "DROP", "ALTER",
    "REPLACE", "PRAGMA", "EXPLAIN", "VACUUM",
];

/// Build the system prompt for the translation request.
pub fn build_system_prompt(schema: &Schema) -> String {
    format!(
        "You are an expert at writing SQLite queries.\n\
         \n\
         The SQL database has the following schema:\n\
         \n\
         {}\n\
         \n\
         Examples:\n\
         - Delete all customers from Germany.\n\
           DELETE FROM Customer WHERE Country = 'Germany';\n\
         \n\
         - Add a new genre called Synthwave.\n\
           INSERT INTO Genre (Name) VALUES ('Synthwave');\n\
         \n\
         Only return the SQL statement. Do not include ``` or the word 'sql'.",
        schema.describe()
    )
}

/// Strip markdown code fences and a leading `sql` tag from a model
/// response.
pub fn clean_response(raw: &str) -> String {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        // The fence line may carry a language tag; drop the whole line.
        text = match rest.find('\n') {
            Some(idx) => &rest[idx + 1..],
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
        };
        text = text.trim_end();
        text = text.strip_suffix("```").unwrap_or(text);
        text = text.trim();
    }

    // A bare "sql" tag sometimes survives outside the fence.
    if text.len() > 3 && text[..3].eq_ignore_ascii_case("sql") {
        let after = &text[3..];
        if matches!(after.chars().next(), Some(' ' | '\n' | '\t' | ':')) {
            text = after.trim_start_matches(|c: char| c.is_whitespace() || c == ':');
        }
    }

    text.trim().to_string()
}

/// Best-effort check that cleaned text resembles a SQL statement.
///
/// This is a filter against prose, refusals, and empty responses, not a
/// parser. The engine remains the only authority on validity.
pub fn looks_like_statement(text: &str) -> bool {
    let first: String = text
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if first.is_empty() {
        return false;
    }
    let upper = first.to_ascii_uppercase();
    STATEMENT_KEYWORDS.contains(&upper.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabletalk_core::types::{ColumnInfo, TableSchema};

    fn schema() -> Schema {
        Schema {
            tables: vec![TableSchema {
                name: "users".to_string(),
                columns: vec![ColumnInfo {
                    name: "id".to_string(),
                    data_type: "INTEGER".to_string(),
                }],
            }],
        }
    }

    // ---- build_system_prompt ----

    #[test]
    fn test_prompt_embeds_schema() {
        let prompt = build_system_prompt(&schema());
        assert!(prompt.contains("Table `users` has columns: id (INTEGER)."));
        assert!(prompt.contains("Only return the SQL statement"));
    }

    #[test]
    fn test_prompt_for_empty_schema() {
        let prompt = build_system_prompt(&Schema::default());
        assert!(prompt.contains("following schema"));
    }

    // ---- clean_response ----

    #[test]
    fn test_clean_plain_statement() {
        assert_eq!(clean_response("SELECT 1"), "SELECT 1");
        assert_eq!(clean_response("  SELECT 1  \n"), "SELECT 1");
    }

    #[test]
    fn test_clean_fenced_with_language_tag() {
        let raw = "```sql\nSELECT * FROM users;\n```";
        assert_eq!(clean_response(raw), "SELECT * FROM users;");
    }

    #[test]
    fn test_clean_fenced_without_language_tag() {
        let raw = "```\nDELETE FROM t\n```";
        assert_eq!(clean_response(raw), "DELETE FROM t");
    }

    #[test]
    fn test_clean_bare_sql_tag() {
        assert_eq!(clean_response("sql\nSELECT 1"), "SELECT 1");
        assert_eq!(clean_response("SQL: SELECT 1"), "SELECT 1");
    }

    #[test]
    fn test_clean_does_not_eat_sqlite_master() {
        // "sqlite_master" starts with "sql" but is not a tag.
        let raw = "sqlite_master";
        assert_eq!(clean_response(raw), "sqlite_master");
    }

    #[test]
    fn test_clean_empty_fence() {
        assert_eq!(clean_response("```sql\n```"), "");
    }

    // ---- looks_like_statement ----

    #[test]
    fn test_statement_shapes_accepted() {
        assert!(looks_like_statement("SELECT * FROM users"));
        assert!(looks_like_statement("delete from users where id = 1"));
        assert!(looks_like_statement("WITH t AS (SELECT 1) SELECT * FROM t"));
        assert!(looks_like_statement("  INSERT INTO t VALUES (1)"));
        assert!(looks_like_statement("PRAGMA table_info(users)"));
    }

    #[test]
    fn test_prose_rejected() {
        assert!(!looks_like_statement(
            "I cannot help with that request."
        ));
        assert!(!looks_like_statement(
            "Here is the query you asked for: SELECT 1"
        ));
        assert!(!looks_like_statement("Sorry, no such table exists."));
    }

    #[test]
    fn test_empty_and_punctuation_rejected() {
        assert!(!looks_like_statement(""));
        assert!(!looks_like_statement("   "));
        assert!(!looks_like_statement("```"));
        assert!(!looks_like_statement("-- nothing"));
    }

    #[test]
    fn test_cleaned_fenced_response_passes() {
        let cleaned = clean_response("```sql\nSELECT name FROM users\n```");
        assert!(looks_like_statement(&cleaned));
    }
}
