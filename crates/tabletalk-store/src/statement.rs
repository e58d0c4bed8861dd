//! Statement text utilities: splitting, keyword extraction, and recovering
//! the table a write statement touched.
//!
//! None of this is a SQL parser. The splitter respects quoting so that
//! semicolons inside string literals survive; everything else is handed to
//! SQLite, which is the only authority on validity.

use regex::Regex;
use std::sync::OnceLock;

/// Split statement text on `;`, respecting single- and double-quoted
/// sections. Empty fragments are dropped.
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in sql.chars() {
        match quote {
            Some(q) => {
                current.push(ch);
                if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    current.push(ch);
                }
                ';' => {
                    if !current.trim().is_empty() {
                        statements.push(current.trim().to_string());
                    }
                    current.clear();
                }
                _ => current.push(ch),
            },
        }
    }

    if !current.trim().is_empty() {
        statements.push(current.trim().to_string());
    }
    statements
}

/// Best-effort extraction of the table name a statement operates on.
///
/// Looks for an identifier after FROM / INTO / UPDATE / TABLE. Used only
/// to build the post-write preview; a miss just means no preview.
pub fn affected_table(sql: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"(?i)\b(?:from|into|update|table)\s+(?:if\s+(?:not\s+)?exists\s+)?[`"\[]?([A-Za-z_][A-Za-z0-9_]*)"#)
            .unwrap()
    });
    re.captures(sql).map(|c| c[1].to_string())
}
