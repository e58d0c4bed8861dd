use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Upload formats
// =============================================================================

/// Supported upload formats, inferred from the uploaded filename.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFormat {
    /// An SQLite database file, used verbatim.
    Sqlite,
    /// Comma-separated text, ingested into a single table.
    Csv,
    /// Tab-separated text, ingested into a single table.
    Tsv,
    /// An Excel workbook; the first worksheet is ingested.
    Xlsx,
}

impl DataFormat {
    /// Infer the format from a filename extension.
    pub fn from_filename(name: &str) -> Option<Self> {
        let ext = name.rsplit('.').next()?.to_ascii_lowercase();
        match ext.as_str() {
            "db" | "sqlite" | "sqlite3" => Some(DataFormat::Sqlite),
            "csv" => Some(DataFormat::Csv),
            "tsv" | "tab" => Some(DataFormat::Tsv),
            "xlsx" => Some(DataFormat::Xlsx),
            _ => None,
        }
    }
}

// =============================================================================
// Schema
// =============================================================================

/// One column of a table: name plus the declared SQLite type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

/// One table with its columns, in declaration order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

/// Derived, read-only view of the session database: ordered tables, each
/// with ordered columns. Recomputed after every successful mutation, never
/// edited directly.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub tables: Vec<TableSchema>,
}

impl Schema {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// Render the schema as prompt/sidebar text, one line per table:
    /// ``Table `users` has columns: id (INTEGER), name (TEXT).``
    pub fn describe(&self) -> String {
        self.tables
            .iter()
            .map(|t| {
                let cols = t
                    .columns
                    .iter()
                    .map(|c| {
                        if c.data_type.is_empty() {
                            c.name.clone()
                        } else {
                            format!("{} ({})", c.name, c.data_type)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("Table `{}` has columns: {}.", t.name, cols)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// =============================================================================
// Results and history
// =============================================================================

/// An ordered result table from a read statement.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    /// True when the result was cut off at the configured row cap.
    pub truncated: bool,
}

impl RowSet {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Which pipeline stage a failed turn died in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Translation,
    Execution,
}

/// What a user message produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// A read statement returned rows.
    Table { table: RowSet },
    /// A write statement mutated the data file.
    Affected {
        rows: u64,
        /// A short look at the affected table after the write, when its
        /// name could be recovered from the statement.
        #[serde(skip_serializing_if = "Option::is_none")]
        preview: Option<RowSet>,
    },
    /// Translation or execution failed; the data file is unchanged.
    Failed { stage: FailureStage, message: String },
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }
}

/// One completed chat turn: the prompt, the generated SQL (if translation
/// got that far), and the outcome. Append-only; insertion order is the
/// canonical display order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    pub outcome: Outcome,
}

impl HistoryEntry {
    pub fn new(prompt: String, sql: Option<String>, outcome: Outcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            prompt,
            sql,
            outcome,
        }
    }
}

/// Summary row for the sessions listing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub name: String,
    pub table_count: usize,
    pub history_len: usize,
    pub created_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
}
