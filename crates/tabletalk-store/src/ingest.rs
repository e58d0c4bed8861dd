//! Tabular upload ingestion: CSV/TSV and XLSX bytes become a single SQLite
//! table named after the uploaded file.
//!
//! The first row is the header. Column types are inferred by scanning the
//! data (INTEGER widens to REAL widens to TEXT); empty cells become NULL.
//! Identifiers are sanitized so arbitrary spreadsheet headers cannot break
//! the generated DDL.

use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};
use rusqlite::{params_from_iter, types::Value, Connection};
use tracing::debug;

use tabletalk_core::error::TabletalkError;

/// Inferred SQLite column affinity, in widening order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ColType {
    Integer,
    Real,
    Text,
}

impl ColType {
    fn name(self) -> &'static str {
        match self {
            ColType::Integer => "INTEGER",
            ColType::Real => "REAL",
            ColType::Text => "TEXT",
        }
    }

    /// Widen this type to also accommodate `value`.
    fn widen(self, value: &str) -> ColType {
        match self {
            ColType::Text => ColType::Text,
            ColType::Real => {
                if value.parse::<f64>().is_ok() {
                    ColType::Real
                } else {
                    ColType::Text
                }
            }
            ColType::Integer => {
                if value.parse::<i64>().is_ok() {
                    ColType::Integer
                } else if value.parse::<f64>().is_ok() {
                    ColType::Real
                } else {
                    ColType::Text
                }
            }
        }
    }
}

/// Turn an arbitrary header or filename stem into a safe SQLite identifier.
///
/// Non-alphanumeric characters collapse to `_`; a leading digit gets a `c_`
/// prefix; empty input falls back to `col`.
pub fn sanitize_identifier(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_underscore = false;
    for ch in raw.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            last_underscore = false;
        } else if !last_underscore && !out.is_empty() {
            out.push('_');
            last_underscore = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    if out.is_empty() {
        return "col".to_string();
    }
    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return format!("c_{}", out);
    }
    out
}

/// Table name for an uploaded file: the sanitized filename stem.
pub fn table_name_from_filename(filename: &str) -> String {
    let stem = std::path::Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("data");
    let name = sanitize_identifier(stem);
    if name == "col" {
        "data".to_string()
    } else {
        name
    }
}

/// Double-quote an identifier for use in generated SQL.
pub fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Sanitize a header row and deduplicate collisions with numeric suffixes.
fn header_columns(raw: &[String]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(raw.len());
    for (i, h) in raw.iter().enumerate() {
        let mut name = sanitize_identifier(h);
        if name == "col" {
            name = format!("col_{}", i + 1);
        }
        let base = name.clone();
        let mut suffix = 2;
        while seen.iter().any(|s| s == &name) {
            name = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        seen.push(name);
    }
    seen
}

/// Infer a type per column from the data rows.
fn infer_types(column_count: usize, rows: &[Vec<String>]) -> Vec<ColType> {
    let mut types = vec![ColType::Integer; column_count];
    let mut nonempty = vec![false; column_count];
    for row in rows {
        for (i, value) in row.iter().enumerate().take(column_count) {
            if value.trim().is_empty() {
                continue;
            }
            nonempty[i] = true;
            types[i] = types[i].widen(value.trim());
        }
    }
    // A column with no data at all carries no type evidence.
    for (i, seen) in nonempty.iter().enumerate() {
        if !seen {
            types[i] = ColType::Text;
        }
    }
    types
}

/// Create `table` from header + rows and bulk-insert everything in one
/// transaction.
fn create_and_fill(
    conn: &mut Connection,
    table: &str,
    header: &[String],
    rows: &[Vec<String>],
) -> Result<(), TabletalkError> {
    if header.is_empty() {
        return Err(TabletalkError::Format(
            "upload has no header row".to_string(),
        ));
    }

    let columns = header_columns(header);
    let types = infer_types(columns.len(), rows);

    let col_defs = columns
        .iter()
        .zip(&types)
        .map(|(c, t)| format!("{} {}", quote_identifier(c), t.name()))
        .collect::<Vec<_>>()
        .join(", ");
    let create_sql = format!(
        "CREATE TABLE {} ({})",
        quote_identifier(table),
        col_defs
    );

    let placeholders = (1..=columns.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let insert_sql = format!(
        "INSERT INTO {} VALUES ({})",
        quote_identifier(table),
        placeholders
    );

    let tx = conn
        .transaction()
        .map_err(|e| TabletalkError::Storage(format!("Failed to begin ingest: {}", e)))?;
    tx.execute(&create_sql, [])
        .map_err(|e| TabletalkError::Format(format!("Failed to create table: {}", e)))?;
    {
        let mut stmt = tx
            .prepare(&insert_sql)
            .map_err(|e| TabletalkError::Storage(format!("Failed to prepare insert: {}", e)))?;
        for row in rows {
            let values: Vec<Value> = (0..columns.len())
                .map(|i| cell_value(row.get(i).map(String::as_str).unwrap_or(""), types[i]))
                .collect();
            stmt.execute(params_from_iter(values)).map_err(|e| {
                TabletalkError::Format(format!("Failed to insert row: {}", e))
            })?;
        }
    }
    tx.commit()
        .map_err(|e| TabletalkError::Storage(format!("Failed to commit ingest: {}", e)))?;

    debug!(table = %table, rows = rows.len(), "Tabular upload ingested");
    Ok(())
}

/// Convert one cell to a typed SQLite value. Empty cells are NULL.
fn cell_value(raw: &str, col_type: ColType) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    match col_type {
        ColType::Integer => trimmed
            .parse::<i64>()
            .map(Value::Integer)
            .unwrap_or_else(|_| Value::Text(trimmed.to_string())),
        ColType::Real => trimmed
            .parse::<f64>()
            .map(Value::Real)
            .unwrap_or_else(|_| Value::Text(trimmed.to_string())),
        ColType::Text => Value::Text(trimmed.to_string()),
    }
}

/// Ingest delimited text (CSV or TSV) into `table`.
pub fn ingest_delimited(
    conn: &mut Connection,
    table: &str,
    bytes: &[u8],
    delimiter: u8,
) -> Result<(), TabletalkError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(bytes);

    let header: Vec<String> = reader
        .headers()
        .map_err(|e| TabletalkError::Format(format!("Unreadable header row: {}", e)))?
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| TabletalkError::Format(format!("Unreadable row: {}", e)))?;
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }

    create_and_fill(conn, table, &header, &rows)
}

/// Ingest the first worksheet of an XLSX workbook into `table`.
pub fn ingest_xlsx(
    conn: &mut Connection,
    table: &str,
    bytes: &[u8],
) -> Result<(), TabletalkError> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook: Xlsx<_> = Xlsx::new(cursor)
        .map_err(|e| TabletalkError::Format(format!("Not a readable workbook: {}", e)))?;

    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| TabletalkError::Format("Workbook has no worksheets".to_string()))?;

    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| TabletalkError::Format(format!("Unreadable worksheet: {}", e)))?;

    let mut rows_iter = range.rows();
    let header: Vec<String> = rows_iter
        .next()
        .ok_or_else(|| TabletalkError::Format("Worksheet is empty".to_string()))?
        .iter()
        .map(cell_to_string)
        .collect();

    let rows: Vec<Vec<String>> = rows_iter
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect();

    create_and_fill(conn, table, &header, &rows)
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => (*b as i64).to_string(),
        other => other.to_string(),
    }
}
