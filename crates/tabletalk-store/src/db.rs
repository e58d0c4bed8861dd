//! Per-session database management.
//!
//! Each session owns one SQLite file. The connection is wrapped in a Mutex
//! (rusqlite Connection is not Sync) and the file stays in rollback-journal
//! mode so the on-disk bytes are a complete, consistent database between
//! statements; `serialize` is then a plain file read that round-trips with
//! `create`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::types::ValueRef;
use rusqlite::Connection;
use tracing::{debug, info};

use tabletalk_core::error::TabletalkError;
use tabletalk_core::types::{ColumnInfo, DataFormat, RowSet, Schema, TableSchema};

use crate::ingest;

/// Result of executing statement text against a session database.
#[derive(Clone, Debug, PartialEq)]
pub enum Execution {
    /// The last statement was a read; these are its rows.
    Rows(RowSet),
    /// Only writes ran; total affected-row count across the batch.
    Affected(u64),
}

/// A session's SQLite data file plus its connection.
pub struct SessionDb {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl SessionDb {
    /// Create a session database at `path` from uploaded bytes.
    ///
    /// SQLite uploads are written verbatim and validated by querying
    /// `sqlite_master`. Tabular uploads are ingested into a single table
    /// named after the file stem. Fails with a Format error when the bytes
    /// cannot be parsed for the claimed format.
    pub fn create(
        path: &Path,
        filename: &str,
        bytes: &[u8],
        format: DataFormat,
    ) -> Result<Self, TabletalkError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = match format {
            DataFormat::Sqlite => {
                std::fs::write(path, bytes)?;
                match validate_sqlite_upload(path) {
                    Ok(conn) => conn,
                    Err(e) => {
                        let _ = std::fs::remove_file(path);
                        return Err(e);
                    }
                }
            }
            DataFormat::Csv | DataFormat::Tsv | DataFormat::Xlsx => {
                let mut conn = open_session_conn(path)?;
                let table = ingest::table_name_from_filename(filename);
                let result = match format {
                    DataFormat::Csv => ingest::ingest_delimited(&mut conn, &table, bytes, b','),
                    DataFormat::Tsv => ingest::ingest_delimited(&mut conn, &table, bytes, b'\t'),
                    DataFormat::Xlsx => ingest::ingest_xlsx(&mut conn, &table, bytes),
                    DataFormat::Sqlite => unreachable!(),
                };
                if let Err(e) = result {
                    drop(conn);
                    let _ = std::fs::remove_file(path);
                    return Err(e);
                }
                conn
            }
        };

        info!(path = %path.display(), format = ?format, "Session database created");

        Ok(Self {
            path: path.to_path_buf(),
            conn: Mutex::new(conn),
        })
    }

    /// The on-disk location of this session's data file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Execute a closure with exclusive access to the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, TabletalkError>
    where
        F: FnOnce(&mut Connection) -> Result<T, TabletalkError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| TabletalkError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Introspect the current schema: tables in definition order, each with
    /// columns in declaration order. Internal `sqlite_*` tables are hidden.
    pub fn schema(&self) -> Result<Schema, TabletalkError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT name FROM sqlite_master
                     WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
                )
                .map_err(storage_err)?;
            let names: Vec<String> = stmt
                .query_map([], |row| row.get(0))
                .map_err(storage_err)?
                .collect::<Result<_, _>>()
                .map_err(storage_err)?;
            drop(stmt);

            let mut tables = Vec::with_capacity(names.len());
            for name in names {
                let pragma = format!(
                    "PRAGMA table_info({})",
                    ingest::quote_identifier(&name)
                );
                let mut stmt = conn.prepare(&pragma).map_err(storage_err)?;
                let columns: Vec<ColumnInfo> = stmt
                    .query_map([], |row| {
                        Ok(ColumnInfo {
                            name: row.get(1)?,
                            data_type: row.get(2)?,
                        })
                    })
                    .map_err(storage_err)?
                    .collect::<Result<_, _>>()
                    .map_err(storage_err)?;
                tables.push(TableSchema { name, columns });
            }

            Ok(Schema { tables })
        })
    }

    /// Execute statement text against the data file.
    ///
    /// The text is split into statements (the translator occasionally
    /// returns more than one); they all run inside a single transaction so
    /// a failure anywhere leaves the file byte-identical. A statement that
    /// returns columns is collected as rows (capped at `max_rows`); the
    /// result is the last read's rows, or the summed affected count when
    /// only writes ran. Errors carry the engine's message; the caller must
    /// not retry automatically.
    pub fn execute(&self, sql: &str, max_rows: usize) -> Result<Execution, TabletalkError> {
        let statements = crate::statement::split_statements(sql);
        if statements.is_empty() {
            return Err(TabletalkError::Execution(
                "empty statement".to_string(),
            ));
        }

        self.with_conn(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| TabletalkError::Execution(e.to_string()))?;

            let mut last_rows: Option<RowSet> = None;
            let mut affected: u64 = 0;

            for text in &statements {
                let mut stmt = tx
                    .prepare(text)
                    .map_err(|e| TabletalkError::Execution(e.to_string()))?;
                if stmt.column_count() > 0 {
                    last_rows = Some(collect_rows(&mut stmt, max_rows)?);
                } else {
                    affected += stmt
                        .execute([])
                        .map_err(|e| TabletalkError::Execution(e.to_string()))?
                        as u64;
                    last_rows = None;
                }
            }

            tx.commit()
                .map_err(|e| TabletalkError::Execution(e.to_string()))?;

            debug!(statements = statements.len(), affected, "Statement batch executed");

            Ok(match last_rows {
                Some(rows) => Execution::Rows(rows),
                None => Execution::Affected(affected),
            })
        })
    }

    /// The current on-disk bytes of the data file. Round-trips with
    /// [`SessionDb::create`].
    pub fn serialize(&self) -> Result<Vec<u8>, TabletalkError> {
        // Hold the lock so no statement commits mid-read.
        self.with_conn(|_conn| Ok(std::fs::read(&self.path)?))
    }

    /// Remove the data file from disk. Called when the session ends.
    pub fn delete_file(&self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!(path = %self.path.display(), error = %e, "Session file removal failed");
        }
    }
}

impl std::fmt::Debug for SessionDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionDb").field("path", &self.path).finish()
    }
}

/// Open a just-uploaded `.db` file and prove the bytes are a database.
///
/// Opening is lazy; the pragma batch and the `sqlite_master` query are what
/// actually touch the file, so any corruption surfaces here as a Format
/// error.
fn validate_sqlite_upload(path: &Path) -> Result<Connection, TabletalkError> {
    let conn = Connection::open(path)
        .map_err(|e| TabletalkError::Format(format!("Not an SQLite database: {}", e)))?;
    conn.execute_batch(
        "PRAGMA journal_mode = DELETE;
         PRAGMA synchronous = FULL;
         PRAGMA foreign_keys = ON;",
    )
    .map_err(|e| TabletalkError::Format(format!("Not an SQLite database: {}", e)))?;
    conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |r| {
        r.get::<_, i64>(0)
    })
    .map_err(|e| TabletalkError::Format(format!("Not an SQLite database: {}", e)))?;
    Ok(conn)
}

fn open_session_conn(path: &Path) -> Result<Connection, TabletalkError> {
    let conn = Connection::open(path)
        .map_err(|e| TabletalkError::Storage(format!("Failed to open database: {}", e)))?;
    // Rollback journal (not WAL) keeps all data in the main file so
    // downloads never miss uncheckpointed pages.
    conn.execute_batch(
        "PRAGMA journal_mode = DELETE;
         PRAGMA synchronous = FULL;
         PRAGMA foreign_keys = ON;",
    )
    .map_err(|e| TabletalkError::Storage(format!("Failed to set pragmas: {}", e)))?;
    Ok(conn)
}

fn storage_err(e: rusqlite::Error) -> TabletalkError {
    TabletalkError::Storage(e.to_string())
}

/// Drain a prepared read statement into a RowSet, capped at `max_rows`.
fn collect_rows(
    stmt: &mut rusqlite::Statement<'_>,
    max_rows: usize,
) -> Result<RowSet, TabletalkError> {
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let ncols = columns.len();

    let mut rows = Vec::new();
    let mut truncated = false;
    let mut query = stmt
        .query([])
        .map_err(|e| TabletalkError::Execution(e.to_string()))?;
    while let Some(row) = query
        .next()
        .map_err(|e| TabletalkError::Execution(e.to_string()))?
    {
        if rows.len() >= max_rows {
            truncated = true;
            break;
        }
        let mut values = Vec::with_capacity(ncols);
        for i in 0..ncols {
            let value = row
                .get_ref(i)
                .map_err(|e| TabletalkError::Execution(e.to_string()))?;
            values.push(json_value(value));
        }
        rows.push(values);
    }

    Ok(RowSet {
        columns,
        rows,
        truncated,
    })
}

fn json_value(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::Value::String(
            b.iter().map(|byte| format!("{:02x}", byte)).collect::<String>(),
        ),
    }
}
