//! TableTalk storage crate - the data store adapter.
//!
//! Wraps a per-session SQLite file: upload ingestion (SQLite passthrough,
//! CSV/TSV, XLSX), schema introspection, statement execution with
//! transactional write batches, and byte serialization for download.

pub mod db;
pub mod ingest;
pub mod statement;

pub use db::{Execution, SessionDb};
pub use statement::{affected_table, split_statements};
