//! Read-only schema and header extraction.
//!
//! Pure helpers that describe uploaded relational/tabular files so the
//! generation prompts can reference real table and column names instead of
//! inventing them.

use std::path::Path;

use augur_core::error::{AugurError, Result};
use augur_core::upload::{FileIndex, SchemaHint, SchemaHints};
use rusqlite::{Connection, OpenFlags};

/// Extracts table and column descriptions from a SQLite database.
///
/// Each table maps to `"column (TYPE)"` entries via `PRAGMA table_info`.
pub fn sqlite_schema(path: &Path) -> Result<Vec<(String, Vec<String>)>> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| AugurError::io(format!("failed to open SQLite db: {e}")))?;

    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'")
        .map_err(|e| AugurError::io(format!("failed to list tables: {e}")))?;
    let tables: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| AugurError::io(format!("failed to list tables: {e}")))?
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| AugurError::io(format!("failed to list tables: {e}")))?;

    let mut schema = Vec::with_capacity(tables.len());
    for table in tables {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info('{}')", table.replace('\'', "''")))
            .map_err(|e| AugurError::io(format!("failed to read table info: {e}")))?;
        let columns: Vec<String> = stmt
            .query_map([], |row| {
                let name: String = row.get(1)?;
                let column_type: String = row.get(2)?;
                Ok(format!("{name} ({column_type})"))
            })
            .map_err(|e| AugurError::io(format!("failed to read table info: {e}")))?
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| AugurError::io(format!("failed to read table info: {e}")))?;
        schema.push((table, columns));
    }
    Ok(schema)
}

/// Reads the header row of a CSV file.
pub fn csv_headers(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| AugurError::io(format!("failed to open CSV: {e}")))?;

    let headers = reader
        .headers()
        .map_err(|e| AugurError::io(format!("failed to read CSV headers: {e}")))?;

    Ok(headers
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect())
}

/// Runs both extractors over the index, keyed by file extension.
///
/// Per-file failures are recorded as notes instead of aborting; a file the
/// helpers cannot read is still worth mentioning in the prompt.
pub fn collect_schema_hints(index: &FileIndex) -> SchemaHints {
    let mut hints = SchemaHints::new();
    for (name, path) in index.iter() {
        match path.extension().and_then(|e| e.to_str()) {
            Some("db") | Some("sqlite") | Some("sqlite3") => match sqlite_schema(path) {
                Ok(schema) => hints.insert(name, SchemaHint::Sqlite(schema)),
                Err(e) => {
                    tracing::warn!(file = name, error = %e, "schema extraction failed");
                    hints.insert(name, SchemaHint::Unreadable(format!("could not read schema: {e}")));
                }
            },
            Some("csv") => match csv_headers(path) {
                Ok(headers) => hints.insert(name, SchemaHint::CsvHeaders(headers)),
                Err(e) => {
                    tracing::warn!(file = name, error = %e, "header extraction failed");
                    hints.insert(name, SchemaHint::Unreadable(format!("could not read headers: {e}")));
                }
            },
            _ => {}
        }
    }
    hints
}
