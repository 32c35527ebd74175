//! Uploaded-file index and schema hints.
//!
//! These types describe the inputs a pipeline run was given: which files the
//! exterior request layer saved, and what structure could be read out of the
//! relational/tabular ones. Both are passed opaquely into generation prompts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One uploaded file as received from the exterior request layer.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Field/file name under which the upload arrived.
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Ordered mapping from field/file name to the saved filesystem path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileIndex {
    entries: Vec<(String, PathBuf)>,
}

impl FileIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        self.entries.push((name.into(), path.into()));
    }

    pub fn first(&self) -> Option<(&str, &Path)> {
        self.entries
            .first()
            .map(|(n, p)| (n.as_str(), p.as_path()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.entries.iter().map(|(n, p)| (n.as_str(), p.as_path()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Renders the index as `name: path` lines for inclusion in a prompt.
    pub fn to_prompt_lines(&self) -> String {
        self.entries
            .iter()
            .map(|(n, p)| format!("{}: {}", n, p.display()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Per-file structure description extracted by read-only helpers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaHint {
    /// SQLite: table name to `"column (TYPE)"` entries.
    Sqlite(Vec<(String, Vec<String>)>),
    /// CSV: the header row.
    CsvHeaders(Vec<String>),
    /// Extraction failed; the note is still useful prompt context.
    Unreadable(String),
}

/// Optional structure descriptions keyed by file name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaHints {
    entries: Vec<(String, SchemaHint)>,
}

impl SchemaHints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, hint: SchemaHint) {
        self.entries.push((name.into(), hint));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SchemaHint)> {
        self.entries.iter().map(|(n, h)| (n.as_str(), h))
    }

    /// Renders the hints as readable text for inclusion in a prompt.
    pub fn to_prompt_text(&self) -> String {
        let mut out = String::new();
        for (name, hint) in self.iter() {
            match hint {
                SchemaHint::Sqlite(tables) => {
                    out.push_str(&format!("{name} (SQLite):\n"));
                    for (table, columns) in tables {
                        out.push_str(&format!("  table {}: {}\n", table, columns.join(", ")));
                    }
                }
                SchemaHint::CsvHeaders(headers) => {
                    out.push_str(&format!("{name} (CSV headers): {}\n", headers.join(", ")));
                }
                SchemaHint::Unreadable(note) => {
                    out.push_str(&format!("{name}: {note}\n"));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_index_preserves_insertion_order() {
        let mut index = FileIndex::new();
        index.insert("b.csv", "/tmp/b.csv");
        index.insert("a.csv", "/tmp/a.csv");

        let names: Vec<_> = index.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b.csv", "a.csv"]);
        assert_eq!(index.first().unwrap().0, "b.csv");
    }

    #[test]
    fn test_schema_hints_prompt_text() {
        let mut hints = SchemaHints::new();
        hints.insert(
            "sales.db",
            SchemaHint::Sqlite(vec![(
                "orders".to_string(),
                vec!["id (INTEGER)".to_string(), "total (REAL)".to_string()],
            )]),
        );
        hints.insert(
            "data.csv",
            SchemaHint::CsvHeaders(vec!["x".to_string(), "y".to_string()]),
        );

        let text = hints.to_prompt_text();
        assert!(text.contains("table orders: id (INTEGER), total (REAL)"));
        assert!(text.contains("data.csv (CSV headers): x, y"));
    }
}
