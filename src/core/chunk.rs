use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One decoded CSV row, keyed by column name in column order
pub type Row = Map<String, Value>;

/// The file a chunk was decoded from
#[derive(Debug, Clone, PartialEq)]
pub struct FileContext {
    /// Path of the source file
    pub path: PathBuf,

    /// Increments every time a file is opened (including replays), so
    /// per-file timestamp state can be reset by the consumer
    pub generation: u64,

    /// Folded header rows, stamped into every reading of the file
    pub metadata: Option<Row>,
}

impl FileContext {
    pub fn new(path: impl Into<PathBuf>, generation: u64, metadata: Option<Row>) -> Self {
        Self {
            path: path.into(),
            generation,
            metadata,
        }
    }
}

/// A batch of rows handed from the decoder to the emitter
///
/// Chunks are moved, never shared: whoever holds one owns it.
#[derive(Debug, Clone)]
pub struct Chunk {
    rows: Vec<Row>,
    source: Arc<FileContext>,
}

impl Chunk {
    pub fn new(rows: Vec<Row>, source: Arc<FileContext>) -> Self {
        Self { rows, source }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn source(&self) -> &Arc<FileContext> {
        &self.source
    }

    pub fn path(&self) -> &Path {
        &self.source.path
    }

    /// Column names of the first row
    pub fn columns(&self) -> Vec<&str> {
        self.rows
            .first()
            .map(|row| row.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn into_parts(self) -> (Vec<Row>, Arc<FileContext>) {
        (self.rows, self.source)
    }
}

/// True for cells the NaN check rejects: nulls and whitespace-only strings
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}
