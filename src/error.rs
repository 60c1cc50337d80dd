use std::path::PathBuf;
use thiserror::Error;

/// Configuration could not be turned into a [`crate::config::PlaybackConfig`]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// One or more fields are invalid; every violation is listed
    #[error("invalid playback configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that end playback of the current file
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("source file {path} has zero length")]
    EmptyFile { path: PathBuf },

    #[error("column spec `{token}` must be of the form <name>:<type>")]
    MalformedColumn { token: String },

    #[error("column type `{ty}` of `{name}` must be one of str, int, float, bool, timestamp")]
    UnknownColumnType { name: String, ty: String },

    #[error("{path} has no header row")]
    MissingHeader { path: PathBuf },

    #[error("row {row} of {path} has {found} fields, header has {expected}")]
    RowWidth {
        path: PathBuf,
        row: u64,
        found: usize,
        expected: usize,
    },

    #[error("row {row}: `{value}` in column `{column}` is not a valid {ty}")]
    CellType {
        row: u64,
        column: String,
        value: String,
        ty: &'static str,
    },

    #[error("cannot parse timestamp `{value}` with format `{format}`")]
    Timestamp { value: String, format: String },

    /// Null or whitespace-only cells found while NaN reporting is enabled
    #[error("missing or blank values in column `{column}` of {path}")]
    MissingValues { path: PathBuf, column: String },

    #[error("malformed csv in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DecodeError {
    /// Data-quality failures stop the whole engine, not just the file
    pub fn is_data_quality(&self) -> bool {
        matches!(self, DecodeError::MissingValues { .. })
    }
}

/// Engine-level failures
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("data directory {0} does not exist")]
    DirectoryNotFound(PathBuf),

    #[error("failed to list {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("post-processing {path} failed: {source}")]
    PostProcess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, PlaybackError>;
