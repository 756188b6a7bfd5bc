//! Typed failures at the two fallible boundaries: generation and import.

use std::path::PathBuf;

/// Failure of the text-generation collaborator.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("cannot connect to model server at {url}")]
    Connect { url: String },

    #[error("model server error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("model returned an empty response")]
    EmptyResponse,

    #[error("failed to send request: {0}")]
    Transport(String),

    #[error("failed to decode model response: {0}")]
    Decode(String),
}

/// Failure to load a whole data file.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path} must contain a JSON array of rows")]
    NotAnArray { path: PathBuf },

    #[error("cannot tell which domain {path} belongs to")]
    UnknownDomain { path: PathBuf },
}

/// A single row that could not be turned into a record; the row is skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("row {row}: {reason}")]
pub struct RowError {
    /// 1-based row index within the file.
    pub row: usize,
    pub reason: String,
}
