//! Error types for Kiln

use std::fmt;

use thiserror::Error;

/// Result type alias using Kiln's Error
pub type Result<T> = std::result::Result<T, Error>;

/// One failed request inside an all-or-nothing download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    /// Requested URL
    pub url: String,
    /// HTTP status, if a response was received at all
    pub status: Option<u16>,
    /// Human-readable cause
    pub reason: String,
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} -> {status} ({})", self.url, self.reason),
            None => write!(f, "{} -> no response ({})", self.url, self.reason),
        }
    }
}

/// Main error type for Kiln operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Size mismatch: declared {expected} bytes, chunks hold {got}")]
    SizeMismatch { expected: usize, got: usize },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Download failed: {}", join_failures(.0))]
    Download(Vec<FetchFailure>),

    #[error("Session invocation failed: {0}")]
    SessionInvocation(String),

    #[error("A generation is already running on this session")]
    GenerationInProgress,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    #[error("Dtype mismatch: expected {expected}, got {got}")]
    DtypeMismatch { expected: String, got: String },

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

fn join_failures(failures: &[FetchFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
