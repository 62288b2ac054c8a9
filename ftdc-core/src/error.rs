//! Error types for the FTDC codec

use thiserror::Error;

/// Result type alias for FTDC operations
pub type Result<T> = std::result::Result<T, FtdcError>;

/// FTDC error types
#[derive(Error, Debug)]
pub enum FtdcError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Sample extracted a different number of metrics than the chunk's reference
    #[error("unexpected schema change detected for sample {sample}: [current={current} vs previous={previous}]")]
    SchemaMismatch {
        sample: usize,
        current: usize,
        previous: usize,
    },

    /// Sample has a metric of a different type at the same position
    #[error("metric type changed at position {index}: [current={current} vs previous={previous}]")]
    TypeMismatch {
        index: usize,
        current: String,
        previous: String,
    },

    /// Add called on a chunk that already holds its maximum number of deltas
    #[error("collector is overfull (max {max} deltas)")]
    Overfull { max: usize },

    /// Resolve called before any sample was added
    #[error("no reference document")]
    NoReference,

    /// Data corruption detected
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Invalid data format
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Compression/decompression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// Document (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Failure recorded by a background worker
    #[error("Background worker error: {0}")]
    Background(String),

    /// Operation aborted by a cancellation signal
    #[error("operation cancelled")]
    Cancelled,
}

impl FtdcError {
    /// Check if error was raised because a sample does not fit the active schema
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            FtdcError::SchemaMismatch { .. } | FtdcError::TypeMismatch { .. }
        )
    }

    /// Check if error indicates a malformed stream
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            FtdcError::Corruption(_)
                | FtdcError::ChecksumMismatch { .. }
                | FtdcError::InvalidFormat(_)
                | FtdcError::Compression(_)
        )
    }
}

impl From<bincode::Error> for FtdcError {
    fn from(e: bincode::Error) -> Self {
        FtdcError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for FtdcError {
    fn from(e: serde_json::Error) -> Self {
        FtdcError::Serialization(e.to_string())
    }
}
