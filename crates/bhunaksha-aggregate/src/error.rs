//! Aggregation error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while summarizing harvested tables.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// A village file name is not `"<code> <name>"`
    #[error("Unexpected village file name: {}", .0.display())]
    InvalidFileName(PathBuf),

    /// The district root is missing or not a folder
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed table
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type alias using `AggregateError`.
pub type Result<T> = std::result::Result<T, AggregateError>;
