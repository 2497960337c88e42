//! # Centralized Error Handling
//!
//! Unified error types for the entire crate using `thiserror`.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for hapcall operations
#[derive(Error, Debug)]
pub enum HapError {
    /// I/O errors (file missing, permission denied, read/write failures)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// PBA format errors (bad magic, malformed header tags, truncated records)
    #[error("PBA error: {message}")]
    Pba { message: String },

    /// Invalid data errors (chromosome length mismatch, founder count overflow)
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Algorithm errors (worker registration failure, non-converging search)
    #[error("Algorithm error: {message}")]
    Algorithm { message: String },

    /// Configuration errors (invalid CLI arguments)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// File not found errors
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// CSV record errors (bin specs, group files, reports)
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Parse errors
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// Type alias for Results using HapError
pub type Result<T> = std::result::Result<T, HapError>;

impl HapError {
    /// Create a PBA format error with a message
    pub fn pba(message: impl Into<String>) -> Self {
        Self::Pba {
            message: message.into(),
        }
    }

    /// Create an invalid data error
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create an algorithm error
    pub fn algorithm(message: impl Into<String>) -> Self {
        Self::Algorithm {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}
