//! Error types for gnc-rules-store

use thiserror::Error;
use std::io;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Book not found: {path}")]
    FileNotFound { path: String },

    #[error("Unsupported book format for {path}: {format}")]
    UnsupportedFormat { path: String, format: String },

    #[error("Not a GnuCash book: missing table '{table}'")]
    MissingTable { table: String },

    #[error("Book is locked by {hostname} (pid {pid})")]
    Locked { hostname: String, pid: i64 },

    #[error("Session was opened read-only")]
    ReadOnly,

    #[error("Split {guid} does not exist in the book")]
    SplitNotFound { guid: String },

    #[error("Invalid book data: {message}")]
    InvalidData { message: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// Result type with StoreError
pub type StoreResult<T> = Result<T, StoreError>;
