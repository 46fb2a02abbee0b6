//! Error types for gnc-rules-core
//!
//! This module provides error handling for the reclassification run,
//! including error codes, detailed messages, and suggestions.

use gnc_rules_config::ConfigError;
use gnc_rules_store::StoreError;
use thiserror::Error;
use std::io;

/// Error codes for programmatic error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Account path does not resolve
    AccountNotFound,
    /// Account has no commodity
    MissingCommodity,
    /// No exchange rate for a commodity pair
    PriceNotFound,
    /// Transaction shape the reclassifier cannot handle
    UnexpectedSplitCount,
    /// Year/month outside the calendar
    InvalidPeriod,
    /// Inconsistent book data
    InvalidFormat,
    /// Amount cannot be represented
    InvalidAmount,
    /// Rules document error
    ConfigError,
    /// Book storage error
    StoreError,
    /// IO error
    IoError,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::AccountNotFound => write!(f, "ACCOUNT_NOT_FOUND"),
            ErrorCode::MissingCommodity => write!(f, "MISSING_COMMODITY"),
            ErrorCode::PriceNotFound => write!(f, "PRICE_NOT_FOUND"),
            ErrorCode::UnexpectedSplitCount => write!(f, "UNEXPECTED_SPLIT_COUNT"),
            ErrorCode::InvalidPeriod => write!(f, "INVALID_PERIOD"),
            ErrorCode::InvalidFormat => write!(f, "INVALID_FORMAT"),
            ErrorCode::InvalidAmount => write!(f, "INVALID_AMOUNT"),
            ErrorCode::ConfigError => write!(f, "CONFIG_ERROR"),
            ErrorCode::StoreError => write!(f, "STORE_ERROR"),
            ErrorCode::IoError => write!(f, "IO_ERROR"),
        }
    }
}

/// Detailed error information for reporting
#[derive(Debug, Clone)]
pub struct ErrorDetails {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Additional details
    pub details: Option<serde_json::Value>,
    /// Suggestions for resolution
    pub suggestions: Vec<String>,
}

impl ErrorDetails {
    /// Create a new error detail
    pub fn new(code: ErrorCode, message: String) -> Self {
        Self {
            code,
            message,
            details: None,
            suggestions: vec![],
        }
    }

    /// Add detail information
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.details = Some(detail);
        self
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: String) -> Self {
        self.suggestions.push(suggestion);
        self
    }
}

impl std::fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(ref details) = self.details {
            write!(f, "\nDetails: {}", details)?;
        }
        if !self.suggestions.is_empty() {
            write!(f, "\nSuggestions:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n  - {}", suggestion)?;
            }
        }
        Ok(())
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Run aborted, book untouched
    Error,
    /// Book or environment needs attention before retrying
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Error => write!(f, "error"),
            ErrorSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// Main error type for gnc-rules-core
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Account not found: {path}")]
    AccountNotFound { path: String },

    #[error("Account has no commodity: {account}")]
    MissingCommodity { account: String },

    #[error("No price from {commodity} to {currency} near {date}")]
    PriceNotFound {
        commodity: String,
        currency: String,
        date: String,
    },

    #[error("Transaction '{description}' ({guid}) has {count} splits, expected 2")]
    UnexpectedSplitCount {
        guid: String,
        description: String,
        count: usize,
    },

    #[error("Invalid period: {year}-{month}")]
    InvalidPeriod { year: i32, month: u32 },

    #[error("Invalid book data: {message}")]
    InvalidFormat { message: String },

    #[error("Invalid amount: {message}")]
    InvalidAmount { message: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("IO error: {message}")]
    IoError { message: String },
}

impl CoreError {
    /// Get the error code
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::AccountNotFound { .. } => ErrorCode::AccountNotFound,
            CoreError::MissingCommodity { .. } => ErrorCode::MissingCommodity,
            CoreError::PriceNotFound { .. } => ErrorCode::PriceNotFound,
            CoreError::UnexpectedSplitCount { .. } => ErrorCode::UnexpectedSplitCount,
            CoreError::InvalidPeriod { .. } => ErrorCode::InvalidPeriod,
            CoreError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            CoreError::InvalidAmount { .. } => ErrorCode::InvalidAmount,
            CoreError::Config(_) => ErrorCode::ConfigError,
            CoreError::Store(_) => ErrorCode::StoreError,
            CoreError::IoError { .. } => ErrorCode::IoError,
        }
    }

    /// Get the severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            CoreError::InvalidFormat { .. } => ErrorSeverity::Critical,
            CoreError::Store(StoreError::Sqlite(_)) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    /// Convert to detailed error info
    pub fn to_details(&self) -> ErrorDetails {
        let mut details = ErrorDetails::new(self.code(), self.to_string());

        match self {
            CoreError::AccountNotFound { path } => {
                details = details.with_detail(serde_json::json!({ "path": path }));
                details = details.with_suggestion(format!(
                    "Check that '{}' exists in the book; names are case-sensitive.", path
                ));
            }
            CoreError::PriceNotFound { commodity, currency, .. } => {
                details = details.with_suggestion(format!(
                    "Add a {} → {} price to the price database.", commodity, currency
                ));
            }
            CoreError::UnexpectedSplitCount { guid, .. } => {
                details = details.with_detail(serde_json::json!({ "transaction": guid }));
                details = details.with_suggestion(
                    "Only two-split transactions can be reclassified; fix this one by hand.".to_string()
                );
            }
            CoreError::InvalidPeriod { .. } => {
                details = details.with_suggestion(
                    "Month must be between 1 and 12.".to_string()
                );
            }
            CoreError::Config(error) => {
                for suggestion in error.to_details().suggestions {
                    details = details.with_suggestion(suggestion);
                }
            }
            CoreError::Store(StoreError::Locked { .. }) => {
                details = details.with_suggestion(
                    "Close GnuCash, or pass --break-lock if no other process uses the book.".to_string()
                );
            }
            CoreError::Store(StoreError::UnsupportedFormat { .. }) => {
                details = details.with_suggestion(
                    "Use File > Save As in GnuCash with the sqlite3 data format.".to_string()
                );
            }
            _ => {}
        }

        details
    }
}

/// Result type with CoreError
pub type CoreResult<T> = Result<T, CoreError>;

impl From<io::Error> for CoreError {
    fn from(error: io::Error) -> Self {
        CoreError::IoError { message: error.to_string() }
    }
}

/// Error context for reporting
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Operation being performed
    pub operation: String,
    /// Additional context data
    pub data: serde_json::Value,
}

impl ErrorContext {
    /// Create a new error context
    pub fn new(operation: String) -> Self {
        Self {
            operation,
            data: serde_json::json!({}),
        }
    }

    /// Add context data
    pub fn with_data(mut self, key: &str, value: serde_json::Value) -> Self {
        self.data[key] = value;
        self
    }
}

/// Error logger trait
pub trait ErrorLogger {
    /// Log an error
    fn log_error(&self, error: &CoreError, context: &ErrorContext);
    /// Log a warning
    fn log_warning(&self, message: &str, context: &ErrorContext);
}

/// Default error logger using log crate
#[derive(Default)]
pub struct DefaultErrorLogger;

impl ErrorLogger for DefaultErrorLogger {
    fn log_error(&self, error: &CoreError, context: &ErrorContext) {
        log::error!(
            target: "gnc_rules::error",
            "{} ({}) - Operation: {} - Context: {}",
            error.to_details(),
            error.severity(),
            context.operation,
            context.data
        );
    }

    fn log_warning(&self, message: &str, context: &ErrorContext) {
        log::warn!(
            target: "gnc_rules::error",
            "{} - Operation: {} - Context: {}",
            message,
            context.operation,
            context.data
        );
    }
}

// ==================== Tests ====================
