//! Unified error handling for the recrawl crate
//!
//! This module provides a unified error type that consolidates all domain-specific
//! errors into a single `Error` enum, while maintaining the ability to use
//! domain-specific errors when needed.
//!
//! # Architecture
//!
//! - [`RecrawlErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use recrawl::error::{Error, RecrawlErrorTrait};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         tracing::warn!(category = ?err.category(), "Retrying: {err}");
//!     } else {
//!         eprintln!("Fatal error: {}", err);
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::utils::error::{JournalError, PartitionError, RecordError, StoreError};

/// Common trait for all recrawl error types
pub trait RecrawlErrorTrait: std::error::Error {
    /// Check if this error is recoverable (the operation may be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Attribute record access and typing errors
    Record,
    /// Durable store and journal I/O errors
    Storage,
    /// Network errors fetching remote journals or maps
    Network,
    /// Crawl map and diversion errors
    Partition,
    /// Configuration and validation errors
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Record => "record",
            Self::Storage => "storage",
            Self::Network => "network",
            Self::Partition => "partition",
            Self::Config => "config",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for the recrawl crate
#[derive(Error, Debug)]
pub enum Error {
    /// Attribute record errors
    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    /// History store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Recrawl journal errors
    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),

    /// Crawl mapping errors
    #[error("Partition error: {0}")]
    Partition(#[from] PartitionError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl RecrawlErrorTrait for RecordError {
    fn is_recoverable(&self) -> bool {
        false
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Record
    }
}

impl RecrawlErrorTrait for StoreError {
    fn is_recoverable(&self) -> bool {
        match self {
            // SQLITE_BUSY and friends clear up on their own
            Self::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            Self::Io(_) => true,
            _ => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidEnvironment { .. } => ErrorCategory::Config,
            _ => ErrorCategory::Storage,
        }
    }
}

impl RecrawlErrorTrait for JournalError {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::InvalidSource(_) => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Http(_) => ErrorCategory::Network,
            Self::Io(_) => ErrorCategory::Storage,
            Self::InvalidSource(_) => ErrorCategory::Config,
        }
    }
}

impl RecrawlErrorTrait for PartitionError {
    fn is_recoverable(&self) -> bool {
        matches!(self, Self::DiversionLog { .. })
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::DiversionDir { .. } | Self::DiversionLog { .. } => ErrorCategory::Storage,
            Self::MalformedMapLine { .. }
            | Self::MapSource { .. }
            | Self::InvalidPattern(_)
            | Self::ZeroBuckets => ErrorCategory::Config,
        }
    }
}

impl RecrawlErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Record(e) => e.is_recoverable(),
            Self::Store(e) => e.is_recoverable(),
            Self::Journal(e) => e.is_recoverable(),
            Self::Partition(e) => e.is_recoverable(),
            Self::Io(_) => true, // I/O errors are often transient
            Self::Json(_) => false,
            Self::Config(_) => false,
            Self::Other(_) => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Record(e) => e.category(),
            Self::Store(e) => e.category(),
            Self::Journal(e) => e.category(),
            Self::Partition(e) => e.category(),
            Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) => ErrorCategory::Record,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other(_) => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other(context.into())
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(format!("{err:#}"))
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
