//! Error types for the recrawl subsystem
//!
//! This module defines the domain error types used by records, the history
//! store, the recrawl journal and the crawl mappers.

use thiserror::Error;

use crate::record::ValueType;

/// Errors raised by [`AttributeRecord`](crate::record::AttributeRecord) access
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// Key not present in the record
    #[error("No such key: {0}")]
    NoSuchKey(String),

    /// Key present but holding a value of another type
    #[error("Type mismatch for key '{key}': expected {expected}, found {found}")]
    TypeMismatch {
        key: String,
        expected: ValueType,
        found: ValueType,
    },

    /// Value cannot be deep-cloned (byte streams, opaque objects)
    #[error("Value under key '{key}' of type {value_type} cannot be cloned")]
    Uncloneable { key: String, value_type: ValueType },
}

/// Errors raised by the persistent history store
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying SQLite failure
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Record could not be encoded or decoded
    #[error("Record codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// I/O failure while opening the environment
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Store was used after `close()`
    #[error("History store is closed")]
    Closed,

    /// Environment directory missing or not usable
    #[error("Invalid store environment '{path}': {reason}")]
    InvalidEnvironment { path: String, reason: String },
}

/// Errors raised by the recrawl journal
#[derive(Error, Debug)]
pub enum JournalError {
    /// File-level I/O failure
    #[error("Journal I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure fetching a journal over HTTP
    #[error("Journal HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Journal source could not be interpreted
    #[error("Invalid journal source: {0}")]
    InvalidSource(String),
}

/// Errors raised by crawl mappers and diversion logging
#[derive(Error, Debug)]
pub enum PartitionError {
    /// Diversion directory could not be created
    #[error("Cannot create diversion directory '{path}': {source}")]
    DiversionDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Diversion log could not be opened or written
    #[error("Diversion log error for '{path}': {source}")]
    DiversionLog {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Mapping file line did not hold exactly two tokens
    #[error("Malformed map line {line_number}: '{line}'")]
    MalformedMapLine { line_number: usize, line: String },

    /// Map source could not be read
    #[error("Cannot read map source '{source_name}': {reason}")]
    MapSource { source_name: String, reason: String },

    /// Reduce pattern is not a valid regex
    #[error("Invalid reduce pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Bucket count of zero
    #[error("Crawler count must be at least 1")]
    ZeroBuckets,
}
