//! Error types for the reconciliation engine
//!
//! Core operations return `ReconError` so callers can tell which column,
//! environment or row a failure belongs to. The binary wraps these in
//! `anyhow` at the edges.

use std::path::PathBuf;
use thiserror::Error;

/// Failure raised by a single rule while deriving a value from one row
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuleError {
    #[error("field '{0}' is missing from the row")]
    MissingField(String),
    #[error("field '{field}' has unusable value {value}: {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Errors produced while building keys, matching and assembling records
#[derive(Debug, Error)]
pub enum ReconError {
    #[error("column '{column}' not found in {env} data")]
    MissingColumn { env: String, column: String },

    #[error("column '{column}' appears more than once in {env} data")]
    DuplicateColumn { env: String, column: String },

    #[error("{env} row {row} has {found} values but the table has {expected} columns")]
    RowWidth {
        env: String,
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("no rule registered for identifier column '{0}'")]
    MissingRule(String),

    #[error("rule for column '{column}' failed on {env} row {row}: {source}")]
    RuleEvaluation {
        column: String,
        env: String,
        row: usize,
        #[source]
        source: RuleError,
    },

    #[error("column '{column}' in {env} data collides with the '{column}' group discriminator")]
    ReservedColumn { env: String, column: String },

    #[error("no input files matched pattern '{0}'")]
    NoInputFiles(String),

    #[error("invalid glob pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("failed to read input {path:?}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("header of {path:?} does not match the first file: expected {expected:?}, found {found:?}")]
    SchemaMismatch {
        path: PathBuf,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("failed to parse CSV file {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to write output {path:?}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type ReconResult<T> = std::result::Result<T, ReconError>;
