//! Error types for schema normalization.
//!
//! Every variant that names a table, column or constraint carries the
//! original (pre-normalization) name, since that is what an operator will
//! look up in the source database's documentation.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for normalization runs.
#[derive(Error, Debug)]
pub enum NormalizeError {
    /// A required element is absent or unreadable in the schema document
    #[error("Malformed schema document: {element} missing or invalid in {context}")]
    MalformedSchema { element: String, context: String },

    /// A foreign key references a table that is not in the document
    #[error(
        "Foreign key {constraint} on table {table} references table {target} which is not in the document"
    )]
    MissingTable {
        table: String,
        constraint: String,
        target: String,
    },

    /// Column type code has no entry in the active dialect's type table
    #[error("Unsupported type code {code} for column {table}.{column} (dialect {dialect})")]
    UnsupportedType {
        table: String,
        column: String,
        code: i32,
        dialect: String,
    },

    /// Truncation + counter failed to find a free name
    #[error("Could not find a unique normalized name for {name} in {scope}")]
    IdentifierCollisionUnresolved { name: String, scope: String },

    /// XML read/write error
    #[error("XML error in {path}: {message}")]
    Xml { path: PathBuf, message: String },

    /// TSV read/write error
    #[error("TSV error in {path}: {source}")]
    Tsv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A TSV data file lacks a column the run needs
    #[error("TSV error in {path}: no column named {column} in the header")]
    MissingTsvColumn { path: PathBuf, column: String },

    /// Invalid configuration (bad YAML, unknown dialect, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NormalizeError {
    /// Create a MalformedSchema error
    pub fn malformed(element: impl Into<String>, context: impl Into<String>) -> Self {
        NormalizeError::MalformedSchema {
            element: element.into(),
            context: context.into(),
        }
    }

    /// Create an Xml error for a given file
    pub fn xml(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        NormalizeError::Xml {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create a Tsv error for a given file
    pub fn tsv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        NormalizeError::Tsv {
            path: path.into(),
            source,
        }
    }

    /// Whether this error aborts the whole document run (as opposed to a
    /// single table or schema).
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            NormalizeError::MissingTable { .. } | NormalizeError::UnsupportedType { .. }
        )
    }
}

/// Result type alias for normalization operations.
pub type Result<T> = std::result::Result<T, NormalizeError>;
