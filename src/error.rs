//! Fatal error taxonomy of a load run
//!
//! Per-value coercion failures are deliberately absent: they resolve to NULL in
//! the normalizer and never surface here.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("source file not found: {}", .path.display())]
    MissingSource { path: PathBuf },

    #[error("failed to read source file {}", .path.display())]
    SourceIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse source file {}", .path.display())]
    SourceParse {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to connect to {target}")]
    Connection {
        target: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("connection to {target} timed out after {}s", .after.as_secs())]
    ConnectTimeout { target: String, after: Duration },

    #[error("failed to prepare table {table}")]
    TablePreparation {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("column '{column}' is missing from batch {batch}")]
    SchemaMismatch { batch: usize, column: String },

    #[error("batch {batch} was rejected by the target store")]
    Insertion {
        batch: usize,
        #[source]
        source: InsertError,
    },

    #[error("load cancelled before batch {next_batch}")]
    Cancelled { next_batch: usize },
}

impl LoadError {
    /// Classify an I/O failure on the source file
    pub fn source_io(path: &std::path::Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            LoadError::MissingSource {
                path: path.to_path_buf(),
            }
        } else {
            LoadError::SourceIo {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// Failure of a single batch insert, before it is attributed to a batch index
#[derive(Debug, Error)]
pub enum InsertError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("insert statement timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
}
