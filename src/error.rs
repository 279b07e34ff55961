//! Error taxonomy for shard persistence.
//!
//! Every variant of [`StoreError`] aborts the whole operation; no partial
//! [`Collection`](crate::store::Collection) is returned alongside it. The one
//! exception is [`PartialReadFailure`], which is not an error at all from the
//! caller's point of view: it rides along with a successful best-effort read
//! and is also emitted as a `log` warning.

use std::fmt;
use std::path::{Path, PathBuf};

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Malformed or empty input, rejected before any I/O.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A prefix or glob expanded to zero files.
    #[error("no files found matching {pattern}")]
    NotFound { pattern: String },

    /// A prefix-based (or single-family) expansion matched more than one
    /// dataset family.
    #[error("{pattern} matches more than one dataset family: {}", families.join(", "))]
    AmbiguousPattern {
        pattern: String,
        families: Vec<String>,
    },

    /// The file exists but the named dataset does not.
    #[error("dataset {dataset:?} not found in {location}")]
    DatasetNotFound { dataset: String, location: String },

    /// The file exists but is not a recognized or parsable container.
    #[error("{}: {reason}", path.display())]
    Format { path: PathBuf, reason: String },

    /// Cross-shard type divergence.
    #[error("type mismatch for dataset {dataset:?}: {detail}")]
    TypeStrictness { dataset: String, detail: String },

    /// An append would overwrite an existing dataset.
    #[error("dataset {dataset:?} already exists in {}", path.display())]
    DatasetNameCollision { dataset: String, path: PathBuf },

    /// Missing or unreadable shard file.
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Columnar encoder failure on the write path.
    #[error("parquet error writing {}: {source}", path.display())]
    Parquet {
        path: PathBuf,
        #[source]
        source: parquet::errors::ParquetError,
    },

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Delimited text writer failure.
    #[error("csv error writing {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl StoreError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn format(path: impl AsRef<Path>, reason: impl fmt::Display) -> Self {
        Self::Format {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// True when the error came from a single shard and could be skipped by a
    /// best-effort read.
    #[must_use]
    pub fn is_shard_local(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::Format { .. }
                | Self::Parquet { .. }
                | Self::Arrow(_)
                | Self::Csv { .. }
        )
    }
}

/// One shard that a best-effort read skipped.
#[derive(Debug)]
pub struct ShardFailure {
    pub path: PathBuf,
    pub error: StoreError,
}

/// Report attached to a best-effort read that skipped unreadable shards.
#[derive(Debug, Default)]
pub struct PartialReadFailure {
    pub failures: Vec<ShardFailure>,
}

impl PartialReadFailure {
    #[must_use]
    pub fn count(&self) -> usize {
        self.failures.len()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.failures.iter().map(|f| f.path.as_path())
    }
}

impl fmt::Display for PartialReadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "There were {} errors reading files on the server.",
            self.count()
        )?;
        if let Some(first) = self.failures.first() {
            write!(f, " Sample error message: {}", first.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for PartialReadFailure {}
