//! Centralized error handling for datatrail.
//!
//! The error taxonomy mirrors how failures should be treated by callers:
//!
//! - Path resolution errors ([`InvalidPath`](DatatrailError::InvalidPath),
//!   [`AmbiguousFile`](DatatrailError::AmbiguousFile),
//!   [`AmbiguousFileName`](DatatrailError::AmbiguousFileName)) are user-input
//!   problems, surfaced immediately and never retried.
//! - Lineage errors ([`CyclicLineage`](DatatrailError::CyclicLineage),
//!   [`ProvenanceCorrupt`](DatatrailError::ProvenanceCorrupt)) are
//!   data-integrity problems, surfaced and never auto-repaired.
//! - Documentation errors ([`AmbiguousColumn`](DatatrailError::AmbiguousColumn),
//!   [`UnknownColumn`](DatatrailError::UnknownColumn),
//!   [`AmbiguousLineage`](DatatrailError::AmbiguousLineage)) are usage
//!   problems: silently guessing lineage would corrupt the audit trail, so
//!   they are hard failures.
//!
//! The one recoverable condition — a sidecar file that does not mention a
//! loaded file — is logged and degraded gracefully inside
//! [`Stage::load`](crate::stage::Stage::load) rather than represented here.

use std::fmt;

/// Main error type for datatrail operations.
#[derive(Debug)]
pub enum DatatrailError {
    /// I/O errors (file operations)
    Io(std::io::Error),

    /// A location that cannot be resolved to a directory + file
    InvalidPath(String),

    /// Wildcard file discovery matched zero or several files
    AmbiguousFile(String),

    /// Auto file-name inference on save had zero or several candidates
    AmbiguousFileName(String),

    /// The persisted input-file graph contains a cycle
    CyclicLineage(String),

    /// A sidecar metadata file exists but cannot be parsed
    ProvenanceCorrupt(String),

    /// A bare column reference matches more than one alias
    AmbiguousColumn(String),

    /// A column reference matches no documented column
    UnknownColumn(String),

    /// A column name carries more than one lineage under the same alias
    AmbiguousLineage(String),

    /// File extension with no registered serializer
    UnsupportedFormat(String),

    /// Data processing errors (polars)
    DataProcessing(String),

    /// Generic error with context
    Other(String),
}

impl fmt::Display for DatatrailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::InvalidPath(msg) => write!(f, "Invalid path: {msg}"),
            Self::AmbiguousFile(msg) => write!(f, "Ambiguous file: {msg}"),
            Self::AmbiguousFileName(msg) => write!(f, "Ambiguous file name: {msg}"),
            Self::CyclicLineage(msg) => write!(f, "Cyclic lineage: {msg}"),
            Self::ProvenanceCorrupt(msg) => write!(f, "Corrupt provenance metadata: {msg}"),
            Self::AmbiguousColumn(msg) => write!(f, "Ambiguous column: {msg}"),
            Self::UnknownColumn(msg) => write!(f, "Unknown column: {msg}"),
            Self::AmbiguousLineage(msg) => write!(f, "Ambiguous lineage: {msg}"),
            Self::UnsupportedFormat(msg) => write!(f, "Unsupported format: {msg}"),
            Self::DataProcessing(msg) => write!(f, "Data processing error: {msg}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for DatatrailError {}

impl From<std::io::Error> for DatatrailError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<anyhow::Error> for DatatrailError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<serde_json::Error> for DatatrailError {
    fn from(err: serde_json::Error) -> Self {
        Self::Other(format!("JSON error: {err}"))
    }
}

impl From<polars::error::PolarsError> for DatatrailError {
    fn from(err: polars::error::PolarsError) -> Self {
        Self::DataProcessing(err.to_string())
    }
}

/// Result type alias for datatrail operations.
pub type Result<T> = std::result::Result<T, DatatrailError>;

/// Extension trait to add context to results.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<DatatrailError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err: DatatrailError = e.into();
            DatatrailError::Other(format!("{}: {}", msg.into(), err))
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err: DatatrailError = e.into();
            DatatrailError::Other(format!("{}: {}", f(), err))
        })
    }
}
