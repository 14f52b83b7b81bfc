//! Error types for the oximetry pipeline.
//!
//! Very little in this crate is allowed to fail. Noise packets, abandoned frames,
//! short frames, out-of-range vitals and unknown sessions are all ordinary data
//! conditions and are reported through counters, never through `Err`. What remains
//! is configuration, input sources and the persistence collaborator.
//!
//! ## Error Categories
//!
//! - **Config / Layout Errors**: invalid configuration values or frame layouts
//! - **File / Parse Errors**: capture files and YAML configuration
//! - **Persist Errors**: failures reported by a [`RecordStore`](crate::store::RecordStore)
//! - **Source Errors**: the packet source could not deliver
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use oxilink::{OxilinkError, PersistError};
//!
//! let error: OxilinkError = PersistError::unavailable("database restarting").into();
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T, E = OxilinkError> = std::result::Result<T, E>;

/// Main error type for pipeline operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum OxilinkError {
    #[error("Invalid configuration for '{field}': {details}")]
    Config { field: String, details: String },

    #[error("Invalid frame layout: {details}")]
    Layout { details: String },

    #[error("File error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("Packet source failed: {reason}")]
    Source {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("{component} stopped abnormally")]
    Shutdown { component: String },
}

/// Failure reported by the persistence collaborator's `append_batch`.
///
/// The buffered writer keeps a failed batch and retries it on the next interval
/// whatever the variant; [`PersistError::is_retryable`] only changes how loudly
/// the failure is logged.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PersistError {
    #[error("Store I/O failed")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Store rejected batch: {reason}")]
    Rejected { reason: String },
}

impl PersistError {
    /// Helper constructor for a temporarily unreachable store.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        PersistError::Unavailable { reason: reason.into() }
    }

    /// Helper constructor for a store that refused the batch contents.
    pub fn rejected(reason: impl Into<String>) -> Self {
        PersistError::Rejected { reason: reason.into() }
    }

    /// Whether the store is expected to accept the same batch later.
    pub fn is_retryable(&self) -> bool {
        match self {
            PersistError::Io { .. } => true,
            PersistError::Unavailable { .. } => true,
            PersistError::Rejected { .. } => false,
        }
    }
}

impl From<csv::Error> for PersistError {
    fn from(err: csv::Error) -> Self {
        match err.into_kind() {
            csv::ErrorKind::Io(source) => PersistError::Io { source },
            other => PersistError::Rejected { reason: format!("{:?}", other) },
        }
    }
}

impl OxilinkError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            OxilinkError::Persist(inner) => inner.is_retryable(),
            OxilinkError::Source { .. } => true,
            OxilinkError::Timeout { .. } => true,
            OxilinkError::Config { .. } => false,
            OxilinkError::Layout { .. } => false,
            OxilinkError::File { .. } => false,
            OxilinkError::Parse { .. } => false,
            OxilinkError::Shutdown { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            OxilinkError::Config { .. } => vec![
                "Check the configuration value against its documented range",
                "Remove the field to fall back to the default",
            ],
            OxilinkError::Layout { .. } => vec![
                "Check waveform ranges are non-empty and ordered",
                "Check SpO2 and pulse offsets against the device frame size",
                "Start from FrameLayout::dual_channel(), single_channel() or segmented_pleth()",
            ],
            OxilinkError::File { .. } => vec![
                "Check file exists and is readable",
                "Check directory permissions",
                "Ensure sufficient disk space",
            ],
            OxilinkError::Parse { .. } => vec![
                "Check capture lines contain decimal bytes separated by whitespace",
                "Verify the YAML configuration syntax",
            ],
            OxilinkError::Persist(_) => vec![
                "Check the store is reachable",
                "Buffered records are retained and retried on the next flush",
            ],
            OxilinkError::Source { .. } => vec![
                "Check the transport adapter is still connected",
                "Re-open the packet source",
            ],
            OxilinkError::Timeout { .. } => vec![
                "Increase timeout duration",
                "Check the device is streaming notifications",
            ],
            OxilinkError::Shutdown { .. } => vec![
                "Check the log for a panic in the named task",
                "Start a new monitor",
            ],
        }
    }

    /// Helper constructor for configuration errors.
    pub fn config(field: impl Into<String>, details: impl Into<String>) -> Self {
        OxilinkError::Config { field: field.into(), details: details.into() }
    }

    /// Helper constructor for frame layout errors.
    pub fn layout(details: impl Into<String>) -> Self {
        OxilinkError::Layout { details: details.into() }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        OxilinkError::File { path, source }
    }

    /// Helper constructor for parse errors.
    pub fn parse(context: impl Into<String>, details: impl Into<String>) -> Self {
        OxilinkError::Parse { context: context.into(), details: details.into() }
    }

    /// Helper constructor for packet source failures.
    pub fn source_failed(reason: impl Into<String>) -> Self {
        OxilinkError::Source { reason: reason.into(), source: None }
    }

    /// Helper constructor for packet source failures with source.
    pub fn source_failed_with(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        OxilinkError::Source { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for a background task that panicked or was aborted.
    pub fn shutdown(component: impl Into<String>) -> Self {
        OxilinkError::Shutdown { component: component.into() }
    }
}

impl From<std::io::Error> for OxilinkError {
    fn from(err: std::io::Error) -> Self {
        OxilinkError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}

impl From<serde_yaml_ng::Error> for OxilinkError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        OxilinkError::Parse { context: "YAML configuration".to_string(), details: err.to_string() }
    }
}
