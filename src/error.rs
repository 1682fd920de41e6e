//! Error types for the treecache library
//!
//! This module defines every error a caching writer can surface to its caller.
//! Filesystem anomalies seen while fingerprinting are deliberately absent: they
//! degrade to sentinel tokens and warnings instead of aborting a build.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the treecache library
pub type Result<T> = std::result::Result<T, TreeCacheError>;

/// Main error type for all treecache operations
#[derive(Debug, Error)]
pub enum TreeCacheError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors while parsing a JSON filter configuration
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Walk directory error from walkdir crate
    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Invalid configuration supplied at construction
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A filter pattern failed to compile
    #[error("Invalid filter pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The pattern as written by the caller
        pattern: String,
        /// Why it was rejected
        reason: String,
    },

    /// The input resolver could not produce a source directory
    #[error("Input resolution failed: {0}")]
    InputResolution(String),

    /// The rebuild hook reported a failure
    #[error("Rebuild failed: {0}")]
    RebuildFailed(String),

    /// Transferring a cached file into the destination failed
    #[error("Failed to materialize {path:?}: {source}")]
    Materialize {
        /// Destination path being written
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// The cache slot held something that is neither a file nor a directory
    #[error("Cannot materialize non-file entry: {path:?}")]
    UnsupportedFileType {
        /// Path to the unsupported entry
        path: PathBuf,
    },

    /// Errors raised by rebuild hooks written against `anyhow`
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TreeCacheError {
    /// Create a configuration error with a custom message
    pub fn configuration(msg: impl Into<String>) -> Self {
        TreeCacheError::InvalidConfiguration(msg.into())
    }

    /// Create a rebuild error with a custom message
    pub fn rebuild(msg: impl Into<String>) -> Self {
        TreeCacheError::RebuildFailed(msg.into())
    }

    /// Create an input resolution error with a custom message
    pub fn input(msg: impl Into<String>) -> Self {
        TreeCacheError::InputResolution(msg.into())
    }

    /// Check if this error was raised while building a writer
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            TreeCacheError::InvalidConfiguration(_)
                | TreeCacheError::InvalidPattern { .. }
                | TreeCacheError::Json(_)
        )
    }

    /// Check if this error came out of a rebuild hook
    pub fn is_rebuild_failure(&self) -> bool {
        matches!(self, TreeCacheError::RebuildFailed(_) | TreeCacheError::Other(_))
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            TreeCacheError::InvalidPattern { pattern, reason } => {
                format!(
                    "Filter pattern '{}' is invalid ({}). Plain strings are regular expressions; use {{\"glob\": \"...\"}} for globs.",
                    pattern, reason
                )
            }
            TreeCacheError::Json(err) => {
                format!(
                    "Filter configuration is malformed: {}. 'include' and 'exclude' must be lists of patterns.",
                    err
                )
            }
            TreeCacheError::RebuildFailed(msg) => {
                format!("Rebuild failed: {}. The next write will retry against the same input.", msg)
            }
            TreeCacheError::Materialize { path, source } => {
                format!(
                    "Could not write {:?} ({}). Check free space and permissions on the destination.",
                    path, source
                )
            }
            _ => self.to_string(),
        }
    }
}
