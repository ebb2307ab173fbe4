//! Error types for Quarry core operations.
//!
//! Every condition in this taxonomy has a defined degraded behavior, so
//! callers can match on the variant and recover instead of surfacing a fault
//! to the user interface.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using QuarryError
pub type Result<T> = std::result::Result<T, QuarryError>;

/// Core error types for Quarry operations.
#[derive(Error, Debug)]
pub enum QuarryError {
    // === Index Errors ===
    /// A search was attempted while the index is being rebuilt
    #[error("index is not ready: a rebuild is in progress")]
    NotReady,

    /// A serialized snapshot could not be loaded into the engine
    #[error("snapshot is incompatible: {reason}")]
    SnapshotIncompatible { reason: String },

    // === Document Errors ===
    /// The file exists but its content cannot be indexed
    #[error("content of {path} cannot be indexed")]
    UnsupportedContent { path: PathBuf },

    /// The document source has no document at this path
    #[error("document not found: {path}")]
    DocumentNotFound { path: String },

    // === Tokenizer Errors ===
    /// The CJK segmenter was used before `init()` completed
    #[error("CJK segmenter is not initialized")]
    SegmenterUnavailable,

    // === Query Errors ===
    /// The query's command block contained an unknown command
    #[error("unknown query command: {command}")]
    InvalidCommand { command: String },

    // === Configuration Errors ===
    /// Configuration file parsing failed
    #[error("configuration error: {reason}")]
    Config { reason: String },

    // === I/O Errors ===
    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization Errors ===
    /// Serialization/deserialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    // === Internal Errors ===
    /// Internal error that should not happen
    #[error("internal error: {0}")]
    Internal(String),
}

impl QuarryError {
    /// Returns true if the index must be rebuilt from documents
    pub fn requires_reindex(&self) -> bool {
        matches!(self, QuarryError::SnapshotIncompatible { .. })
    }

    /// Returns true if the operation has a degraded fallback or can be retried
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            QuarryError::NotReady
                | QuarryError::SnapshotIncompatible { .. }
                | QuarryError::UnsupportedContent { .. }
                | QuarryError::SegmenterUnavailable
                | QuarryError::InvalidCommand { .. }
                | QuarryError::Io(_)
        )
    }

    /// Create a snapshot incompatibility error
    pub fn snapshot(reason: impl Into<String>) -> Self {
        QuarryError::SnapshotIncompatible {
            reason: reason.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(reason: impl Into<String>) -> Self {
        QuarryError::Serialization(reason.into())
    }
}

impl From<bincode::Error> for QuarryError {
    fn from(err: bincode::Error) -> Self {
        QuarryError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_reindex() {
        assert!(QuarryError::snapshot("version 0").requires_reindex());
        assert!(!QuarryError::NotReady.requires_reindex());
        assert!(!QuarryError::SegmenterUnavailable.requires_reindex());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(QuarryError::NotReady.is_recoverable());
        assert!(QuarryError::InvalidCommand {
            command: "zz".to_string()
        }
        .is_recoverable());
        assert!(QuarryError::UnsupportedContent {
            path: PathBuf::from("a.pdf")
        }
        .is_recoverable());
        assert!(!QuarryError::Internal("bug".to_string()).is_recoverable());
    }

    #[test]
    fn test_display() {
        let err = QuarryError::InvalidCommand {
            command: "bogus".to_string(),
        };
        assert_eq!(err.to_string(), "unknown query command: bogus");
    }
}
