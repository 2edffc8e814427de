//! Error types for the sync engine.
//!
//! The taxonomy mirrors how failures propagate: configuration errors abort
//! an operation before any transfer starts, transient and integrity errors
//! are per-path and collected into the operation report.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Fatal for the whole operation (missing local root, bad pattern, etc.)
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage provider error (auth failure, missing bucket, backend fault)
    #[error("storage error: {0}")]
    Storage(String),

    /// Retryable failure (network blip, rate limit)
    #[error("transient error: {0}")]
    Transient(String),

    /// A single network operation exceeded its deadline
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Digest mismatch or corrupted payload. Never silently accepted.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// A remote path that must not be written locally
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("object not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("pattern error: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("walk error: {0}")]
    Walk(#[from] ignore::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl SyncError {
    /// Whether the transfer engine should retry this failure with backoff.
    ///
    /// Only network-shaped failures qualify; integrity and configuration
    /// errors are never retried within a cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Transient(_) | SyncError::Timeout(_))
    }

    /// Whether this failure aborts the whole operation rather than one path.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(SyncError::Transient("connection reset".into()).is_transient());
        assert!(SyncError::Timeout("upload".into()).is_transient());
        assert!(!SyncError::Integrity("digest mismatch".into()).is_transient());
        assert!(!SyncError::Config("no root".into()).is_transient());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(SyncError::Config("no root".into()).is_fatal());
        assert!(!SyncError::Storage("bucket gone".into()).is_fatal());
    }
}
