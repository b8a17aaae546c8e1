//! Error types for Robata
//!
//! Every fallible operation in the crate returns [`Result`]. The error is
//! `Clone` so that a single failure detected after a batch group was merged
//! can be delivered to every caller of that group, and serializable so that
//! a failure on a remote worker reaches the caller with its kind intact.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for Robata operations
pub type Result<T> = std::result::Result<T, RobataError>;

/// Main error type for Robata operations
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RobataError {
    /// Unknown model, tag, framework or runner
    #[error("not found: {0}")]
    NotFound(String),

    /// The runnable has no method with this name
    #[error("method `{0}` not found")]
    MethodNotFound(String),

    /// Payloads cannot be merged into one batch (kind, rank or shape differ)
    #[error("incompatible batch: {0}")]
    IncompatibleBatch(String),

    /// Element types differ between payloads of one batch
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// A batch cannot be reconstructed from its recorded boundaries
    #[error("malformed batch: {0}")]
    MalformedBatch(String),

    /// An argument declared non-batchable differs between callers of one group
    #[error("non-batchable argument `{0}` differs across the batch")]
    NonBatchableMismatch(String),

    /// The bound resource descriptor cannot satisfy the method
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// Lifecycle misuse: the runner is not initialized or already destroyed
    #[error("runner not ready: {0}")]
    NotReady(String),

    /// The same keyword argument was supplied twice
    #[error("duplicate keyword argument `{0}`")]
    DuplicateKeyword(String),

    /// A resource descriptor holds a negative or non-finite amount
    #[error("invalid resource: {0}")]
    InvalidResource(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// The underlying model call failed
    #[error("execution failed: {0}")]
    Execution(String),

    /// The remote transport failed to deliver a call or its reply
    #[error("transport error: {0}")]
    Transport(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl RobataError {
    /// Create a not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an incompatible-batch error
    pub fn incompatible(msg: impl Into<String>) -> Self {
        Self::IncompatibleBatch(msg.into())
    }

    /// Create a type-mismatch error
    pub fn type_mismatch(msg: impl Into<String>) -> Self {
        Self::TypeMismatch(msg.into())
    }

    /// Create a malformed-batch error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedBatch(msg.into())
    }

    /// Create a not-ready error
    pub fn not_ready(msg: impl Into<String>) -> Self {
        Self::NotReady(msg.into())
    }

    /// Create an execution error
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// True for errors raised while forming or reconstructing a batch.
    pub fn is_batch_error(&self) -> bool {
        matches!(
            self,
            Self::IncompatibleBatch(_)
                | Self::TypeMismatch(_)
                | Self::MalformedBatch(_)
                | Self::NonBatchableMismatch(_)
        )
    }

    /// True for unknown models as well as unknown methods.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::MethodNotFound(_))
    }
}

impl From<serde_json::Error> for RobataError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
