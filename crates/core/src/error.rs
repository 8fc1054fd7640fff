//! Error types for the jstm transactional store.
//!
//! One unified `Error` enum is used across all crates. We use `thiserror`
//! for `Display`/`Error` derivation.
//!
//! ## Classification
//!
//! - **Conflict**: temporal failure — another transaction committed first.
//!   Recovered by the retry driver and never surfaced to callers except
//!   as `MaxRetriesExceeded` once the ceiling is hit.
//! - **NotFound / AlreadyExists / PathAbsent / InvalidPath**: structural
//!   failures. Never retried.
//! - **User**: a closure abort. Propagated verbatim, never retried.
//! - **Backend / Serialization**: infrastructure failures. Never retried.

use thiserror::Error;

/// Result type alias for jstm operations
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all jstm operations
#[derive(Debug, Error)]
pub enum Error {
    /// A TVar with this id already exists
    ///
    /// Raised by `new_tvar` only. TVar creation is one-shot.
    #[error("tvar already exists: {id}")]
    AlreadyExists {
        /// Id of the existing TVar
        id: String,
    },

    /// No TVar with this id exists
    ///
    /// Raised when a transaction reads an absent id, or — fatally — when
    /// a write set references an id that is missing at commit time.
    #[error("tvar not found: {id}")]
    NotFound {
        /// Id that was not found
        id: String,
    },

    /// A path projection traversed a missing key or index
    ///
    /// Callers that want optional semantics should read the parent
    /// document instead.
    #[error("path absent in tvar {id}: {path}")]
    PathAbsent {
        /// Id of the TVar being projected
        id: String,
        /// Normalized path that could not be resolved
        path: String,
    },

    /// A path string failed to parse
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath {
        /// The offending path string
        path: String,
        /// Why it was rejected
        reason: String,
    },

    /// Validation or CAS failure at commit: another transaction won
    ///
    /// Retryable. The retry driver catches this and re-runs the closure.
    #[error("transaction conflict: {reason}")]
    Conflict {
        /// What moved underneath the transaction
        reason: String,
    },

    /// The retry ceiling was reached without a successful commit
    #[error("max retry attempts exceeded ({attempts} attempts)")]
    MaxRetriesExceeded {
        /// Number of attempts made before giving up
        attempts: u32,
    },

    /// Backend I/O failure
    #[error("backend error: {message}")]
    Backend {
        /// Error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Failed to serialize or deserialize a stored document
    #[error("serialization error: {message}")]
    Serialization {
        /// What went wrong
        message: String,
    },

    /// A transaction was used after commit or abort
    #[error("transaction not active: {state}")]
    NotActive {
        /// Current state of the transaction
        state: String,
    },

    /// Error raised by a user closure, propagated verbatim
    #[error("{0}")]
    User(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Create an AlreadyExists error
    pub fn already_exists(id: impl Into<String>) -> Self {
        Error::AlreadyExists { id: id.into() }
    }

    /// Create a NotFound error
    pub fn not_found(id: impl Into<String>) -> Self {
        Error::NotFound { id: id.into() }
    }

    /// Create a PathAbsent error
    pub fn path_absent(id: impl Into<String>, path: impl Into<String>) -> Self {
        Error::PathAbsent {
            id: id.into(),
            path: path.into(),
        }
    }

    /// Create an InvalidPath error
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a Conflict error
    pub fn conflict(reason: impl Into<String>) -> Self {
        Error::Conflict {
            reason: reason.into(),
        }
    }

    /// Create a Backend error
    pub fn backend(message: impl Into<String>) -> Self {
        Error::Backend {
            message: message.into(),
            source: None,
        }
    }

    /// Create a Backend error with an underlying source
    pub fn backend_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Backend {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a Serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Error::Serialization {
            message: message.into(),
        }
    }

    /// Create a NotActive error
    pub fn not_active(state: impl Into<String>) -> Self {
        Error::NotActive {
            state: state.into(),
        }
    }

    /// Create a User error from any error value (including plain strings)
    ///
    /// User errors abort the transaction without committing and are
    /// propagated to the `atomically` caller without retry.
    pub fn user(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::User(err.into())
    }

    /// Check if this error is a commit conflict
    ///
    /// Only conflicts are retried by the retry driver.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// Check if this error may succeed on retry
    pub fn is_retryable(&self) -> bool {
        self.is_conflict()
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Check if this is the retry-ceiling error
    pub fn is_max_retries(&self) -> bool {
        matches!(self, Error::MaxRetriesExceeded { .. })
    }
}
