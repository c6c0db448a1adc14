use thiserror::Error;

/// Errors reported by a backing document store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// A unique index (or the primary key) rejected the write.
    #[error("duplicate key in {collection}: {key}")]
    DuplicateKey { collection: String, key: String },

    /// An operation needed an index that does not exist.
    ///
    /// Recoverable: creating the index and retrying may succeed.
    #[error("missing index on {collection}: {index}")]
    MissingIndex { collection: String, index: String },

    /// An index with the same name but different options already exists.
    #[error("index conflict on {collection}: {name}")]
    IndexConflict { collection: String, name: String },

    /// The document cannot be stored (e.g. it lacks a primary key).
    #[error("invalid document for {collection}: {reason}")]
    InvalidDocument { collection: String, reason: String },

    /// Transport or server failure.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    /// Returns `true` for the recoverable missing-index condition.
    pub fn is_missing_index(&self) -> bool {
        matches!(self, Self::MissingIndex { .. })
    }
}

/// Result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
