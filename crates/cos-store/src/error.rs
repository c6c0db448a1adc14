use cos_backend::BackendError;
use cos_types::{Checksum, FileId, TypeError};

/// Errors from chunked object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The caller passed something the store cannot accept.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A uniqueness constraint rejected a file id or chunk position.
    #[error("duplicate key in {collection}: {key}")]
    DuplicateKey { collection: String, key: String },

    /// The backend's view of the written chunks disagrees with the source.
    ///
    /// The chunks were deleted before this error was returned unless
    /// `cleanup_error` says otherwise.
    #[error(
        "checksum mismatch for {id}: local {local}, server {server}{}",
        .cleanup_error.as_ref().map(|e| format!(" (chunk cleanup failed: {e})")).unwrap_or_default()
    )]
    IntegrityMismatch {
        id: FileId,
        local: Checksum,
        server: Checksum,
        cleanup_error: Option<BackendError>,
    },

    /// Transport or server failure, including a checksum that still failed
    /// after the chunk index was repaired.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A single-object lookup or removal matched nothing.
    #[error("file not found: {0}")]
    NotFound(String),

    /// A stored metadata document lacks a reserved field or has the wrong type.
    #[error("corrupt metadata document {id}: {reason}")]
    CorruptDocument { id: String, reason: String },

    /// The caller's source stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<BackendError> for StoreError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::DuplicateKey { collection, key } => {
                Self::DuplicateKey { collection, key }
            }
            BackendError::InvalidDocument { collection, reason } => {
                Self::InvalidArgument(format!("{collection}: {reason}"))
            }
            other @ (BackendError::MissingIndex { .. }
            | BackendError::IndexConflict { .. }
            | BackendError::Unavailable(_)) => Self::BackendUnavailable(other.to_string()),
        }
    }
}

impl From<TypeError> for StoreError {
    fn from(err: TypeError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
