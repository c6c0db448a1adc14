use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TypeError;

/// Identifier of a stored file.
///
/// A `FileId` is the primary key of a file's metadata document and the
/// back-reference carried by every one of its chunks. Callers may supply
/// their own (any non-empty string) or let the store generate a UUID v7,
/// which sorts by creation time.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileId(String);

impl FileId {
    /// Wrap a caller-supplied identifier.
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        if id.is_empty() {
            return Err(TypeError::EmptyFileId);
        }
        Ok(Self(id))
    }

    /// Generate a fresh time-ordered identifier (UUID v7).
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short representation (first 8 characters).
    pub fn short_id(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }

    /// The identifier as a document value.
    pub fn to_value(&self) -> Value {
        Value::String(self.0.clone())
    }

    /// Read an identifier back out of a document value.
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_str().and_then(|s| Self::new(s).ok())
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", self.0)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for FileId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for FileId {
    type Error = TypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FileId> for String {
    fn from(id: FileId) -> Self {
        id.0
    }
}

impl From<FileId> for Value {
    fn from(id: FileId) -> Self {
        Value::String(id.0)
    }
}

impl From<&FileId> for Value {
    fn from(id: &FileId) -> Self {
        id.to_value()
    }
}
