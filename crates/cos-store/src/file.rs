use std::sync::Arc;

use chrono::{DateTime, Utc};
use cos_backend::Backend;
use cos_types::{chunk_count, fields, Checksum, Chunk, Document, FileId, ReadPreference};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};

/// Handle to the chunk collection a descriptor reads from.
#[derive(Clone)]
pub struct FileBinding {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) chunks: String,
    pub(crate) read_preference: ReadPreference,
}

impl FileBinding {
    pub fn new(backend: Arc<dyn Backend>, chunks: String, read_preference: ReadPreference) -> Self {
        Self {
            backend,
            chunks,
            read_preference,
        }
    }
}

/// Descriptor of a stored file, bound to the store it came from.
///
/// Exposes the metadata document and the file's ordered chunk sequence;
/// turning chunks back into a byte stream is left to the caller.
#[derive(Clone)]
pub struct StoredFile {
    id: FileId,
    length: u64,
    chunk_size: usize,
    checksum: Option<Checksum>,
    created_at: DateTime<Utc>,
    document: Document,
    binding: FileBinding,
}

impl StoredFile {
    /// Parse a metadata document.
    pub fn from_document(document: Document, binding: FileBinding) -> StoreResult<Self> {
        let raw_id = document
            .get(fields::ID)
            .map(Value::to_string)
            .unwrap_or_else(|| "<missing _id>".into());
        let corrupt = |reason: String| StoreError::CorruptDocument {
            id: raw_id.clone(),
            reason,
        };

        let id = document
            .get(fields::ID)
            .and_then(FileId::from_value)
            .ok_or_else(|| corrupt("_id is missing or not a non-empty string".into()))?;
        let length = document
            .get(fields::LENGTH)
            .and_then(Value::as_u64)
            .ok_or_else(|| corrupt("length is missing or not an unsigned integer".into()))?;
        let chunk_size = document
            .get(fields::CHUNK_SIZE)
            .and_then(Value::as_u64)
            .filter(|size| *size > 0)
            .ok_or_else(|| corrupt("chunkSize is missing or not a positive integer".into()))?
            as usize;
        let created_at = document
            .get(fields::CREATED_AT)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .ok_or_else(|| corrupt("createdAt is missing or not an RFC 3339 timestamp".into()))?;
        let checksum = match document.get(fields::CHECKSUM) {
            None | Some(Value::Null) => None,
            Some(Value::String(hex)) => Some(
                Checksum::from_hex(hex).map_err(|e| corrupt(format!("checksum: {e}")))?,
            ),
            Some(_) => return Err(corrupt("checksum is not a string".into())),
        };

        Ok(Self {
            id,
            length,
            chunk_size,
            checksum,
            created_at,
            document,
            binding,
        })
    }

    pub fn id(&self) -> &FileId {
        &self.id
    }

    /// Total length in bytes.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Chunk size the file was written with.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of chunks the file occupies.
    pub fn chunk_count(&self) -> u64 {
        chunk_count(self.length, self.chunk_size)
    }

    /// Content checksum; absent for files written without acknowledgment.
    pub fn checksum(&self) -> Option<&Checksum> {
        self.checksum.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn filename(&self) -> Option<&str> {
        self.document.get(fields::FILENAME).and_then(Value::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.document.get(fields::CONTENT_TYPE).and_then(Value::as_str)
    }

    /// Caller-supplied metadata: every field that is neither reserved nor
    /// one of `filename` / `contentType`.
    pub fn metadata(&self) -> Document {
        self.document
            .iter()
            .filter(|(key, _)| {
                !fields::is_reserved(key)
                    && key.as_str() != fields::FILENAME
                    && key.as_str() != fields::CONTENT_TYPE
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// The raw metadata document.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Fetch this file's chunks, ordered by sequence number.
    pub async fn chunks(&self) -> StoreResult<Vec<Chunk>> {
        let chunks = self
            .binding
            .backend
            .find_chunks(&self.binding.chunks, &self.id, self.binding.read_preference)
            .await?;
        Ok(chunks)
    }
}

impl std::fmt::Debug for StoredFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredFile")
            .field("id", &self.id)
            .field("length", &self.length)
            .field("chunk_size", &self.chunk_size)
            .field("checksum", &self.checksum)
            .field("created_at", &self.created_at)
            .finish()
    }
}
