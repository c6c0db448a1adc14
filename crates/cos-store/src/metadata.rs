use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use cos_backend::Backend;
use cos_types::{fields, Checksum, Document, FileId, WriteConcern};
use serde_json::Value;
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// Everything the metadata document of a finished write records.
#[derive(Clone, Debug, PartialEq)]
pub struct FileRecord {
    pub id: FileId,
    pub length: u64,
    pub chunk_size: usize,
    pub checksum: Option<Checksum>,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    /// Free-form caller metadata, merged at the top level.
    pub metadata: Document,
}

impl FileRecord {
    /// Build the metadata document as of `created_at`.
    ///
    /// Reserved fields are written last and always win over caller keys.
    pub fn to_document(&self, created_at: DateTime<Utc>) -> Document {
        let mut doc = Document::new();
        for (key, value) in &self.metadata {
            if fields::is_reserved(key) {
                debug!(file_id = %self.id, key = %key, "ignoring caller value for reserved field");
                continue;
            }
            doc.insert(key.clone(), value.clone());
        }
        if let Some(filename) = &self.filename {
            doc.insert(fields::FILENAME.into(), Value::String(filename.clone()));
        }
        if let Some(content_type) = &self.content_type {
            doc.insert(fields::CONTENT_TYPE.into(), Value::String(content_type.clone()));
        }
        doc.insert(fields::ID.into(), self.id.to_value());
        doc.insert(fields::LENGTH.into(), Value::from(self.length));
        doc.insert(fields::CHUNK_SIZE.into(), Value::from(self.chunk_size as u64));
        doc.insert(
            fields::CREATED_AT.into(),
            Value::String(format_timestamp(created_at)),
        );
        if let Some(checksum) = &self.checksum {
            doc.insert(fields::CHECKSUM.into(), Value::String(checksum.to_hex()));
        }
        doc
    }
}

/// Timestamps are stored as fixed-width RFC 3339 so they sort as strings.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Reject caller metadata the backing store could not index or query.
pub fn validate_metadata(metadata: &Document) -> StoreResult<()> {
    for key in metadata.keys() {
        if key.is_empty() {
            return Err(StoreError::InvalidArgument(
                "metadata keys must not be empty".into(),
            ));
        }
        if key.starts_with('$') || key.contains('.') || key.contains('\0') {
            return Err(StoreError::InvalidArgument(format!(
                "metadata key {key:?} must not start with '$' or contain '.'"
            )));
        }
    }
    Ok(())
}

/// Writes the metadata document that commits a file.
#[derive(Clone)]
pub struct MetadataWriter {
    backend: Arc<dyn Backend>,
    files: String,
}

impl MetadataWriter {
    pub fn new(backend: Arc<dyn Backend>, files: String) -> Self {
        Self { backend, files }
    }

    /// Insert the metadata document, making the file visible to readers.
    ///
    /// Must only run after every chunk is written and verified.
    pub async fn finalize(&self, record: &FileRecord, concern: &WriteConcern) -> StoreResult<FileId> {
        validate_metadata(&record.metadata)?;
        let document = record.to_document(Utc::now());
        self.backend
            .insert_one(&self.files, document, concern)
            .await?;
        debug!(file_id = %record.id, length = record.length, "file finalized");
        Ok(record.id.clone())
    }
}
