use std::sync::Arc;

use cos_backend::{Backend, FindOptions};
use cos_types::{fields, FileId, Filter, Projection, ReadPreference, WriteConcern};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::indexes::IndexLifecycle;

/// Outcome of a multi-file removal.
#[derive(Debug, Default)]
pub struct RemoveSummary {
    /// Metadata documents deleted by the final bulk delete.
    pub files_removed: u64,
    /// Files whose chunk delete failed. Their metadata was still included in
    /// the bulk delete, so any surviving chunks are orphans.
    pub chunk_failures: Vec<(FileId, StoreError)>,
}

impl RemoveSummary {
    /// Returns `true` if every chunk delete succeeded.
    pub fn is_clean(&self) -> bool {
        self.chunk_failures.is_empty()
    }
}

/// Deletes files, always removing a file's chunks before its metadata.
#[derive(Clone)]
pub struct Remover {
    backend: Arc<dyn Backend>,
    files: String,
    chunks: String,
    read_preference: ReadPreference,
}

impl Remover {
    pub fn new(
        backend: Arc<dyn Backend>,
        files: String,
        chunks: String,
        read_preference: ReadPreference,
    ) -> Self {
        Self {
            backend,
            files,
            chunks,
            read_preference,
        }
    }

    fn id_query(&self) -> FindOptions {
        FindOptions::with_read_preference(self.read_preference).projection(Projection::id_only())
    }

    /// Remove the first file matching `filter`.
    ///
    /// Fails with [`StoreError::NotFound`] if nothing matches. If the chunk
    /// delete fails the metadata is left untouched.
    pub async fn remove_one(&self, filter: &Filter, concern: &WriteConcern) -> StoreResult<FileId> {
        let document = self
            .backend
            .find_one(&self.files, filter, &self.id_query())
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("no file in {} matches {filter:?}", self.files)))?;
        let id = parse_id(&document)?;

        let chunks = self.backend.delete_chunks(&self.chunks, &id, concern).await?;
        self.backend
            .delete_one(&self.files, &Filter::by_id(&id), concern)
            .await?;
        debug!(file_id = %id, chunks, "file removed");
        Ok(id)
    }

    /// Remove every file matching `filter`.
    ///
    /// Chunks are deleted file by file as the cursor advances; a failed chunk
    /// delete is recorded and iteration continues. All visited metadata
    /// documents are then deleted in one bulk call. Matching nothing is not
    /// an error.
    pub async fn remove_many(
        &self,
        filter: &Filter,
        concern: &WriteConcern,
    ) -> StoreResult<RemoveSummary> {
        let mut cursor = self.backend.find(&self.files, filter, &self.id_query()).await?;
        let mut visited = Vec::new();
        let mut summary = RemoveSummary::default();
        let mut cursor_error = None;

        while let Some(next) = cursor.next().await {
            let id = match next.map_err(StoreError::from).and_then(|d| parse_id(&d)) {
                Ok(id) => id,
                Err(err) => {
                    cursor_error = Some(err);
                    break;
                }
            };
            if let Err(err) = self.backend.delete_chunks(&self.chunks, &id, concern).await {
                warn!(file_id = %id, error = %err, "chunk delete failed; chunks may be orphaned");
                summary.chunk_failures.push((id.clone(), err.into()));
            }
            visited.push(id);
        }

        // Files whose chunks were already visited lose their metadata even if
        // the cursor failed part way.
        if !visited.is_empty() {
            summary.files_removed = self
                .backend
                .delete_many(&self.files, &Filter::by_ids(&visited), concern)
                .await?;
        }
        if let Some(err) = cursor_error {
            return Err(err);
        }
        debug!(
            visited = visited.len(),
            removed = summary.files_removed,
            chunk_failures = summary.chunk_failures.len(),
            "files removed"
        );
        Ok(summary)
    }

    /// Delete both collections outright, then restore their indexes.
    pub async fn drop_all(&self, indexes: &IndexLifecycle) -> StoreResult<()> {
        self.backend.drop_collection(&self.chunks).await?;
        self.backend.drop_collection(&self.files).await?;
        info!(files = %self.files, chunks = %self.chunks, "collections dropped");
        indexes.ensure_indexes().await
    }
}

fn parse_id(document: &cos_types::Document) -> StoreResult<FileId> {
    document
        .get(fields::ID)
        .and_then(FileId::from_value)
        .ok_or_else(|| StoreError::CorruptDocument {
            id: document
                .get(fields::ID)
                .map(|v| v.to_string())
                .unwrap_or_else(|| "<missing _id>".into()),
            reason: "_id is missing or not a non-empty string".into(),
        })
}
