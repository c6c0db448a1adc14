use std::sync::Arc;

use cos_backend::{Backend, IndexOrder, IndexSpec};
use cos_types::fields;
use tracing::info;

use crate::error::StoreResult;

/// Keeps the indexes the store's invariants depend on in place.
///
/// - metadata collection: non-unique `(filename, createdAt)` for lookups by name
/// - chunk collection: unique `(files_id, n)`, which both rejects duplicate
///   chunk positions and serves the server-side checksum
#[derive(Clone)]
pub struct IndexLifecycle {
    backend: Arc<dyn Backend>,
    files: String,
    chunks: String,
}

impl IndexLifecycle {
    pub fn new(backend: Arc<dyn Backend>, files: String, chunks: String) -> Self {
        Self {
            backend,
            files,
            chunks,
        }
    }

    /// Lookup index on the metadata collection.
    pub fn files_index() -> IndexSpec {
        IndexSpec::new([
            (fields::FILENAME, IndexOrder::Ascending),
            (fields::CREATED_AT, IndexOrder::Ascending),
        ])
    }

    /// Unique position index on the chunk collection.
    pub fn chunks_index() -> IndexSpec {
        IndexSpec::new([
            (fields::FILES_ID, IndexOrder::Ascending),
            (fields::N, IndexOrder::Ascending),
        ])
        .unique(true)
    }

    /// Create both indexes if absent. Idempotent.
    pub async fn ensure_indexes(&self) -> StoreResult<()> {
        self.backend
            .ensure_index(&self.files, &Self::files_index())
            .await?;
        self.backend
            .ensure_index(&self.chunks, &Self::chunks_index())
            .await?;
        info!(files = %self.files, chunks = %self.chunks, "indexes ensured");
        Ok(())
    }

    /// Check that both indexes exist without creating anything.
    ///
    /// Returns the specs that are absent, empty when the store is fully
    /// indexed.
    pub async fn verify_indexes(&self) -> StoreResult<Vec<IndexSpec>> {
        let mut missing = Vec::new();
        for (collection, spec) in [
            (&self.files, Self::files_index()),
            (&self.chunks, Self::chunks_index()),
        ] {
            let present = self.backend.list_indexes(collection).await?;
            if !present.contains(&spec) {
                missing.push(spec);
            }
        }
        Ok(missing)
    }
}

impl std::fmt::Debug for IndexLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexLifecycle")
            .field("files", &self.files)
            .field("chunks", &self.chunks)
            .finish()
    }
}
