use async_trait::async_trait;
use cos_types::{Checksum, Chunk, Document, FileId, Filter, Projection, ReadPreference, WriteConcern};

use crate::error::BackendResult;
use crate::index::{IndexOrder, IndexSpec};

/// Options for a metadata query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FindOptions {
    /// Restrict the returned fields.
    pub projection: Option<Projection>,
    /// Order results by one field.
    pub sort: Option<(String, IndexOrder)>,
    /// Return at most this many documents.
    pub limit: Option<usize>,
    /// Where to route the read.
    pub read_preference: ReadPreference,
}

impl FindOptions {
    /// Default options routed with the given read preference.
    pub fn with_read_preference(read_preference: ReadPreference) -> Self {
        Self {
            read_preference,
            ..Self::default()
        }
    }

    pub fn projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn sort(mut self, field: impl Into<String>, order: IndexOrder) -> Self {
        self.sort = Some((field.into(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Forward-only cursor over query results.
#[async_trait]
pub trait DocumentCursor: Send {
    /// Fetch the next document, or `None` when the cursor is exhausted.
    async fn next(&mut self) -> Option<BackendResult<Document>>;
}

/// Capabilities the chunked object store needs from a remote document store.
///
/// Implementations wrap a database driver; the store never sees the wire
/// protocol or document encoding. Invariants every implementation must hold:
/// - `ensure_index` is idempotent and safe under concurrent callers.
/// - Unique indexes are enforced on every acknowledged write.
/// - Write failures are only reported for acknowledged write concerns;
///   transport failures are always reported.
/// - `chunk_checksum` fails with [`BackendError::MissingIndex`] when the
///   `(files_id, n)` index of the chunk collection is absent.
///
/// [`BackendError::MissingIndex`]: crate::BackendError::MissingIndex
#[async_trait]
pub trait Backend: Send + Sync {
    /// Insert one metadata document. The document must carry `_id`.
    async fn insert_one(
        &self,
        collection: &str,
        document: Document,
        concern: &WriteConcern,
    ) -> BackendResult<()>;

    /// Insert one chunk.
    async fn insert_chunk(
        &self,
        collection: &str,
        chunk: Chunk,
        concern: &WriteConcern,
    ) -> BackendResult<()>;

    /// Query a metadata collection.
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> BackendResult<Box<dyn DocumentCursor>>;

    /// Query a metadata collection for its first match.
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> BackendResult<Option<Document>> {
        let options = options.clone().limit(1);
        let mut cursor = self.find(collection, filter, &options).await?;
        cursor.next().await.transpose()
    }

    /// All chunks of one file, ordered by sequence number.
    async fn find_chunks(
        &self,
        collection: &str,
        files_id: &FileId,
        read_preference: ReadPreference,
    ) -> BackendResult<Vec<Chunk>>;

    /// Delete the first matching document. Returns the number deleted
    /// (always 0 for unacknowledged writes).
    async fn delete_one(
        &self,
        collection: &str,
        filter: &Filter,
        concern: &WriteConcern,
    ) -> BackendResult<u64>;

    /// Delete every matching document. Returns the number deleted
    /// (always 0 for unacknowledged writes).
    async fn delete_many(
        &self,
        collection: &str,
        filter: &Filter,
        concern: &WriteConcern,
    ) -> BackendResult<u64>;

    /// Delete every chunk of one file. Returns the number deleted
    /// (always 0 for unacknowledged writes).
    async fn delete_chunks(
        &self,
        collection: &str,
        files_id: &FileId,
        concern: &WriteConcern,
    ) -> BackendResult<u64>;

    /// Create an index unless an identical one exists.
    async fn ensure_index(&self, collection: &str, spec: &IndexSpec) -> BackendResult<()>;

    /// Indexes currently defined on a collection.
    async fn list_indexes(&self, collection: &str) -> BackendResult<Vec<IndexSpec>>;

    /// Server-side checksum over the chunk sequence of one file.
    async fn chunk_checksum(&self, collection: &str, files_id: &FileId) -> BackendResult<Checksum>;

    /// Remove a collection with all its documents and indexes.
    async fn drop_collection(&self, collection: &str) -> BackendResult<()>;
}
