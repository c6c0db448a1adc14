use std::io::Cursor;
use std::sync::Arc;

use cos_backend::{Backend, FindOptions, IndexOrder, IndexSpec};
use cos_types::{fields, Document, FileId, Filter, Projection};
use tokio::io::{AsyncRead, AsyncSeek};
use tracing::debug;

use crate::concern::{WriteConcernResolver, WriteOptions};
use crate::config::StoreConfig;
use crate::cursor::{Enumerator, FileCursor};
use crate::error::{StoreError, StoreResult};
use crate::file::{FileBinding, StoredFile};
use crate::indexes::IndexLifecycle;
use crate::metadata::{validate_metadata, FileRecord, MetadataWriter};
use crate::remover::{RemoveSummary, Remover};
use crate::writer::ChunkWriter;

/// Per-call options for [`ChunkStore::put`].
#[derive(Clone, Debug, Default)]
pub struct PutOptions {
    /// Use this id instead of generating one.
    pub id: Option<FileId>,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    /// Overrides the configured chunk size for this file.
    pub chunk_size: Option<usize>,
    /// Caller metadata stored at the top level of the metadata document.
    pub metadata: Document,
    pub write: WriteOptions,
}

impl PutOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: FileId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    /// Add one caller metadata field.
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn write_options(mut self, write: WriteOptions) -> Self {
        self.write = write;
        self
    }
}

/// A chunked object store over one pair of collections.
///
/// Files are written as ordered chunks into `<prefix>.chunks` and committed
/// by one metadata document in `<prefix>.files`. Cheap to clone; share
/// freely across tasks.
#[derive(Clone)]
pub struct ChunkStore {
    backend: Arc<dyn Backend>,
    config: StoreConfig,
    resolver: WriteConcernResolver,
    indexes: IndexLifecycle,
    writer: ChunkWriter,
    metadata: MetadataWriter,
    remover: Remover,
    enumerator: Enumerator,
}

impl ChunkStore {
    /// Validate `config`, wire up the components and ensure the indexes.
    pub async fn open(backend: Arc<dyn Backend>, config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let files = config.files_collection();
        let chunks = config.chunks_collection();

        let indexes = IndexLifecycle::new(backend.clone(), files.clone(), chunks.clone());
        let binding = FileBinding::new(backend.clone(), chunks.clone(), config.read_preference);
        let store = Self {
            resolver: WriteConcernResolver::new(config.write_concern()),
            writer: ChunkWriter::new(backend.clone(), chunks.clone(), indexes.clone()),
            metadata: MetadataWriter::new(backend.clone(), files.clone()),
            remover: Remover::new(backend.clone(), files.clone(), chunks, config.read_preference),
            enumerator: Enumerator::new(backend.clone(), files, binding),
            indexes,
            backend,
            config,
        };
        store.indexes.ensure_indexes().await?;
        debug!(
            prefix = %store.config.collection_prefix,
            write_concern = %store.resolver.configured(),
            "store opened"
        );
        Ok(store)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Re-create the store's indexes if they are missing.
    pub async fn ensure_indexes(&self) -> StoreResult<()> {
        self.indexes.ensure_indexes().await
    }

    /// Index specs the store depends on that are currently absent.
    pub async fn verify_indexes(&self) -> StoreResult<Vec<IndexSpec>> {
        self.indexes.verify_indexes().await
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Store the contents of `stream` as a new file.
    ///
    /// Chunks are written first, verified against the server checksum when
    /// the write is acknowledged, and only then committed by the metadata
    /// document. The stream is rewound to its starting position afterwards.
    pub async fn put<R>(&self, stream: &mut R, options: PutOptions) -> StoreResult<FileId>
    where
        R: AsyncRead + AsyncSeek + Unpin + Send,
    {
        let concern = self.resolver.resolve(&options.write);
        let chunk_size = options.chunk_size.unwrap_or(self.config.chunk_size_bytes);
        validate_metadata(&options.metadata)?;
        let id = options.id.unwrap_or_else(FileId::generate);

        let outcome = self.writer.write(&id, stream, chunk_size, &concern).await?;
        let record = FileRecord {
            id,
            length: outcome.length,
            chunk_size,
            checksum: outcome.checksum,
            filename: options.filename,
            content_type: options.content_type,
            metadata: options.metadata,
        };
        self.metadata.finalize(&record, &concern).await
    }

    /// Store an in-memory buffer as a new file.
    pub async fn put_bytes(&self, data: &[u8], options: PutOptions) -> StoreResult<FileId> {
        self.put(&mut Cursor::new(data), options).await
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// The file with the given id.
    pub async fn get(&self, id: &FileId) -> StoreResult<StoredFile> {
        self.find_one(&Filter::by_id(id))
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("file {id}")))
    }

    /// The first file matching `filter`, if any.
    pub async fn find_one(&self, filter: &Filter) -> StoreResult<Option<StoredFile>> {
        let options = FindOptions::with_read_preference(self.config.read_preference).limit(1);
        self.enumerator.list_with(filter, &options).await?.next().await.transpose()
    }

    /// Lazily enumerate every file matching `filter`.
    pub async fn find(&self, filter: &Filter) -> StoreResult<FileCursor> {
        self.enumerator.list(filter).await
    }

    /// Whether any file matches `filter`.
    pub async fn exists(&self, filter: &Filter) -> StoreResult<bool> {
        let options = FindOptions::with_read_preference(self.config.read_preference)
            .projection(Projection::id_only());
        let found = self
            .backend
            .find_one(&self.config.files_collection(), filter, &options)
            .await?;
        Ok(found.is_some())
    }

    /// The most recently created file with the given name.
    pub async fn get_last_version(&self, filename: &str) -> StoreResult<StoredFile> {
        let options = FindOptions::with_read_preference(self.config.read_preference)
            .sort(fields::CREATED_AT, IndexOrder::Descending)
            .limit(1);
        self.enumerator
            .list_with(&Filter::by_filename(filename), &options)
            .await?
            .next()
            .await
            .transpose()?
            .ok_or_else(|| StoreError::NotFound(format!("no file named {filename:?}")))
    }

    // -----------------------------------------------------------------------
    // Removal
    // -----------------------------------------------------------------------

    /// Remove the file with the given id.
    pub async fn delete(&self, id: &FileId, options: WriteOptions) -> StoreResult<()> {
        self.remove_one(&Filter::by_id(id), options).await.map(|_| ())
    }

    /// Remove the first file matching `filter`; chunks go before metadata.
    pub async fn remove_one(&self, filter: &Filter, options: WriteOptions) -> StoreResult<FileId> {
        let concern = self.resolver.resolve(&options);
        self.remover.remove_one(filter, &concern).await
    }

    /// Remove every file matching `filter`.
    pub async fn remove_many(
        &self,
        filter: &Filter,
        options: WriteOptions,
    ) -> StoreResult<RemoveSummary> {
        let concern = self.resolver.resolve(&options);
        self.remover.remove_many(filter, &concern).await
    }

    /// Drop both collections and restore their indexes.
    pub async fn drop_all(&self) -> StoreResult<()> {
        self.remover.drop_all(&self.indexes).await
    }
}

impl std::fmt::Debug for ChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStore")
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cos_backend::{Fault, InMemoryBackend};
    use cos_types::{Checksum, WriteConcern};

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    async fn open(backend: &Arc<InMemoryBackend>) -> ChunkStore {
        ChunkStore::open(backend.clone(), StoreConfig::default()).await.unwrap()
    }

    async fn reassemble(file: &StoredFile) -> Vec<u8> {
        file.chunks().await.unwrap().into_iter().flat_map(|c| c.data).collect()
    }

    // -----------------------------------------------------------------------
    // Opening
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn open_creates_indexes_idempotently() {
        let backend = Arc::new(InMemoryBackend::new());
        open(&backend).await;
        open(&backend).await;
        assert_eq!(backend.indexes("fs.files"), vec![IndexLifecycle::files_index()]);
        assert_eq!(backend.indexes("fs.chunks"), vec![IndexLifecycle::chunks_index()]);
    }

    #[tokio::test]
    async fn open_rejects_invalid_config() {
        let backend = Arc::new(InMemoryBackend::new());
        let err = ChunkStore::open(backend, StoreConfig::default().with_chunk_size(0))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn custom_prefix_names_collections() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = ChunkStore::open(backend.clone(), StoreConfig::with_prefix("media"))
            .await
            .unwrap();
        store.put_bytes(b"abc", PutOptions::new()).await.unwrap();
        assert_eq!(backend.document_count("media.files"), 1);
        assert_eq!(backend.chunk_count("media.chunks"), 1);
        assert_eq!(backend.document_count("fs.files"), 0);
    }

    // -----------------------------------------------------------------------
    // Put
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn put_700000_bytes_at_default_chunk_size() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = open(&backend).await;
        let data = payload(700_000);

        let id = store
            .put_bytes(&data, PutOptions::new().filename("big.bin"))
            .await
            .unwrap();

        let sizes: Vec<usize> = backend.chunks_of("fs.chunks", &id).iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![261_120, 261_120, 177_760]);

        let docs = backend.documents("fs.files");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["length"], 700_000);
        assert_eq!(docs[0]["chunkSize"], 261_120);
        assert_eq!(docs[0]["filename"], "big.bin");
        assert_eq!(docs[0]["checksum"], Checksum::of(&data).to_hex());
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = open(&backend).await;
        let data = payload(1000);

        let id = store
            .put_bytes(
                &data,
                PutOptions::new()
                    .chunk_size(64)
                    .content_type("application/octet-stream")
                    .meta("owner", "ops"),
            )
            .await
            .unwrap();

        let file = store.get(&id).await.unwrap();
        assert_eq!(file.length(), 1000);
        assert_eq!(file.chunk_size(), 64);
        assert_eq!(file.chunk_count(), 16);
        assert_eq!(file.content_type(), Some("application/octet-stream"));
        assert_eq!(file.metadata()["owner"], "ops");
        assert_eq!(file.checksum(), Some(&Checksum::of(&data)));
        assert_eq!(reassemble(&file).await, data);
    }

    #[tokio::test]
    async fn put_rewinds_the_source_stream() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = open(&backend).await;
        let mut stream = Cursor::new(payload(100));
        stream.set_position(10);

        let id = store.put(&mut stream, PutOptions::new().chunk_size(32)).await.unwrap();
        assert_eq!(stream.position(), 10);
        assert_eq!(store.get(&id).await.unwrap().length(), 90);
    }

    #[tokio::test]
    async fn empty_source_stores_zero_chunks() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = open(&backend).await;
        let id = store.put_bytes(&[], PutOptions::new()).await.unwrap();
        let file = store.get(&id).await.unwrap();
        assert_eq!(file.length(), 0);
        assert_eq!(file.chunk_count(), 0);
        assert!(file.chunks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn caller_id_is_used_and_duplicates_rejected() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = open(&backend).await;
        let id = FileId::new("fixed").unwrap();

        let stored = store.put_bytes(b"one", PutOptions::new().id(id.clone())).await.unwrap();
        assert_eq!(stored, id);

        let err = store
            .put_bytes(b"two", PutOptions::new().id(id.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
        assert_eq!(backend.document_count("fs.files"), 1);
    }

    #[tokio::test]
    async fn invalid_metadata_writes_nothing() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = open(&backend).await;
        let err = store
            .put_bytes(b"abc", PutOptions::new().meta("$bad", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
        assert_eq!(backend.chunk_count("fs.chunks"), 0);
        assert_eq!(backend.document_count("fs.files"), 0);
    }

    #[tokio::test]
    async fn oversized_chunk_size_is_rejected() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = open(&backend).await;
        let err = store
            .put_bytes(b"abc", PutOptions::new().chunk_size(usize::MAX))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    // -----------------------------------------------------------------------
    // Write concern
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn unacknowledged_put_skips_verification() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = open(&backend).await;
        backend.inject(Fault::CorruptChecksum);

        let id = store
            .put_bytes(b"hello", PutOptions::new().write_options(WriteOptions::safe(false)))
            .await
            .unwrap();
        let file = store.get(&id).await.unwrap();
        assert!(file.checksum().is_none());
        // The corrupt checksum was never requested.
        assert_eq!(backend.pending_faults(), 1);
    }

    #[tokio::test]
    async fn configured_unacknowledged_concern_applies_by_default() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = ChunkStore::open(backend.clone(), StoreConfig::default().with_safe(false))
            .await
            .unwrap();
        let id = store.put_bytes(b"hello", PutOptions::new()).await.unwrap();
        assert!(store.get(&id).await.unwrap().checksum().is_none());

        let id = store
            .put_bytes(
                b"hello",
                PutOptions::new().write_options(WriteOptions::concern(WriteConcern::MAJORITY)),
            )
            .await
            .unwrap();
        assert!(store.get(&id).await.unwrap().checksum().is_some());
    }

    // -----------------------------------------------------------------------
    // Integrity verification
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn checksum_mismatch_leaves_nothing_behind() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = open(&backend).await;
        backend.inject(Fault::CorruptChecksum);

        let err = store
            .put_bytes(&payload(500), PutOptions::new().chunk_size(100))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::IntegrityMismatch { cleanup_error: None, .. }
        ));
        assert_eq!(backend.chunk_count("fs.chunks"), 0);
        assert_eq!(backend.document_count("fs.files"), 0);
    }

    #[tokio::test]
    async fn dropped_chunk_index_is_repaired_once() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = open(&backend).await;
        backend.drop_indexes("fs.chunks");

        let id = store.put_bytes(&payload(300), PutOptions::new()).await.unwrap();
        assert!(store.exists(&Filter::by_id(&id)).await.unwrap());
        assert_eq!(backend.indexes("fs.chunks"), vec![IndexLifecycle::chunks_index()]);
    }

    #[tokio::test]
    async fn repeated_missing_index_is_fatal() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = open(&backend).await;
        backend.inject(Fault::MissingIndex);
        backend.inject(Fault::MissingIndex);

        let err = store.put_bytes(&payload(300), PutOptions::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::BackendUnavailable(_)));
        assert_eq!(backend.document_count("fs.files"), 0);
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn get_missing_file_is_not_found() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = open(&backend).await;
        let err = store.get(&FileId::new("nope").unwrap()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(!store.exists(&Filter::all()).await.unwrap());
        assert!(store.find_one(&Filter::all()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_enumerates_by_filename() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = open(&backend).await;
        for name in ["a.txt", "b.txt", "a.txt"] {
            store.put_bytes(name.as_bytes(), PutOptions::new().filename(name)).await.unwrap();
        }
        let files = store
            .find(&Filter::by_filename("a.txt"))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.filename() == Some("a.txt")));
    }

    #[tokio::test]
    async fn last_version_is_newest() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = open(&backend).await;
        store.put_bytes(b"v1", PutOptions::new().filename("doc")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let newest = store.put_bytes(b"v2", PutOptions::new().filename("doc")).await.unwrap();

        let file = store.get_last_version("doc").await.unwrap();
        assert_eq!(file.id(), &newest);
        assert_eq!(reassemble(&file).await, b"v2");

        let err = store.get_last_version("other").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    // -----------------------------------------------------------------------
    // Removal
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn delete_removes_chunks_and_metadata() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = open(&backend).await;
        let id = store.put_bytes(&payload(300), PutOptions::new().chunk_size(100)).await.unwrap();

        store.delete(&id, WriteOptions::default()).await.unwrap();
        assert!(backend.chunks_of("fs.chunks", &id).is_empty());
        assert!(matches!(store.get(&id).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn remove_many_by_metadata_field() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = open(&backend).await;
        for tag in ["tmp", "tmp", "keep"] {
            store.put_bytes(b"x", PutOptions::new().meta("tag", tag)).await.unwrap();
        }
        let summary = store
            .remove_many(&Filter::all().eq("tag", "tmp"), WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(summary.files_removed, 2);
        assert!(summary.is_clean());
        assert_eq!(backend.document_count("fs.files"), 1);
        assert_eq!(backend.chunk_count("fs.chunks"), 1);
    }

    #[tokio::test]
    async fn drop_all_clears_and_keeps_store_usable() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = open(&backend).await;
        store.put_bytes(b"x", PutOptions::new()).await.unwrap();

        store.drop_all().await.unwrap();
        assert_eq!(backend.document_count("fs.files"), 0);
        assert_eq!(backend.chunk_count("fs.chunks"), 0);

        let id = store.put_bytes(b"y", PutOptions::new()).await.unwrap();
        assert!(store.exists(&Filter::by_id(&id)).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_puts_with_distinct_ids_do_not_interfere() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = open(&backend).await;

        let mut tasks = Vec::new();
        for i in 0..16usize {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                let id = FileId::new(format!("file-{i}")).unwrap();
                let data = payload(500 + i * 37);
                store
                    .put_bytes(&data, PutOptions::new().id(id.clone()).chunk_size(64))
                    .await
                    .unwrap();
                (id, data)
            }));
        }

        for task in tasks {
            let (id, data) = task.await.unwrap();
            let file = store.get(&id).await.unwrap();
            assert_eq!(file.length(), data.len() as u64);
            assert_eq!(file.checksum(), Some(&Checksum::of(&data)));
            let chunks = file.chunks().await.unwrap();
            let numbers: Vec<u32> = chunks.iter().map(|c| c.n).collect();
            assert_eq!(numbers, (0..file.chunk_count() as u32).collect::<Vec<_>>());
            assert_eq!(reassemble(&file).await, data, "{id}");
        }
        assert_eq!(backend.document_count("fs.files"), 16);
    }

    #[tokio::test]
    async fn verify_indexes_reports_dropped_index() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = open(&backend).await;
        assert!(store.verify_indexes().await.unwrap().is_empty());
        backend.drop_indexes("fs.chunks");
        assert_eq!(
            store.verify_indexes().await.unwrap(),
            vec![IndexLifecycle::chunks_index()]
        );
    }

    #[test]
    fn store_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ChunkStore>();
    }
}
