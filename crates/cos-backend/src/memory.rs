use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use cos_types::{
    fields, Checksum, ChecksumHasher, Chunk, Document, FileId, Filter, ReadPreference,
    WriteConcern,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{BackendError, BackendResult};
use crate::fault::Fault;
use crate::index::{IndexOrder, IndexSpec};
use crate::traits::{Backend, DocumentCursor, FindOptions};

/// In-memory document store.
///
/// Intended for tests and embedding. Collections live behind a `RwLock`;
/// documents and chunks are cloned on read/write. Behaves like a single-node
/// deployment: read preferences are accepted and ignored, unique indexes are
/// enforced, and unacknowledged writes swallow their own failures.
///
/// Failures can be scripted with [`InMemoryBackend::inject`].
pub struct InMemoryBackend {
    state: RwLock<BackendState>,
    faults: Mutex<Vec<Fault>>,
}

#[derive(Default)]
struct BackendState {
    documents: HashMap<String, Vec<Document>>,
    chunks: HashMap<String, Vec<Chunk>>,
    indexes: HashMap<String, Vec<IndexSpec>>,
}

impl InMemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(BackendState::default()),
            faults: Mutex::new(Vec::new()),
        }
    }

    /// Queue a one-shot failure.
    pub fn inject(&self, fault: Fault) {
        self.faults.lock().expect("lock poisoned").push(fault);
    }

    /// Number of injected faults that have not fired yet.
    pub fn pending_faults(&self) -> usize {
        self.faults.lock().expect("lock poisoned").len()
    }

    /// Snapshot of every document in a collection, in insertion order.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        let state = self.state.read().expect("lock poisoned");
        state.documents.get(collection).cloned().unwrap_or_default()
    }

    /// Number of documents in a collection.
    pub fn document_count(&self, collection: &str) -> usize {
        let state = self.state.read().expect("lock poisoned");
        state.documents.get(collection).map_or(0, Vec::len)
    }

    /// Number of chunks in a chunk collection.
    pub fn chunk_count(&self, collection: &str) -> usize {
        let state = self.state.read().expect("lock poisoned");
        state.chunks.get(collection).map_or(0, Vec::len)
    }

    /// Chunks of one file ordered by sequence number.
    pub fn chunks_of(&self, collection: &str, files_id: &FileId) -> Vec<Chunk> {
        let state = self.state.read().expect("lock poisoned");
        state.chunks_of(collection, files_id)
    }

    /// Indexes currently defined on a collection.
    pub fn indexes(&self, collection: &str) -> Vec<IndexSpec> {
        let state = self.state.read().expect("lock poisoned");
        state.indexes.get(collection).cloned().unwrap_or_default()
    }

    /// Remove every index of a collection, keeping its data.
    pub fn drop_indexes(&self, collection: &str) {
        let mut state = self.state.write().expect("lock poisoned");
        state.indexes.remove(collection);
    }

    fn take_fault(&self, fires: impl Fn(&Fault) -> bool) -> bool {
        let mut faults = self.faults.lock().expect("lock poisoned");
        match faults.iter().position(fires) {
            Some(pos) => {
                let fault = faults.remove(pos);
                debug!(?fault, "injected fault fired");
                true
            }
            None => false,
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendState {
    fn chunks_of(&self, collection: &str, files_id: &FileId) -> Vec<Chunk> {
        let mut chunks: Vec<Chunk> = self
            .chunks
            .get(collection)
            .map(|all| all.iter().filter(|c| &c.files_id == files_id).cloned().collect())
            .unwrap_or_default();
        chunks.sort_by_key(|c| c.n);
        chunks
    }

    fn unique_indexes(&self, collection: &str) -> Vec<IndexSpec> {
        self.indexes
            .get(collection)
            .map(|specs| specs.iter().filter(|s| s.unique).cloned().collect())
            .unwrap_or_default()
    }

    fn insert_document(&mut self, collection: &str, document: Document) -> BackendResult<()> {
        let unique = self.unique_indexes(collection);
        let docs = self.documents.entry(collection.to_string()).or_default();
        let id = document.get(fields::ID);
        if docs.iter().any(|d| d.get(fields::ID) == id) {
            return Err(BackendError::DuplicateKey {
                collection: collection.to_string(),
                key: format!("_id: {}", id.cloned().unwrap_or(Value::Null)),
            });
        }
        for spec in &unique {
            let key = key_tuple(spec, |f| document.get(f).cloned().unwrap_or(Value::Null));
            if docs
                .iter()
                .any(|d| key_tuple(spec, |f| d.get(f).cloned().unwrap_or(Value::Null)) == key)
            {
                return Err(duplicate(collection, spec, &key));
            }
        }
        docs.push(document);
        Ok(())
    }

    fn insert_chunk(&mut self, collection: &str, chunk: Chunk) -> BackendResult<()> {
        let unique = self.unique_indexes(collection);
        let chunks = self.chunks.entry(collection.to_string()).or_default();
        for spec in &unique {
            let key = key_tuple(spec, |f| chunk_field(&chunk, f));
            if chunks
                .iter()
                .any(|c| key_tuple(spec, |f| chunk_field(c, f)) == key)
            {
                return Err(duplicate(collection, spec, &key));
            }
        }
        chunks.push(chunk);
        Ok(())
    }

    /// Fails if existing data already violates a unique index.
    fn check_unique_build(&self, collection: &str, spec: &IndexSpec) -> BackendResult<()> {
        let mut keys: Vec<Vec<Value>> = Vec::new();
        if let Some(docs) = self.documents.get(collection) {
            keys.extend(
                docs.iter()
                    .map(|d| key_tuple(spec, |f| d.get(f).cloned().unwrap_or(Value::Null))),
            );
        }
        if let Some(chunks) = self.chunks.get(collection) {
            keys.extend(chunks.iter().map(|c| key_tuple(spec, |f| chunk_field(c, f))));
        }
        for (i, key) in keys.iter().enumerate() {
            if keys[i + 1..].contains(key) {
                return Err(duplicate(collection, spec, key));
            }
        }
        Ok(())
    }
}

fn key_tuple(spec: &IndexSpec, get: impl Fn(&str) -> Value) -> Vec<Value> {
    spec.field_names().map(get).collect()
}

fn chunk_field(chunk: &Chunk, field: &str) -> Value {
    match field {
        fields::FILES_ID => chunk.files_id.to_value(),
        fields::N => Value::from(chunk.n),
        _ => Value::Null,
    }
}

fn duplicate(collection: &str, spec: &IndexSpec, key: &[Value]) -> BackendError {
    let key = spec
        .field_names()
        .zip(key)
        .map(|(f, v)| format!("{f}: {v}"))
        .collect::<Vec<_>>()
        .join(", ");
    BackendError::DuplicateKey {
        collection: collection.to_string(),
        key: format!("{} {{ {key} }}", spec.name),
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            x.as_f64().partial_cmp(&y.as_f64()).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// Report write results only to callers that asked for acknowledgment.
fn acknowledge<T: Default>(result: BackendResult<T>, concern: &WriteConcern) -> BackendResult<T> {
    if concern.is_acknowledged() {
        return result;
    }
    if let Err(err) = result {
        debug!(error = %err, "unacknowledged write failed");
    }
    Ok(T::default())
}

fn injected(operation: &str) -> BackendError {
    BackendError::Unavailable(format!("injected fault during {operation}"))
}

/// Cursor over a snapshot of query results taken when the query ran.
struct SnapshotCursor {
    documents: std::vec::IntoIter<Document>,
}

#[async_trait]
impl DocumentCursor for SnapshotCursor {
    async fn next(&mut self) -> Option<BackendResult<Document>> {
        self.documents.next().map(Ok)
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn insert_one(
        &self,
        collection: &str,
        document: Document,
        concern: &WriteConcern,
    ) -> BackendResult<()> {
        if !document.contains_key(fields::ID) {
            return Err(BackendError::InvalidDocument {
                collection: collection.to_string(),
                reason: "missing _id".into(),
            });
        }
        let mut state = self.state.write().expect("lock poisoned");
        acknowledge(state.insert_document(collection, document), concern)
    }

    async fn insert_chunk(
        &self,
        collection: &str,
        chunk: Chunk,
        concern: &WriteConcern,
    ) -> BackendResult<()> {
        let n = chunk.n;
        if self.take_fault(|f| *f == Fault::InsertChunk { n }) {
            return Err(injected("chunk insert"));
        }
        let mut state = self.state.write().expect("lock poisoned");
        acknowledge(state.insert_chunk(collection, chunk), concern)
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> BackendResult<Box<dyn DocumentCursor>> {
        let state = self.state.read().expect("lock poisoned");
        let mut matched: Vec<Document> = state
            .documents
            .get(collection)
            .map(|docs| docs.iter().filter(|d| filter.matches(d)).cloned().collect())
            .unwrap_or_default();
        drop(state);

        if let Some((field, order)) = &options.sort {
            match order {
                IndexOrder::Ascending => {
                    matched.sort_by(|a, b| compare_values(a.get(field), b.get(field)));
                }
                IndexOrder::Descending => {
                    // Newest insertion first among equal keys.
                    matched.reverse();
                    matched.sort_by(|a, b| compare_values(b.get(field), a.get(field)));
                }
            }
        }
        if let Some(limit) = options.limit {
            matched.truncate(limit);
        }
        if let Some(projection) = &options.projection {
            matched = matched.iter().map(|d| projection.apply(d)).collect();
        }

        Ok(Box::new(SnapshotCursor {
            documents: matched.into_iter(),
        }))
    }

    async fn find_chunks(
        &self,
        collection: &str,
        files_id: &FileId,
        _read_preference: ReadPreference,
    ) -> BackendResult<Vec<Chunk>> {
        Ok(self.chunks_of(collection, files_id))
    }

    async fn delete_one(
        &self,
        collection: &str,
        filter: &Filter,
        concern: &WriteConcern,
    ) -> BackendResult<u64> {
        if self.take_fault(|f| *f == Fault::DeleteDocuments) {
            return Err(injected("document delete"));
        }
        let mut state = self.state.write().expect("lock poisoned");
        let deleted = match state.documents.get_mut(collection) {
            Some(docs) => match docs.iter().position(|d| filter.matches(d)) {
                Some(pos) => {
                    docs.remove(pos);
                    1
                }
                None => 0,
            },
            None => 0,
        };
        acknowledge(Ok(deleted), concern)
    }

    async fn delete_many(
        &self,
        collection: &str,
        filter: &Filter,
        concern: &WriteConcern,
    ) -> BackendResult<u64> {
        if self.take_fault(|f| *f == Fault::DeleteDocuments) {
            return Err(injected("document delete"));
        }
        let mut state = self.state.write().expect("lock poisoned");
        let deleted = match state.documents.get_mut(collection) {
            Some(docs) => {
                let before = docs.len();
                docs.retain(|d| !filter.matches(d));
                (before - docs.len()) as u64
            }
            None => 0,
        };
        acknowledge(Ok(deleted), concern)
    }

    async fn delete_chunks(
        &self,
        collection: &str,
        files_id: &FileId,
        concern: &WriteConcern,
    ) -> BackendResult<u64> {
        if self.take_fault(|f| f.fires_on_delete_chunks(files_id)) {
            return Err(injected("chunk delete"));
        }
        let mut state = self.state.write().expect("lock poisoned");
        let deleted = match state.chunks.get_mut(collection) {
            Some(chunks) => {
                let before = chunks.len();
                chunks.retain(|c| &c.files_id != files_id);
                (before - chunks.len()) as u64
            }
            None => 0,
        };
        acknowledge(Ok(deleted), concern)
    }

    async fn ensure_index(&self, collection: &str, spec: &IndexSpec) -> BackendResult<()> {
        if self.take_fault(|f| *f == Fault::EnsureIndex) {
            return Err(injected("index creation"));
        }
        let mut state = self.state.write().expect("lock poisoned");
        if let Some(existing) = state
            .indexes
            .get(collection)
            .and_then(|specs| specs.iter().find(|s| s.name == spec.name))
        {
            if existing == spec {
                return Ok(());
            }
            return Err(BackendError::IndexConflict {
                collection: collection.to_string(),
                name: spec.name.clone(),
            });
        }
        if spec.unique {
            state.check_unique_build(collection, spec)?;
        }
        state
            .indexes
            .entry(collection.to_string())
            .or_default()
            .push(spec.clone());
        info!(collection, index = %spec, "index created");
        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> BackendResult<Vec<IndexSpec>> {
        Ok(self.indexes(collection))
    }

    async fn chunk_checksum(&self, collection: &str, files_id: &FileId) -> BackendResult<Checksum> {
        if self.take_fault(|f| *f == Fault::ChecksumUnavailable) {
            return Err(injected("checksum"));
        }
        let missing = || BackendError::MissingIndex {
            collection: collection.to_string(),
            index: format!("{}_1_{}_1", fields::FILES_ID, fields::N),
        };
        if self.take_fault(|f| *f == Fault::MissingIndex) {
            return Err(missing());
        }

        let state = self.state.read().expect("lock poisoned");
        let indexed = state
            .indexes
            .get(collection)
            .is_some_and(|specs| specs.iter().any(|s| s.covers(&[fields::FILES_ID, fields::N])));
        if !indexed {
            return Err(missing());
        }
        let chunks = state.chunks_of(collection, files_id);
        drop(state);

        let mut hasher = ChecksumHasher::new();
        for chunk in &chunks {
            hasher.update(&chunk.data);
        }
        if self.take_fault(|f| *f == Fault::CorruptChecksum) {
            hasher.update(b"\0");
        }
        Ok(hasher.finalize())
    }

    async fn drop_collection(&self, collection: &str) -> BackendResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        state.documents.remove(collection);
        state.chunks.remove(collection);
        state.indexes.remove(collection);
        info!(collection, "collection dropped");
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read().expect("lock poisoned");
        let documents: usize = state.documents.values().map(Vec::len).sum();
        let chunks: usize = state.chunks.values().map(Vec::len).sum();
        f.debug_struct("InMemoryBackend")
            .field("document_count", &documents)
            .field("chunk_count", &chunks)
            .finish()
    }
}
