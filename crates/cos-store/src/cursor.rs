use std::sync::Arc;

use cos_backend::{Backend, DocumentCursor, FindOptions};
use cos_types::Filter;

use crate::error::StoreResult;
use crate::file::{FileBinding, StoredFile};

/// Lazy, forward-only sequence of file descriptors.
///
/// Backed by a backend cursor over the metadata collection; documents are
/// fetched and parsed one at a time. Not restartable.
pub struct FileCursor {
    inner: Box<dyn DocumentCursor>,
    binding: FileBinding,
}

impl FileCursor {
    /// The next descriptor, or `None` once the cursor is exhausted.
    pub async fn next(&mut self) -> Option<StoreResult<StoredFile>> {
        let document = match self.inner.next().await? {
            Ok(document) => document,
            Err(err) => return Some(Err(err.into())),
        };
        Some(StoredFile::from_document(document, self.binding.clone()))
    }

    /// Drain the cursor, stopping at the first error.
    pub async fn try_collect(mut self) -> StoreResult<Vec<StoredFile>> {
        let mut files = Vec::new();
        while let Some(file) = self.next().await {
            files.push(file?);
        }
        Ok(files)
    }
}

impl std::fmt::Debug for FileCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCursor")
            .field("chunks", &self.binding.chunks)
            .finish()
    }
}

/// Opens cursors over the metadata collection.
#[derive(Clone)]
pub struct Enumerator {
    backend: Arc<dyn Backend>,
    files: String,
    binding: FileBinding,
}

impl Enumerator {
    pub fn new(backend: Arc<dyn Backend>, files: String, binding: FileBinding) -> Self {
        Self {
            backend,
            files,
            binding,
        }
    }

    /// Every file matching `filter`, with the store's read preference.
    pub async fn list(&self, filter: &Filter) -> StoreResult<FileCursor> {
        let options = FindOptions::with_read_preference(self.binding.read_preference);
        self.list_with(filter, &options).await
    }

    /// Every file matching `filter`, with explicit query options.
    pub async fn list_with(&self, filter: &Filter, options: &FindOptions) -> StoreResult<FileCursor> {
        let inner = self.backend.find(&self.files, filter, options).await?;
        Ok(FileCursor {
            inner,
            binding: self.binding.clone(),
        })
    }
}
