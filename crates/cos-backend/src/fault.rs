use cos_types::FileId;

/// A one-shot failure injected into [`InMemoryBackend`].
///
/// Each injected fault fires on the first matching operation and is then
/// consumed. Injecting the same fault twice makes two operations fail.
///
/// [`InMemoryBackend`]: crate::InMemoryBackend
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fault {
    /// The next checksum request reports a missing chunk index.
    MissingIndex,
    /// The next checksum request returns a digest that disagrees with the
    /// stored chunks.
    CorruptChecksum,
    /// The next checksum request fails with a transport error.
    ChecksumUnavailable,
    /// The next chunk insert with this sequence number fails.
    InsertChunk { n: u32 },
    /// The next chunk delete fails, for the given file or for any file.
    DeleteChunks { files_id: Option<FileId> },
    /// The next metadata `delete_one` / `delete_many` fails.
    DeleteDocuments,
    /// The next `ensure_index` call fails.
    EnsureIndex,
}

impl Fault {
    /// Fail the next chunk delete of one specific file.
    pub fn delete_chunks_of(files_id: &FileId) -> Self {
        Self::DeleteChunks {
            files_id: Some(files_id.clone()),
        }
    }

    /// Fail the next chunk delete regardless of file.
    pub fn delete_any_chunks() -> Self {
        Self::DeleteChunks { files_id: None }
    }

    pub(crate) fn fires_on_delete_chunks(&self, target: &FileId) -> bool {
        match self {
            Self::DeleteChunks { files_id: None } => true,
            Self::DeleteChunks { files_id: Some(id) } => id == target,
            _ => false,
        }
    }
}
