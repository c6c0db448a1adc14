use serde::{Deserialize, Serialize};

use crate::id::FileId;

/// Default chunk size: 255 KiB, small enough that a chunk plus its envelope
/// stays well under common document size limits.
pub const DEFAULT_CHUNK_SIZE: usize = 261_120;

/// One ordered slice of a stored file's bytes.
///
/// Chunks are keyed by `(files_id, n)`; that pair is unique across the chunk
/// collection. Every chunk of a file is exactly the file's chunk size long
/// except the last, which may be shorter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// The file this chunk belongs to.
    pub files_id: FileId,
    /// Zero-based position in the file.
    pub n: u32,
    /// Raw payload bytes.
    pub data: Vec<u8>,
}

impl Chunk {
    /// Create a chunk.
    pub fn new(files_id: FileId, n: u32, data: Vec<u8>) -> Self {
        Self { files_id, n, data }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Number of chunks a file of `length` bytes occupies at `chunk_size`.
pub fn chunk_count(length: u64, chunk_size: usize) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    length.div_ceil(chunk_size as u64)
}
