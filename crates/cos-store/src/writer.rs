use std::io::SeekFrom;
use std::sync::Arc;

use cos_backend::{Backend, BackendError};
use cos_types::{Checksum, ChecksumHasher, Chunk, FileId, WriteConcern};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tracing::{debug, warn};

use crate::config::validate_chunk_size;
use crate::error::{StoreError, StoreResult};
use crate::indexes::IndexLifecycle;

/// What a chunked write produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Bytes read from the source stream.
    pub length: u64,
    /// Chunks persisted.
    pub chunk_count: u32,
    /// Verified content checksum; `None` when the write was unacknowledged.
    pub checksum: Option<Checksum>,
}

/// Splits a stream into ordered chunks and verifies them end to end.
#[derive(Clone)]
pub struct ChunkWriter {
    backend: Arc<dyn Backend>,
    chunks: String,
    indexes: IndexLifecycle,
}

impl ChunkWriter {
    pub fn new(backend: Arc<dyn Backend>, chunks: String, indexes: IndexLifecycle) -> Self {
        Self {
            backend,
            chunks,
            indexes,
        }
    }

    /// Persist `stream` as chunks of `file_id`.
    ///
    /// Under an acknowledged concern the written chunks are checked against a
    /// server-side checksum; on mismatch they are deleted again and
    /// [`StoreError::IntegrityMismatch`] is returned. The stream is left at
    /// the position it had on entry, whatever the outcome; a write that
    /// succeeded but could not rewind fails with [`StoreError::Io`].
    pub async fn write<R>(
        &self,
        file_id: &FileId,
        stream: &mut R,
        chunk_size: usize,
        concern: &WriteConcern,
    ) -> StoreResult<WriteOutcome>
    where
        R: AsyncRead + AsyncSeek + Unpin + Send,
    {
        validate_chunk_size(chunk_size)?;
        let start = stream.stream_position().await?;
        let result = self
            .write_and_verify(file_id, stream, start, chunk_size, concern)
            .await;
        match (result, stream.seek(SeekFrom::Start(start)).await) {
            (result, Ok(_)) => result,
            (Ok(_), Err(err)) => {
                warn!(file_id = %file_id, error = %err, "failed to rewind source stream");
                Err(err.into())
            }
            (Err(original), Err(err)) => {
                warn!(file_id = %file_id, error = %err, "failed to rewind source stream");
                Err(original)
            }
        }
    }

    async fn write_and_verify<R>(
        &self,
        file_id: &FileId,
        stream: &mut R,
        start: u64,
        chunk_size: usize,
        concern: &WriteConcern,
    ) -> StoreResult<WriteOutcome>
    where
        R: AsyncRead + AsyncSeek + Unpin + Send,
    {
        let (length, chunk_count) = self
            .write_chunks(file_id, stream, chunk_size, concern)
            .await?;
        debug!(file_id = %file_id, length, chunk_count, "chunks written");

        if !concern.is_acknowledged() {
            return Ok(WriteOutcome {
                length,
                chunk_count,
                checksum: None,
            });
        }

        let server = self.server_checksum(file_id).await?;
        stream.seek(SeekFrom::Start(start)).await?;
        let local = local_checksum(stream).await?;

        if local != server {
            warn!(
                file_id = %file_id,
                local = %local.short_hex(),
                server = %server.short_hex(),
                "checksum mismatch; deleting written chunks"
            );
            let cleanup_error = match self
                .backend
                .delete_chunks(&self.chunks, file_id, concern)
                .await
            {
                Ok(_) => None,
                Err(err) => {
                    warn!(file_id = %file_id, error = %err, "chunk cleanup failed");
                    Some(err)
                }
            };
            return Err(StoreError::IntegrityMismatch {
                id: file_id.clone(),
                local,
                server,
                cleanup_error,
            });
        }

        debug!(file_id = %file_id, checksum = %local.short_hex(), "checksum verified");
        Ok(WriteOutcome {
            length,
            chunk_count,
            checksum: Some(local),
        })
    }

    async fn write_chunks<R>(
        &self,
        file_id: &FileId,
        stream: &mut R,
        chunk_size: usize,
        concern: &WriteConcern,
    ) -> StoreResult<(u64, u32)>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut length = 0u64;
        let mut n = 0u32;
        loop {
            let mut data = Vec::with_capacity(chunk_size);
            let read = (&mut *stream)
                .take(chunk_size as u64)
                .read_to_end(&mut data)
                .await?;
            if read == 0 {
                break;
            }
            length += read as u64;
            self.backend
                .insert_chunk(&self.chunks, Chunk::new(file_id.clone(), n, data), concern)
                .await?;
            n = n.checked_add(1).ok_or_else(|| {
                StoreError::InvalidArgument(format!(
                    "file {file_id} exceeds the maximum chunk count at chunk size {chunk_size}"
                ))
            })?;
            if read < chunk_size {
                break;
            }
        }
        Ok((length, n))
    }

    /// Ask the backend for its checksum, repairing a missing chunk index
    /// at most once.
    async fn server_checksum(&self, file_id: &FileId) -> StoreResult<Checksum> {
        match self.backend.chunk_checksum(&self.chunks, file_id).await {
            Ok(checksum) => Ok(checksum),
            Err(err @ BackendError::MissingIndex { .. }) => {
                warn!(file_id = %file_id, error = %err, "chunk index missing; repairing before retry");
                self.indexes.ensure_indexes().await?;
                self.backend
                    .chunk_checksum(&self.chunks, file_id)
                    .await
                    .map_err(|err| {
                        StoreError::BackendUnavailable(format!(
                            "checksum for {file_id} failed after index repair: {err}"
                        ))
                    })
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Checksum of everything from the stream's current position to its end.
async fn local_checksum<R>(stream: &mut R) -> StoreResult<Checksum>
where
    R: AsyncRead + Unpin + Send,
{
    let mut hasher = ChecksumHasher::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let read = stream.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hasher.finalize())
}
