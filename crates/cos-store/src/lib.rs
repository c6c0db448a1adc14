//! # cos-store
//!
//! Chunked object store over a remote document store.
//!
//! A file is split into fixed-size, ordered chunks held in one collection and
//! committed by a single metadata document in another. Readers only ever see
//! files whose metadata exists, and metadata is written only after every
//! chunk is persisted and, for acknowledged writes, verified against a
//! server-side checksum.
//!
//! ```text
//! put:    ChunkWriter ──► checksum check ──► MetadataWriter
//!                          │ MissingIndex
//!                          └─► IndexLifecycle (once) ─► retry
//! remove: chunks ──► metadata
//! ```
//!
//! The backing store is abstracted by [`cos_backend::Backend`];
//! [`cos_backend::InMemoryBackend`] serves tests and embedding.

pub mod concern;
pub mod config;
pub mod cursor;
pub mod error;
pub mod file;
pub mod indexes;
pub mod metadata;
pub mod remover;
pub mod store;
pub mod writer;

pub use concern::{WriteConcernResolver, WriteOptions};
pub use config::{StoreConfig, WriteConcernSetting, MAX_CHUNK_SIZE};
pub use cursor::{Enumerator, FileCursor};
pub use error::{StoreError, StoreResult};
pub use file::{FileBinding, StoredFile};
pub use indexes::IndexLifecycle;
pub use metadata::{FileRecord, MetadataWriter};
pub use remover::{RemoveSummary, Remover};
pub use store::{ChunkStore, PutOptions};
pub use writer::{ChunkWriter, WriteOutcome};
