//! Foundation types for the chunked object store (COS).
//!
//! Every other COS crate depends on `cos-types`.
//!
//! # Key Types
//!
//! - [`FileId`] -- identifier of a stored file (caller-supplied or UUID v7)
//! - [`Chunk`] -- one ordered slice of a file's bytes
//! - [`Checksum`] / [`ChecksumHasher`] -- domain-separated BLAKE3 content checksum
//! - [`Document`], [`Filter`], [`Projection`] -- schemaless documents and query criteria
//! - [`WriteConcern`] / [`ReadPreference`] -- per-operation durability and routing

pub mod checksum;
pub mod chunk;
pub mod concern;
pub mod document;
pub mod error;
pub mod id;

pub use checksum::{Checksum, ChecksumHasher};
pub use chunk::{chunk_count, Chunk, DEFAULT_CHUNK_SIZE};
pub use concern::{Acknowledgment, ReadPreference, WriteConcern};
pub use document::{fields, Condition, Document, Filter, Projection};
pub use error::TypeError;
pub use id::FileId;
