//! Backing document store boundary for the chunked object store.
//!
//! The store core talks to its database exclusively through the [`Backend`]
//! trait: document insert/delete/find, chunk insert/delete/find, idempotent
//! index creation, and a server-side checksum over a file's chunk sequence.
//! Connection management, wire protocol, and document encoding live behind
//! the trait in a driver adapter.
//!
//! # Backends
//!
//! - [`InMemoryBackend`] -- single-node in-memory store for tests and
//!   embedding, with scripted failures via [`Fault`]
//!
//! # Contract
//!
//! 1. `ensure_index` is idempotent; creating an existing index is a no-op.
//! 2. Unique indexes are enforced on acknowledged writes.
//! 3. Unacknowledged writes never report backend write errors; transport
//!    failures are always reported.
//! 4. `chunk_checksum` reports [`BackendError::MissingIndex`] when the chunk
//!    position index is absent, so callers can repair and retry.

pub mod error;
pub mod fault;
pub mod index;
pub mod memory;
pub mod traits;

pub use error::{BackendError, BackendResult};
pub use fault::Fault;
pub use index::{IndexOrder, IndexSpec};
pub use memory::InMemoryBackend;
pub use traits::{Backend, DocumentCursor, FindOptions};
