//! Persistence contract for the EVOX fleet.
//!
//! The dispatch engine never talks to a database directly. It reads through
//! [`EntityStore`] and writes by submitting a [`WriteBatch`]: a set of
//! preconditions plus writes that the store applies all-or-nothing.
//! Preconditions carry the revisions the caller read, so a concurrent writer
//! makes the batch fail with a conflict instead of silently interleaving.
//!
//! # Main types
//!
//! - [`EntityStore`] — Async read/commit/lease interface.
//! - [`WriteBatch`] — Transactional unit of preconditions and writes.
//! - [`MemoryStore`] — Reference implementation backed by in-memory tables.
//! - [`FileStore`] — [`MemoryStore`] persisted as a JSON snapshot on disk.
//! - [`Snapshot`] — Plain table dump, also used to build test fixtures.

/// Write batches and preconditions.
pub mod batch;
/// JSON-file-backed store.
pub mod file;
/// In-memory reference store.
pub mod memory;
/// The `EntityStore` trait.
pub mod store;

pub use batch::{Precondition, Write, WriteBatch};
pub use file::FileStore;
pub use memory::{Lease, MemoryStore, Snapshot};
pub use store::EntityStore;
