//! # tidegate-db-memory
//!
//! In-memory storage backend for the Tidegate server.
//!
//! Implements [`tidegate_storage::ResourceStore`] over a process-local
//! map, with live watch channels fed by mutations. Intended for tests and
//! embedded deployments; nothing is persisted.
//!
//! ## Example
//!
//! ```ignore
//! use tidegate_db_memory::InMemoryStore;
//! use tidegate_storage::TransformStore;
//!
//! let store = TransformStore::new(InMemoryStore::new())
//!     .with_transformer(redactor);
//! ```

mod storage;

pub use storage::InMemoryStore;
