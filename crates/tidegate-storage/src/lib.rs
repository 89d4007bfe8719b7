//! # tidegate-storage
//!
//! Storage abstraction layer for the Tidegate server.
//!
//! This crate defines the trait and types that all storage backends
//! implement, plus the [`TransformStore`] decorator that applies
//! user-supplied transformations to data on its way to the response
//! layer.
//!
//! ## Overview
//!
//! The main trait is [`ResourceStore`], which defines the contract for:
//! - CRUD operations (by-id, create, update, delete)
//! - List queries with a sequential or concurrent transform mode
//! - Live watch streams
//!
//! [`TransformStore`] wraps any `ResourceStore` and exposes the same
//! interface, so decorators chain transparently:
//!
//! ```ignore
//! use std::sync::Arc;
//! use tidegate_storage::{ItemTransformer, TransformStore};
//!
//! let store = TransformStore::new(inner_store)
//!     .with_transformer(Arc::new(RedactSecrets));
//!
//! let projects = store.list("project", &opts).await?;
//! ```

mod error;
mod traits;
pub mod transform;
mod types;

// Re-export everything from submodules
pub use error::{ErrorCategory, StorageError};
pub use traits::{ResourceStore, WatchChannel};
pub use transform::{ItemTransformer, ListTransformer, StreamTransformer, TransformStore};
pub use types::{BY_ID_OPTION, Item, ListMode, QueryOptions};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a boxed storage trait object.
pub type DynStore = std::sync::Arc<dyn ResourceStore>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use tidegate_storage::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{ErrorCategory, StorageError};
    pub use crate::traits::{ResourceStore, WatchChannel};
    pub use crate::transform::{
        ItemTransformer, ListTransformer, StreamTransformer, TransformStore,
    };
    pub use crate::types::{BY_ID_OPTION, Item, ListMode, QueryOptions};
    pub use crate::{DynStore, StorageResult};
}
