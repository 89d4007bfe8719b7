//! Storage traits for the Tidegate storage abstraction layer.
//!
//! This module defines the core trait that all storage backends must
//! implement. Store decorators implement the same trait over an inner
//! store, so they compose transparently in a chain.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::StorageError;
use crate::types::{Item, QueryOptions};

/// A live stream of items produced by a watch call.
///
/// The channel closes when and only when the producing store stops
/// watching; there is no separate cancel signal at this layer.
pub type WatchChannel = mpsc::Receiver<Item>;

/// The main storage trait that all Tidegate storage backends must
/// implement.
///
/// This trait defines the contract for CRUD operations, list queries, and
/// live watches. Implementations must be thread-safe (`Send + Sync`) and
/// perform their own error classification (not-found, conflict, etc.).
///
/// # Example
///
/// ```ignore
/// use tidegate_storage::{ResourceStore, StorageError, Item};
///
/// async fn get_project(store: &dyn ResourceStore, id: &str) -> Result<Item, StorageError> {
///     store.by_id("project", id).await
/// }
/// ```
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetches a single item by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no item with this ID exists;
    /// a by-id lookup always yields either an item or an error.
    async fn by_id(&self, resource_type: &str, id: &str) -> Result<Item, StorageError>;

    /// Lists items of a resource type.
    ///
    /// The execution mode for any downstream transformation is carried in
    /// `opts`; backends themselves may ignore it.
    ///
    /// # Errors
    ///
    /// Returns an error for infrastructure issues or invalid options.
    async fn list(
        &self,
        resource_type: &str,
        opts: &QueryOptions,
    ) -> Result<Vec<Item>, StorageError>;

    /// Creates a new item.
    ///
    /// If the item carries no `id` field, the backend should generate one.
    /// Backends return the stored item; `None` only arises from a
    /// decorating store that omits the item from the response.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if an item with the same
    /// resource type and ID exists.
    async fn create(
        &self,
        resource_type: &str,
        item: Item,
    ) -> Result<Option<Item>, StorageError>;

    /// Updates an existing item.
    ///
    /// Backends return the stored item; `None` only arises from a
    /// decorating store that omits the item from the response.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the item does not exist.
    async fn update(
        &self,
        resource_type: &str,
        item: Item,
        id: &str,
    ) -> Result<Option<Item>, StorageError>;

    /// Deletes an item by ID.
    ///
    /// Returns the deleted item, or `None` if it was already gone (for
    /// example an asynchronous deletion completed elsewhere). An absent
    /// item is not an error on this path.
    async fn delete(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Option<Item>, StorageError>;

    /// Opens a live stream of items for a resource type.
    ///
    /// # Errors
    ///
    /// Returns an error only for setup failures; no events have been
    /// delivered when this fails.
    async fn watch(
        &self,
        resource_type: &str,
        opts: &QueryOptions,
    ) -> Result<WatchChannel, StorageError>;

    /// Returns the name of this storage backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}

// Ensure the trait is object-safe by using it as a trait object
#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time test that ResourceStore is object-safe
    fn _assert_store_object_safe(_: &dyn ResourceStore) {}
}
