//! TransformStore - a storage wrapper that transforms items on their way
//! to the response layer.
//!
//! This wrapper delegates every operation to an inner storage
//! implementation, then applies user-supplied transformers to the returned
//! data. The inner store needs no awareness of transformation, and the
//! wrapper holds no state of its own, so it composes transparently with
//! other store decorators.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tidegate_storage::{TransformStore, ItemTransformer};
//!
//! let store = TransformStore::new(memory_store)
//!     .with_transformer(Arc::new(RedactSecrets));
//!
//! // Items come back with the transformer applied
//! let projects = store.list("project", &opts).await?;
//! ```

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::debug;

use crate::error::StorageError;
use crate::traits::{ResourceStore, WatchChannel};
use crate::types::{BY_ID_OPTION, Item, ListMode, QueryOptions};

/// Buffer size for the derived watch channel.
///
/// Bounded so a slow consumer applies backpressure to the relay task
/// instead of growing an unbounded queue.
const WATCH_RELAY_BUFFER: usize = 100;

/// Transforms a single item.
///
/// The outcome is one of: `Ok(Some(item))` with the transformed item,
/// `Ok(None)` to drop the item from the result (not an error), or
/// `Err(e)` on failure. The transformer receives the item by value and
/// must not rely on the caller observing in-place mutation.
#[async_trait]
pub trait ItemTransformer: Send + Sync {
    /// Transforms one item.
    ///
    /// `opts` is `None` for write operations (create/update/delete); for
    /// by-id lookups it carries the [`BY_ID_OPTION`] marker.
    async fn transform(
        &self,
        resource_type: &str,
        item: Item,
        opts: Option<&QueryOptions>,
    ) -> Result<Option<Item>, StorageError>;
}

/// Transforms an entire list result in one call.
///
/// When configured, it replaces per-item iteration for list operations:
/// the transformer receives the whole collection and may return one of a
/// different length.
#[async_trait]
pub trait ListTransformer: Send + Sync {
    /// Transforms a whole collection.
    async fn transform_list(
        &self,
        resource_type: &str,
        items: Vec<Item>,
        opts: &QueryOptions,
    ) -> Result<Vec<Item>, StorageError>;
}

/// Transforms a live watch stream.
///
/// When configured, it receives the raw channel and returns a new one; it
/// owns the full relay loop and its closing discipline.
#[async_trait]
pub trait StreamTransformer: Send + Sync {
    /// Transforms a watch stream.
    async fn transform_stream(
        &self,
        resource_type: &str,
        events: WatchChannel,
        opts: &QueryOptions,
    ) -> Result<WatchChannel, StorageError>;
}

/// A storage wrapper that applies transformers to the inner store's
/// results.
///
/// Any subset of the three transformer kinds may be configured; operations
/// without an applicable transformer pass the inner store's output through
/// unchanged. Errors from the inner store or from a transformer are
/// propagated undecorated; the only synthesis this wrapper performs is
/// converting a transformer drop on a by-id lookup into a not-found error,
/// since by-id must always yield an item or an error.
pub struct TransformStore<S: ResourceStore> {
    /// The inner storage implementation.
    inner: S,
    transformer: Option<Arc<dyn ItemTransformer>>,
    list_transformer: Option<Arc<dyn ListTransformer>>,
    stream_transformer: Option<Arc<dyn StreamTransformer>>,
}

impl<S: ResourceStore> TransformStore<S> {
    /// Creates a transforming wrapper with no transformers configured.
    ///
    /// Until transformers are added, every operation is a pure
    /// pass-through.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            transformer: None,
            list_transformer: None,
            stream_transformer: None,
        }
    }

    /// Configures the single-item transformer.
    #[must_use]
    pub fn with_transformer(mut self, transformer: Arc<dyn ItemTransformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    /// Configures the whole-collection transformer.
    #[must_use]
    pub fn with_list_transformer(mut self, transformer: Arc<dyn ListTransformer>) -> Self {
        self.list_transformer = Some(transformer);
        self
    }

    /// Configures the stream transformer.
    #[must_use]
    pub fn with_stream_transformer(mut self, transformer: Arc<dyn StreamTransformer>) -> Self {
        self.stream_transformer = Some(transformer);
        self
    }

    /// Get a reference to the inner storage.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Applies the item transformer to the outcome of a write operation.
    ///
    /// Write paths pass no query options. A missing item short-circuits
    /// (nothing to transform), and a transformer drop passes through as a
    /// legitimate omit — not-found synthesis belongs to by-id alone.
    async fn transform_written(
        &self,
        resource_type: &str,
        written: Option<Item>,
    ) -> Result<Option<Item>, StorageError> {
        let Some(item) = written else {
            return Ok(None);
        };
        let Some(transformer) = &self.transformer else {
            return Ok(Some(item));
        };
        transformer.transform(resource_type, item, None).await
    }

    async fn sequential_list(
        &self,
        resource_type: &str,
        opts: &QueryOptions,
    ) -> Result<Vec<Item>, StorageError> {
        let started = Instant::now();
        let data = self.inner.list(resource_type, opts).await?;
        let fetch_elapsed = started.elapsed();

        if let Some(list_transformer) = &self.list_transformer {
            return list_transformer
                .transform_list(resource_type, data, opts)
                .await;
        }

        let Some(transformer) = &self.transformer else {
            return Ok(data);
        };

        let transform_started = Instant::now();
        let mut result = Vec::with_capacity(data.len());
        for item in data {
            // First transform error aborts the whole list, no partial
            // results.
            if let Some(item) = transformer.transform(resource_type, item, Some(opts)).await? {
                result.push(item);
            }
        }

        if opts.force_trace() {
            debug!(
                resource_type,
                mode = "sequential",
                items = result.len(),
                fetch_ms = fetch_elapsed.as_millis() as u64,
                transform_ms = transform_started.elapsed().as_millis() as u64,
                "list transform completed"
            );
        }
        Ok(result)
    }

    /// Concurrent list path: one task per item, joined through a
    /// [`JoinSet`] so no task can outlive the call.
    async fn concurrent_list(
        &self,
        resource_type: &str,
        opts: &QueryOptions,
    ) -> Result<Vec<Item>, StorageError> {
        let started = Instant::now();
        let data = self.inner.list(resource_type, opts).await?;
        let fetch_elapsed = started.elapsed();

        // Whole-collection transforms gain nothing from fan-out.
        if let Some(list_transformer) = &self.list_transformer {
            return list_transformer
                .transform_list(resource_type, data, opts)
                .await;
        }

        let Some(transformer) = &self.transformer else {
            return Ok(data);
        };

        let transform_started = Instant::now();
        let cancel = opts.cancellation().clone();
        let shared_opts = Arc::new(opts.clone());
        let shared_type: Arc<str> = Arc::from(resource_type);

        let mut tasks: JoinSet<Result<Option<Item>, StorageError>> = JoinSet::new();
        for item in data {
            // A cancelled request stops launching further work.
            if cancel.is_cancelled() {
                break;
            }
            let transformer = Arc::clone(transformer);
            let opts = Arc::clone(&shared_opts);
            let resource_type = Arc::clone(&shared_type);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => Err(StorageError::Cancelled),
                    outcome = transformer.transform(&resource_type, item, Some(opts.as_ref())) => outcome,
                }
            });
        }

        // Successful items land in completion order; result order across
        // items is unspecified in this mode. First error wins: remaining
        // tasks are aborted and the set drained before returning, so
        // exactly one error surfaces and nothing keeps running past this
        // call.
        let mut result = Vec::new();
        let mut first_err: Option<StorageError> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(Some(item))) => {
                    if first_err.is_none() {
                        result.push(item);
                    }
                }
                Ok(Ok(None)) => {}
                Ok(Err(err)) => {
                    if first_err.is_none() {
                        first_err = Some(err);
                        tasks.abort_all();
                    }
                }
                Err(join_err) => {
                    if !join_err.is_cancelled() && first_err.is_none() {
                        first_err = Some(StorageError::internal(format!(
                            "list transform task panicked: {join_err}"
                        )));
                        tasks.abort_all();
                    }
                }
            }
        }
        if let Some(err) = first_err {
            return Err(err);
        }
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }

        if opts.force_trace() {
            debug!(
                resource_type,
                mode = "concurrent",
                items = result.len(),
                fetch_ms = fetch_elapsed.as_millis() as u64,
                transform_ms = transform_started.elapsed().as_millis() as u64,
                "list transform completed"
            );
        }
        Ok(result)
    }
}

#[async_trait]
impl<S: ResourceStore> ResourceStore for TransformStore<S> {
    async fn by_id(&self, resource_type: &str, id: &str) -> Result<Item, StorageError> {
        let item = self.inner.by_id(resource_type, id).await?;
        let Some(transformer) = &self.transformer else {
            return Ok(item);
        };
        let opts = QueryOptions::new().with_option(BY_ID_OPTION, "true");
        match transformer
            .transform(resource_type, item, Some(&opts))
            .await?
        {
            Some(item) => Ok(item),
            // A drop is not a valid outcome when the caller asked for one
            // specific item.
            None => Err(StorageError::not_found(resource_type, id)),
        }
    }

    async fn list(
        &self,
        resource_type: &str,
        opts: &QueryOptions,
    ) -> Result<Vec<Item>, StorageError> {
        match opts.mode() {
            ListMode::Sequential => self.sequential_list(resource_type, opts).await,
            ListMode::Concurrent => self.concurrent_list(resource_type, opts).await,
        }
    }

    async fn create(
        &self,
        resource_type: &str,
        item: Item,
    ) -> Result<Option<Item>, StorageError> {
        let written = self.inner.create(resource_type, item).await?;
        self.transform_written(resource_type, written).await
    }

    async fn update(
        &self,
        resource_type: &str,
        item: Item,
        id: &str,
    ) -> Result<Option<Item>, StorageError> {
        let written = self.inner.update(resource_type, item, id).await?;
        self.transform_written(resource_type, written).await
    }

    async fn delete(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Option<Item>, StorageError> {
        // Already gone (or deleting asynchronously): nothing to transform.
        let removed = self.inner.delete(resource_type, id).await?;
        self.transform_written(resource_type, removed).await
    }

    async fn watch(
        &self,
        resource_type: &str,
        opts: &QueryOptions,
    ) -> Result<WatchChannel, StorageError> {
        let source = self.inner.watch(resource_type, opts).await?;

        if let Some(stream_transformer) = &self.stream_transformer {
            return stream_transformer
                .transform_stream(resource_type, source, opts)
                .await;
        }

        let Some(transformer) = &self.transformer else {
            return Ok(source);
        };

        let (tx, rx) = mpsc::channel(WATCH_RELAY_BUFFER);
        let transformer = Arc::clone(transformer);
        let opts = opts.clone();
        let resource_type = resource_type.to_string();
        let mut source = source;
        tokio::spawn(async move {
            while let Some(item) = source.recv().await {
                match transformer
                    .transform(&resource_type, item, Some(&opts))
                    .await
                {
                    Ok(Some(item)) => {
                        // Consumer hung up; stop relaying.
                        if tx.send(item).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    // A failed transform drops one event, the stream
                    // itself survives.
                    Err(err) => {
                        debug!(
                            resource_type = %resource_type,
                            error = %err,
                            "dropping watch event after transform failure"
                        );
                    }
                }
            }
            // tx drops here: the derived channel closes exactly when the
            // source closes.
        });
        Ok(rx)
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}

impl<S: ResourceStore> std::fmt::Debug for TransformStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformStore")
            .field("backend", &self.inner.backend_name())
            .field("transformer", &self.transformer.is_some())
            .field("list_transformer", &self.list_transformer.is_some())
            .field("stream_transformer", &self.stream_transformer.is_some())
            .finish()
    }
}
