use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use tidegate_storage::{Item, QueryOptions, ResourceStore, StorageError, WatchChannel};

pub type StorageKey = String; // Format: "resource_type/id"

pub(crate) fn make_storage_key(resource_type: &str, id: &str) -> StorageKey {
    format!("{resource_type}/{id}")
}

/// Buffer size for watch subscriptions.
///
/// Mutations never block on a slow watcher; events beyond this limit are
/// dropped for that watcher.
const WATCH_BUFFER_SIZE: usize = 1024;

#[derive(Debug)]
struct Watcher {
    resource_type: String,
    sender: mpsc::Sender<Item>,
}

fn item_id(item: &Item) -> Option<&str> {
    item.get("id").and_then(Value::as_str)
}

/// In-memory storage backend.
///
/// This storage implementation provides:
/// - Full CRUD operations over untyped items
/// - Deterministic list order (sorted by item id)
/// - Live watch channels fed by mutations
///
/// It keeps everything in a single process and is intended for tests and
/// embedded deployments.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    /// Main storage, keyed `"resource_type/id"`.
    data: RwLock<HashMap<StorageKey, Item>>,
    /// Live watch subscriptions.
    watchers: RwLock<Vec<Watcher>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored items across all resource types.
    pub async fn count(&self) -> usize {
        self.data.read().await.len()
    }

    /// Returns the number of live watch subscriptions.
    pub async fn watcher_count(&self) -> usize {
        self.watchers.read().await.len()
    }

    /// Broadcasts a mutated item to live watchers of its resource type.
    ///
    /// Closed subscriptions are pruned on the way.
    async fn notify(&self, resource_type: &str, item: &Item) {
        let mut watchers = self.watchers.write().await;
        watchers.retain(|w| !w.sender.is_closed());
        for watcher in watchers.iter() {
            if watcher.resource_type != resource_type {
                continue;
            }
            if watcher.sender.try_send(item.clone()).is_err() {
                debug!(resource_type, "dropping watch event for slow subscriber");
            }
        }
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn by_id(&self, resource_type: &str, id: &str) -> Result<Item, StorageError> {
        let key = make_storage_key(resource_type, id);
        self.data
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| StorageError::not_found(resource_type, id))
    }

    async fn list(
        &self,
        resource_type: &str,
        _opts: &QueryOptions,
    ) -> Result<Vec<Item>, StorageError> {
        let prefix = format!("{resource_type}/");
        let mut items: Vec<Item> = self
            .data
            .read()
            .await
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(_, item)| item.clone())
            .collect();
        items.sort_by(|a, b| item_id(a).cmp(&item_id(b)));
        Ok(items)
    }

    async fn create(
        &self,
        resource_type: &str,
        mut item: Item,
    ) -> Result<Option<Item>, StorageError> {
        let id = match item_id(&item) {
            Some(id) => id.to_string(),
            None => {
                let id = Uuid::new_v4().to_string();
                item.insert("id".to_string(), Value::String(id.clone()));
                id
            }
        };
        let key = make_storage_key(resource_type, &id);
        {
            let mut data = self.data.write().await;
            if data.contains_key(&key) {
                return Err(StorageError::already_exists(resource_type, id));
            }
            data.insert(key, item.clone());
        }
        self.notify(resource_type, &item).await;
        Ok(Some(item))
    }

    async fn update(
        &self,
        resource_type: &str,
        mut item: Item,
        id: &str,
    ) -> Result<Option<Item>, StorageError> {
        let key = make_storage_key(resource_type, id);
        item.insert("id".to_string(), Value::String(id.to_string()));
        {
            let mut data = self.data.write().await;
            if !data.contains_key(&key) {
                return Err(StorageError::not_found(resource_type, id));
            }
            data.insert(key, item.clone());
        }
        self.notify(resource_type, &item).await;
        Ok(Some(item))
    }

    async fn delete(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Option<Item>, StorageError> {
        let key = make_storage_key(resource_type, id);
        let removed = self.data.write().await.remove(&key);
        if let Some(item) = &removed {
            self.notify(resource_type, item).await;
        }
        Ok(removed)
    }

    async fn watch(
        &self,
        resource_type: &str,
        _opts: &QueryOptions,
    ) -> Result<WatchChannel, StorageError> {
        let (sender, receiver) = mpsc::channel(WATCH_BUFFER_SIZE);
        self.watchers.write().await.push(Watcher {
            resource_type: resource_type.to_string(),
            sender,
        });
        Ok(receiver)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tidegate_storage::{ItemTransformer, QueryOptions, TransformStore};

    use super::*;

    fn item(id: &str) -> Item {
        let mut map = Item::new();
        map.insert("id".to_string(), json!(id));
        map
    }

    #[tokio::test]
    async fn test_create_and_by_id() {
        let store = InMemoryStore::new();
        store.create("project", item("p-1")).await.unwrap();

        let got = store.by_id("project", "p-1").await.unwrap();
        assert_eq!(got, item("p-1"));
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn test_create_generates_id_when_absent() {
        let store = InMemoryStore::new();
        let created = store
            .create("project", Item::new())
            .await
            .unwrap()
            .expect("created item");

        let id = item_id(&created).expect("generated id");
        assert!(!id.is_empty());
        assert!(store.by_id("project", id).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_conflict() {
        let store = InMemoryStore::new();
        store.create("project", item("p-1")).await.unwrap();

        let err = store.create("project", item("p-1")).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = InMemoryStore::new();
        let err = store
            .update("project", item("p-1"), "p-1")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_replaces_content() {
        let store = InMemoryStore::new();
        store.create("project", item("p-1")).await.unwrap();

        let mut changed = item("p-1");
        changed.insert("name".to_string(), json!("renamed"));
        store.update("project", changed, "p-1").await.unwrap();

        let got = store.by_id("project", "p-1").await.unwrap();
        assert_eq!(got["name"], json!("renamed"));
    }

    #[tokio::test]
    async fn test_delete_returns_item_then_none() {
        let store = InMemoryStore::new();
        store.create("project", item("p-1")).await.unwrap();

        let removed = store.delete("project", "p-1").await.unwrap();
        assert_eq!(removed, Some(item("p-1")));

        let removed = store.delete("project", "p-1").await.unwrap();
        assert!(removed.is_none());
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_type_scoped() {
        let store = InMemoryStore::new();
        store.create("project", item("p-2")).await.unwrap();
        store.create("project", item("p-1")).await.unwrap();
        store.create("cluster", item("c-1")).await.unwrap();

        let got = store.list("project", &QueryOptions::new()).await.unwrap();
        let ids: Vec<&str> = got.iter().map(|i| item_id(i).unwrap()).collect();
        assert_eq!(ids, vec!["p-1", "p-2"]);
    }

    #[tokio::test]
    async fn test_watch_receives_mutations_of_its_type() {
        let store = InMemoryStore::new();
        let mut events = store.watch("project", &QueryOptions::new()).await.unwrap();

        store.create("cluster", item("c-1")).await.unwrap();
        store.create("project", item("p-1")).await.unwrap();

        // Only the project mutation arrives.
        assert_eq!(events.recv().await, Some(item("p-1")));
    }

    #[tokio::test]
    async fn test_watch_pruned_after_receiver_drop() {
        let store = InMemoryStore::new();
        let events = store.watch("project", &QueryOptions::new()).await.unwrap();
        assert_eq!(store.watcher_count().await, 1);

        drop(events);
        store.create("project", item("p-1")).await.unwrap();
        assert_eq!(store.watcher_count().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_create_operations() {
        use tokio::task::JoinSet;

        let store = Arc::new(InMemoryStore::new());
        let mut join_set = JoinSet::new();

        for i in 0..20 {
            let store = Arc::clone(&store);
            join_set.spawn(async move {
                store.create("project", item(&format!("p-{i:02}"))).await
            });
        }

        let mut success_count = 0;
        while let Some(result) = join_set.join_next().await {
            if result.unwrap().is_ok() {
                success_count += 1;
            }
        }

        assert_eq!(success_count, 20);
        assert_eq!(store.count().await, 20);
    }

    /// Adds `"visible": true` to every item.
    struct MarkVisible;

    #[async_trait]
    impl ItemTransformer for MarkVisible {
        async fn transform(
            &self,
            _resource_type: &str,
            mut item: Item,
            _opts: Option<&QueryOptions>,
        ) -> Result<Option<Item>, StorageError> {
            item.insert("visible".to_string(), json!(true));
            Ok(Some(item))
        }
    }

    #[tokio::test]
    async fn test_transform_store_over_memory_backend() {
        let store = TransformStore::new(InMemoryStore::new())
            .with_transformer(Arc::new(MarkVisible));

        let mut events = store.watch("project", &QueryOptions::new()).await.unwrap();

        let created = store
            .create("project", item("p-1"))
            .await
            .unwrap()
            .expect("created item");
        assert_eq!(created["visible"], json!(true));

        let listed = store.list("project", &QueryOptions::new()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["visible"], json!(true));

        // The raw mutation reaches the watcher through the transform relay.
        let event = events.recv().await.unwrap();
        assert_eq!(event["id"], json!("p-1"));
        assert_eq!(event["visible"], json!(true));
    }
}
