use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::{broadcast, RwLock};
use tutoria_core::repository::{merge_patch, with_id};
use tutoria_core::{
    ChangeEvent, ChangeKind, CollectionPath, DocPath, EntityStore, Filter, StoreError, StoreResult,
};
use uuid::Uuid;

const CHANGE_FEED_CAPACITY: usize = 256;

/// Process-local document store. Default backend and the one tests run against.
pub struct InMemoryStore {
    collections: RwLock<HashMap<CollectionPath, BTreeMap<String, Value>>>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            collections: RwLock::new(HashMap::new()),
            changes,
        }
    }

    /// Number of documents directly inside `collection`.
    pub async fn count(&self, collection: &CollectionPath) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    fn publish(&self, kind: ChangeKind, path: &DocPath) {
        // No subscribers is fine.
        let _ = self.changes.send(ChangeEvent {
            kind,
            collection: path.collection.clone(),
            id: path.id.clone(),
        });
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn create(&self, collection: &CollectionPath, doc: Value) -> StoreResult<String> {
        let id = Uuid::new_v4().to_string();
        self.set(&collection.doc(id.clone()), doc).await?;
        Ok(id)
    }

    async fn set(&self, path: &DocPath, doc: Value) -> StoreResult<()> {
        let doc = with_id(doc, &path.id)?;
        let existed = {
            let mut collections = self.collections.write().await;
            collections
                .entry(path.collection.clone())
                .or_default()
                .insert(path.id.clone(), doc)
                .is_some()
        };
        let kind = if existed { ChangeKind::Updated } else { ChangeKind::Created };
        self.publish(kind, path);
        Ok(())
    }

    async fn get(&self, path: &DocPath) -> StoreResult<Option<Value>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(&path.collection)
            .and_then(|docs| docs.get(&path.id))
            .cloned())
    }

    async fn update(&self, path: &DocPath, patch: Value) -> StoreResult<()> {
        {
            let mut collections = self.collections.write().await;
            let doc = collections
                .get_mut(&path.collection)
                .and_then(|docs| docs.get_mut(&path.id))
                .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
            merge_patch(doc, patch)?;
        }
        self.publish(ChangeKind::Updated, path);
        Ok(())
    }

    async fn update_where(&self, path: &DocPath, guard: &Filter, patch: Value) -> StoreResult<bool> {
        {
            let mut collections = self.collections.write().await;
            let doc = collections
                .get_mut(&path.collection)
                .and_then(|docs| docs.get_mut(&path.id))
                .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
            if !guard.matches(doc) {
                return Ok(false);
            }
            merge_patch(doc, patch)?;
        }
        self.publish(ChangeKind::Updated, path);
        Ok(true)
    }

    async fn delete(&self, path: &DocPath) -> StoreResult<bool> {
        let removed = {
            let mut collections = self.collections.write().await;
            collections
                .get_mut(&path.collection)
                .map(|docs| docs.remove(&path.id).is_some())
                .unwrap_or(false)
        };
        if removed {
            self.publish(ChangeKind::Deleted, path);
        }
        Ok(removed)
    }

    async fn query(&self, collection: &CollectionPath, filter: &Filter) -> StoreResult<Vec<Value>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| docs.values().filter(|doc| filter.matches(doc)).cloned().collect())
            .unwrap_or_default())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }
}
