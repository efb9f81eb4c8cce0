use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use tutoria_core::{ChangeEvent, CollectionPath, DocPath, EntityStore, Filter, StoreError, StoreResult};

/// Bounds every call of the wrapped store so a hung backend surfaces as `StoreError::Timeout`.
pub struct TimedStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S: EntityStore> TimedStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T>(&self, call: impl Future<Output = StoreResult<T>> + Send) -> StoreResult<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!("Store call exceeded {:?}", self.timeout);
                Err(StoreError::Timeout(self.timeout))
            }
        }
    }
}

#[async_trait]
impl<S: EntityStore> EntityStore for TimedStore<S> {
    async fn create(&self, collection: &CollectionPath, doc: Value) -> StoreResult<String> {
        self.bounded(self.inner.create(collection, doc)).await
    }

    async fn set(&self, path: &DocPath, doc: Value) -> StoreResult<()> {
        self.bounded(self.inner.set(path, doc)).await
    }

    async fn get(&self, path: &DocPath) -> StoreResult<Option<Value>> {
        self.bounded(self.inner.get(path)).await
    }

    async fn update(&self, path: &DocPath, patch: Value) -> StoreResult<()> {
        self.bounded(self.inner.update(path, patch)).await
    }

    async fn update_where(&self, path: &DocPath, guard: &Filter, patch: Value) -> StoreResult<bool> {
        self.bounded(self.inner.update_where(path, guard, patch)).await
    }

    async fn delete(&self, path: &DocPath) -> StoreResult<bool> {
        self.bounded(self.inner.delete(path)).await
    }

    async fn query(&self, collection: &CollectionPath, filter: &Filter) -> StoreResult<Vec<Value>> {
        self.bounded(self.inner.query(collection, filter)).await
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.inner.subscribe()
    }
}
