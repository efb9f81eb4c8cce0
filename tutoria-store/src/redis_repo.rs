use async_trait::async_trait;
use redis::AsyncCommands;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tutoria_core::repository::{merge_patch, with_id};
use tutoria_core::{
    ChangeEvent, ChangeKind, CollectionPath, DocPath, EntityStore, Filter, StoreError, StoreResult,
};
use uuid::Uuid;

const CHANGE_FEED_CAPACITY: usize = 256;
const UPDATE_ATTEMPTS: usize = 5;

fn backend(err: redis::RedisError) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn doc_key(path: &DocPath) -> String {
    format!("doc:{}", path)
}

fn members_key(collection: &CollectionPath) -> String {
    format!("col:{}", collection)
}

/// Document store on Redis.
///
/// Each document is a JSON string under `doc:{collection}/{id}`; the ids of a
/// collection are kept in the set `col:{collection}`. The change feed only
/// carries writes made through this process.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    changes: broadcast::Sender<ChangeEvent>,
}

impl RedisStore {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        // Fail at startup rather than on the first request.
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Connected to Redis document store");

        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Ok(Self { client, changes })
    }

    async fn connection(&self) -> StoreResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(backend)
    }

    fn publish(&self, kind: ChangeKind, path: &DocPath) {
        let _ = self.changes.send(ChangeEvent {
            kind,
            collection: path.collection.clone(),
            id: path.id.clone(),
        });
    }

    /// Read-merge-write under a compare-and-set. A failed `guard` leaves the document untouched.
    async fn merge(&self, path: &DocPath, guard: Option<&Filter>, patch: Value) -> StoreResult<bool> {
        let key = doc_key(path);
        let mut conn = self.connection().await?;

        // Compare-and-set: only replace the value we merged into.
        let cas = redis::Script::new(
            r#"
            if redis.call("GET", KEYS[1]) == ARGV[1] then
                redis.call("SET", KEYS[1], ARGV[2])
                return 1
            else
                return 0
            end
        "#,
        );

        for attempt in 1..=UPDATE_ATTEMPTS {
            let current: Option<String> = conn.get(&key).await.map_err(backend)?;
            let current = current.ok_or_else(|| StoreError::NotFound(path.to_string()))?;

            let mut doc: Value = serde_json::from_str(&current)?;
            if guard.is_some_and(|guard| !guard.matches(&doc)) {
                return Ok(false);
            }
            merge_patch(&mut doc, patch.clone())?;
            let next = serde_json::to_string(&doc)?;

            let swapped: i64 = cas
                .key(&key)
                .arg(&current)
                .arg(&next)
                .invoke_async(&mut conn)
                .await
                .map_err(backend)?;

            if swapped == 1 {
                self.publish(ChangeKind::Updated, path);
                return Ok(true);
            }
            warn!("Concurrent write on {}, retrying update (attempt {})", path, attempt);
        }

        Err(StoreError::Backend(format!(
            "update of {} kept conflicting after {} attempts",
            path, UPDATE_ATTEMPTS
        )))
    }
}

#[async_trait]
impl EntityStore for RedisStore {
    async fn create(&self, collection: &CollectionPath, doc: Value) -> StoreResult<String> {
        let id = Uuid::new_v4().to_string();
        self.set(&collection.doc(id.clone()), doc).await?;
        Ok(id)
    }

    async fn set(&self, path: &DocPath, doc: Value) -> StoreResult<()> {
        let doc = with_id(doc, &path.id)?;
        let raw = serde_json::to_string(&doc)?;
        let mut conn = self.connection().await?;

        let (previous, _added): (Option<String>, i64) = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(doc_key(path))
            .arg(raw)
            .arg("GET")
            .sadd(members_key(&path.collection), &path.id)
            .query_async(&mut conn)
            .await
            .map_err(backend)?;

        let kind = if previous.is_some() { ChangeKind::Updated } else { ChangeKind::Created };
        self.publish(kind, path);
        Ok(())
    }

    async fn get(&self, path: &DocPath) -> StoreResult<Option<Value>> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(doc_key(path)).await.map_err(backend)?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, path: &DocPath, patch: Value) -> StoreResult<()> {
        self.merge(path, None, patch).await.map(|_| ())
    }

    async fn update_where(&self, path: &DocPath, guard: &Filter, patch: Value) -> StoreResult<bool> {
        self.merge(path, Some(guard), patch).await
    }

    async fn delete(&self, path: &DocPath) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let (removed, _): (i64, i64) = redis::pipe()
            .atomic()
            .del(doc_key(path))
            .srem(members_key(&path.collection), &path.id)
            .query_async(&mut conn)
            .await
            .map_err(backend)?;

        if removed > 0 {
            self.publish(ChangeKind::Deleted, path);
        }
        Ok(removed > 0)
    }

    async fn query(&self, collection: &CollectionPath, filter: &Filter) -> StoreResult<Vec<Value>> {
        let mut conn = self.connection().await?;
        let ids: Vec<String> = conn.smembers(members_key(collection)).await.map_err(backend)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids.iter().map(|id| doc_key(&collection.doc(id.as_str()))).collect();
        let raws: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(backend)?;

        let mut docs = Vec::with_capacity(raws.len());
        // Members whose document vanished between SMEMBERS and MGET are skipped.
        for raw in raws.into_iter().flatten() {
            let doc: Value = serde_json::from_str(&raw)?;
            if filter.matches(&doc) {
                docs.push(doc);
            }
        }
        Ok(docs)
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }
}
