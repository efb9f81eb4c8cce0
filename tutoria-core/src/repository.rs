use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tokio::sync::broadcast;

/// Slash-separated path of a (possibly nested) collection, e.g. `clases/{id}/ofertas`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn root(name: &str) -> Self {
        Self(name.to_string())
    }

    /// A sub-collection owned by the document at `parent`.
    pub fn nested(parent: &DocPath, name: &str) -> Self {
        Self(format!("{}/{}", parent, name))
    }

    pub fn doc(&self, id: impl Into<String>) -> DocPath {
        DocPath {
            collection: self.clone(),
            id: id.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when `self` is this collection or lives underneath one of its documents.
    pub fn is_within(&self, other: &CollectionPath) -> bool {
        self.0 == other.0 || self.0.starts_with(&format!("{}/", other.0))
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocPath {
    pub collection: CollectionPath,
    pub id: String,
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Collection layout of the marketplace database.
pub mod collections {
    use super::{CollectionPath, DocPath};

    pub const CLASS_REQUESTS: &str = "clases";
    pub const OFFERS: &str = "ofertas";
    pub const PENDING_ASSIGNMENTS: &str = "registro_clases";
    pub const CLASS_UNIONS: &str = "clases_union";
    pub const TEACHERS: &str = "profesores";
    pub const TEACHER_OFFER_INDEX: &str = "mis_ofertas";

    pub fn class_requests() -> CollectionPath {
        CollectionPath::root(CLASS_REQUESTS)
    }

    pub fn class_request(id: &str) -> DocPath {
        class_requests().doc(id)
    }

    pub fn offers(class_request_id: &str) -> CollectionPath {
        CollectionPath::nested(&class_request(class_request_id), OFFERS)
    }

    pub fn offer(class_request_id: &str, offer_id: &str) -> DocPath {
        offers(class_request_id).doc(offer_id)
    }

    pub fn pending_assignments() -> CollectionPath {
        CollectionPath::root(PENDING_ASSIGNMENTS)
    }

    pub fn pending_assignment(id: &str) -> DocPath {
        pending_assignments().doc(id)
    }

    pub fn class_unions() -> CollectionPath {
        CollectionPath::root(CLASS_UNIONS)
    }

    pub fn class_union(id: &str) -> DocPath {
        class_unions().doc(id)
    }

    pub fn teacher_offer_index(teacher_id: &str) -> CollectionPath {
        CollectionPath::nested(&CollectionPath::root(TEACHERS).doc(teacher_id), TEACHER_OFFER_INDEX)
    }

    pub fn teacher_offer_entry(teacher_id: &str, offer_id: &str) -> DocPath {
        teacher_offer_index(teacher_id).doc(offer_id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// One entry of the store's live change feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub collection: CollectionPath,
    pub id: String,
}

/// Conjunction of top-level field equality clauses.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    clauses: Vec<(String, Value)>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.clauses.push((field.to_string(), value.into()));
        self
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.clauses
            .iter()
            .all(|(field, expected)| doc.get(field) == Some(expected))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Document serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Document persistence used by every workflow component.
///
/// Writes to a single document are atomic. Nothing spanning several documents is:
/// callers order their steps so a crash between two of them is recoverable.
/// Every stored document carries its own id in an `id` field.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Insert under a freshly generated id and return it.
    async fn create(&self, collection: &CollectionPath, doc: Value) -> StoreResult<String>;

    /// Create or replace the document at `path`.
    async fn set(&self, path: &DocPath, doc: Value) -> StoreResult<()>;

    async fn get(&self, path: &DocPath) -> StoreResult<Option<Value>>;

    /// Shallow-merge the top-level fields of `patch`. `StoreError::NotFound` if absent.
    async fn update(&self, path: &DocPath, patch: Value) -> StoreResult<()>;

    /// `update`, applied only while the current document matches `guard`.
    /// Returns whether the patch was applied. `StoreError::NotFound` if absent.
    async fn update_where(&self, path: &DocPath, guard: &Filter, patch: Value) -> StoreResult<bool>;

    /// Returns whether a document was actually removed.
    async fn delete(&self, path: &DocPath) -> StoreResult<bool>;

    async fn query(&self, collection: &CollectionPath, filter: &Filter) -> StoreResult<Vec<Value>>;

    /// Live feed of writes. Delivery order across documents is not guaranteed.
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;
}

/// Typed access on top of the raw JSON documents.
#[async_trait]
pub trait EntityStoreExt: EntityStore {
    async fn get_as<T>(&self, path: &DocPath) -> StoreResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(path).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    async fn put<T>(&self, path: &DocPath, value: &T) -> StoreResult<()>
    where
        T: Serialize + Sync,
    {
        let doc = serde_json::to_value(value)?;
        self.set(path, doc).await
    }

    async fn query_as<T>(&self, collection: &CollectionPath, filter: &Filter) -> StoreResult<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        self.query(collection, filter)
            .await?
            .into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(StoreError::from))
            .collect()
    }
}

impl<S: EntityStore + ?Sized> EntityStoreExt for S {}

/// Merge `patch` into `doc` field by field. Both must be JSON objects.
pub fn merge_patch(doc: &mut Value, patch: Value) -> StoreResult<()> {
    let (Some(target), Value::Object(fields)) = (doc.as_object_mut(), patch) else {
        return Err(StoreError::Backend("documents and patches must be JSON objects".to_string()));
    };
    for (key, value) in fields {
        target.insert(key, value);
    }
    Ok(())
}

/// Stamp the document's own id into it.
pub fn with_id(mut doc: Value, id: &str) -> StoreResult<Value> {
    match doc.as_object_mut() {
        Some(fields) => {
            fields.insert("id".to_string(), Value::String(id.to_string()));
            Ok(doc)
        }
        None => Err(StoreError::Backend("documents must be JSON objects".to_string())),
    }
}
