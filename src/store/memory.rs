//! In-memory document store with optional snapshot persistence.
//!
//! ## Snapshot format:
//! One JSON object: `{ "<collection>": { "<id>": { ...document... } } }`.
//! The file is rewritten after every mutation (write to a temp file, then rename),
//! so a crash leaves either the old or the new snapshot on disk, never half of one.

use super::{Document, DocumentStore, Query, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

type Collections = HashMap<String, BTreeMap<String, Value>>;

pub struct MemoryStore {
    collections: RwLock<Collections>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    /// Create an empty, purely in-memory store.
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            snapshot_path: None,
        }
    }

    /// Open a store backed by a snapshot file, loading it if it exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let collections: Collections = match tokio::fs::read(&path).await {
            Ok(bytes) if !bytes.is_empty() => serde_json::from_slice(&bytes)?,
            Ok(_) => HashMap::new(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };

        let total: usize = collections.values().map(BTreeMap::len).sum();
        info!(path = %path.display(), documents = total, "Document store snapshot loaded");

        Ok(Self {
            collections: RwLock::new(collections),
            snapshot_path: Some(path),
        })
    }

    /// Number of documents in a collection (0 if the collection doesn't exist).
    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    async fn persist(&self, collections: &Collections) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let bytes = serde_json::to_vec_pretty(collections)?;
        let tmp_path = path.with_extension("tmp");

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&tmp_path, &bytes).await?;
        tokio::fs::rename(&tmp_path, path).await?;

        debug!(path = %path.display(), bytes = bytes.len(), "Snapshot written");
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_object(id: &str, data: &Value) -> Result<(), StoreError> {
    if data.is_object() {
        Ok(())
    } else {
        Err(StoreError::InvalidDocument {
            id: id.to_string(),
            message: "document body must be a JSON object".to_string(),
        })
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn add(&self, collection: &str, data: Value) -> Result<String, StoreError> {
        let id = Uuid::new_v4().simple().to_string();
        self.set(collection, &id, data).await?;
        Ok(id)
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<(), StoreError> {
        ensure_object(id, &data)?;

        // Hold the write lock across the snapshot write so snapshots land in mutation order
        let mut collections = self.collections.write().await;
        let previous = collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);

        if let Err(err) = self.persist(&collections).await {
            // Undo the insert so memory never holds a write the snapshot rejected
            if let Some(docs) = collections.get_mut(collection) {
                match previous {
                    Some(old) => {
                        docs.insert(id.to_string(), old);
                    }
                    None => {
                        docs.remove(id);
                    }
                }
            }
            return Err(err);
        }
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document {
                id: id.to_string(),
                data: data.clone(),
            }))
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let candidates = docs
            .iter()
            .filter(|(_, data)| query.matches(data))
            .map(|(id, data)| Document {
                id: id.clone(),
                data: data.clone(),
            })
            .collect::<Vec<_>>();

        Ok(query.apply(candidates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Direction;
    use serde_json::json;

    #[tokio::test]
    async fn test_add_and_get() {
        let store = MemoryStore::new();
        let id = store.add("interviews", json!({"role": "Backend"})).await.unwrap();

        let doc = store.get("interviews", &id).await.unwrap().unwrap();
        assert_eq!(doc.id, id);
        assert_eq!(doc.data["role"], "Backend");
        assert!(store.get("interviews", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = MemoryStore::new();
        store.set("feedback", "fb1", json!({"totalScore": 10})).await.unwrap();
        store.set("feedback", "fb1", json!({"totalScore": 70})).await.unwrap();

        assert_eq!(store.len("feedback").await, 1);
        let doc = store.get("feedback", "fb1").await.unwrap().unwrap();
        assert_eq!(doc.data["totalScore"], 70);
    }

    #[tokio::test]
    async fn test_rejects_non_object_documents() {
        let store = MemoryStore::new();
        let err = store.set("feedback", "fb1", json!([1, 2])).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidDocument { .. }));
    }

    #[tokio::test]
    async fn test_query_unknown_collection_is_empty() {
        let store = MemoryStore::new();
        let result = store
            .query("nothing", &Query::new().order_by("createdAt", Direction::Desc))
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("store.json");

        let store = MemoryStore::open(&path).await.unwrap();
        let id = store.add("interviews", json!({"role": "Frontend"})).await.unwrap();
        drop(store);

        let reopened = MemoryStore::open(&path).await.unwrap();
        let doc = reopened.get("interviews", &id).await.unwrap().unwrap();
        assert_eq!(doc.data["role"], "Frontend");
    }

    #[tokio::test]
    async fn test_failed_snapshot_write_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = MemoryStore::open(&path).await.unwrap();
        store.set("feedback", "fb0", json!({"totalScore": 40})).await.unwrap();

        // A directory where the temp file should go makes every write fail
        std::fs::create_dir(path.with_extension("tmp")).unwrap();

        assert!(store.set("feedback", "fb1", json!({"totalScore": 70})).await.is_err());
        assert!(store.get("feedback", "fb1").await.unwrap().is_none());

        assert!(store.set("feedback", "fb0", json!({"totalScore": 90})).await.is_err());
        let doc = store.get("feedback", "fb0").await.unwrap().unwrap();
        assert_eq!(doc.data["totalScore"], 40);
        assert_eq!(store.len("feedback").await, 1);
    }
}
