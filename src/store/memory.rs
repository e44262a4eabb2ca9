use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{new_key, Document, DocumentStore, FieldFilter, StoreError, WriteBatch};

type Key = (String, String);

/// In-process store. The mutex is held for the whole of a commit, so the
/// version checks and the writes of one batch are never interleaved with
/// another batch.
#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: Mutex<HashMap<Key, Document>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn key_of(collection: &str, key: &str) -> Key {
    (collection.to_string(), key.to_string())
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>, StoreError> {
        let docs = self.docs.lock().await;
        Ok(docs.get(&key_of(collection, key)).cloned())
    }

    async fn create(&self, collection: &str, body: Value) -> Result<Document, StoreError> {
        self.put(collection, &new_key(), body).await
    }

    async fn put(
        &self,
        collection: &str,
        key: &str,
        body: Value,
    ) -> Result<Document, StoreError> {
        let mut docs = self.docs.lock().await;
        let k = key_of(collection, key);
        if docs.contains_key(&k) {
            return Err(StoreError::conflict(collection, key));
        }

        let doc = Document {
            collection: collection.to_string(),
            key: key.to_string(),
            version: 1,
            body,
        };
        docs.insert(k, doc.clone());
        Ok(doc)
    }

    async fn list(
        &self,
        collection: &str,
        filter: Option<&FieldFilter>,
    ) -> Result<Vec<Document>, StoreError> {
        let docs = self.docs.lock().await;
        let mut found: Vec<Document> = docs
            .values()
            .filter(|d| d.collection == collection)
            .filter(|d| filter.map_or(true, |f| f.matches(d)))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(found)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut docs = self.docs.lock().await;

        // Validate everything before touching anything
        for pre in &batch.preconditions {
            let current = docs
                .get(&key_of(&pre.collection, &pre.key))
                .map(|d| d.version);
            if current != pre.expected_version {
                tracing::debug!(
                    "Precondition failed on {}/{}: expected {:?}, found {:?}",
                    pre.collection,
                    pre.key,
                    pre.expected_version,
                    current
                );
                return Err(StoreError::conflict(&pre.collection, &pre.key));
            }
        }

        for write in batch.writes {
            let k = key_of(&write.collection, &write.key);
            let version = docs.get(&k).map(|d| d.version + 1).unwrap_or(1);
            docs.insert(
                k,
                Document {
                    collection: write.collection,
                    key: write.key,
                    version,
                    body: write.body,
                },
            );
        }

        Ok(())
    }

    async fn remove(&self, collection: &str, key: &str) -> Result<bool, StoreError> {
        let mut docs = self.docs.lock().await;
        Ok(docs.remove(&key_of(collection, key)).is_some())
    }
}
