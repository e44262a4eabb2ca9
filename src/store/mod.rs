// Document store - isolates all persistence side effects
pub mod memory;
pub mod sqlite;
pub mod transaction;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

pub use memory::MemoryDocumentStore;
pub use sqlite::SqliteDocumentStore;
pub use transaction::Transaction;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Write conflict on {collection}/{key}")]
    Conflict { collection: String, key: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Only optimistic-concurrency collisions are worth repeating in-process.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub(crate) fn conflict(collection: &str, key: &str) -> Self {
        Self::Conflict {
            collection: collection.to_string(),
            key: key.to_string(),
        }
    }
}

/// A versioned JSON document. `version` starts at 1 and grows by one per write.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub collection: String,
    pub key: String,
    pub version: u64,
    pub body: Value,
}

impl Document {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(serde_json::from_value(self.body.clone())?)
    }

    /// Top-level field lookup used by list filters.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body.get(name)
    }
}

/// Equality filter on a top-level body field.
#[derive(Debug, Clone)]
pub struct FieldFilter {
    pub field: String,
    pub value: Value,
}

impl FieldFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        doc.field(&self.field) == Some(&self.value)
    }
}

/// Version guard checked at commit time. `None` means the document must not exist.
#[derive(Debug, Clone, PartialEq)]
pub struct Precondition {
    pub collection: String,
    pub key: String,
    pub expected_version: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Write {
    pub collection: String,
    pub key: String,
    pub body: Value,
}

/// All-or-nothing unit of work handed to [`DocumentStore::commit`].
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub preconditions: Vec<Precondition>,
    pub writes: Vec<Write>,
}

impl WriteBatch {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub(crate) fn expected_version(&self, collection: &str, key: &str) -> Option<Option<u64>> {
        self.preconditions
            .iter()
            .find(|p| p.collection == collection && p.key == key)
            .map(|p| p.expected_version)
    }
}

/// Store trait - every backend must provide conditional (compare-and-swap) commits
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load a document by key
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>, StoreError>;

    /// Insert a document under a freshly generated key
    async fn create(&self, collection: &str, body: Value) -> Result<Document, StoreError>;

    /// Insert a document under a caller-chosen key; conflicts if the key is taken
    async fn put(&self, collection: &str, key: &str, body: Value)
        -> Result<Document, StoreError>;

    /// List a collection, optionally filtered on one field
    async fn list(
        &self,
        collection: &str,
        filter: Option<&FieldFilter>,
    ) -> Result<Vec<Document>, StoreError>;

    /// Atomically check every precondition and apply every write
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Delete a document, returning whether it existed
    async fn remove(&self, collection: &str, key: &str) -> Result<bool, StoreError>;
}

/// Type alias for Arc-wrapped store (for AppState)
pub type DynDocumentStore = Arc<dyn DocumentStore>;

pub(crate) fn new_key() -> String {
    uuid::Uuid::now_v7().to_string()
}
