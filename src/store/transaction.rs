// Optimistic transaction - reads are recorded, writes are buffered, commit is
// a single compare-and-swap batch against the store
use serde_json::Value;
use std::collections::HashMap;

use super::{Document, DocumentStore, Precondition, StoreError, Write, WriteBatch};

pub struct Transaction<'a> {
    store: &'a dyn DocumentStore,
    // (collection, key) -> version observed at first read, None if absent
    reads: HashMap<(String, String), Option<u64>>,
    writes: Vec<Write>,
}

impl<'a> Transaction<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self {
            store,
            reads: HashMap::new(),
            writes: Vec::new(),
        }
    }

    /// Read a document and remember its version for the commit-time check.
    /// A buffered write to the same document is returned instead of the stored copy.
    pub async fn get(
        &mut self,
        collection: &str,
        key: &str,
    ) -> Result<Option<Document>, StoreError> {
        let id = (collection.to_string(), key.to_string());

        let stored = self.store.get(collection, key).await?;
        let observed = stored.as_ref().map(|d| d.version);
        let first = *self.reads.entry(id).or_insert(observed);

        // A second read that sees a newer version can never commit
        if first != observed {
            return Err(StoreError::conflict(collection, key));
        }

        if let Some(pending) = self.pending(collection, key) {
            let version = stored.as_ref().map(|d| d.version).unwrap_or(0);
            return Ok(Some(Document {
                collection: collection.to_string(),
                key: key.to_string(),
                version,
                body: pending.body.clone(),
            }));
        }

        Ok(stored)
    }

    /// Buffer a full-body write. Replaces any earlier buffered write to the same document.
    pub fn set(&mut self, collection: &str, key: &str, body: Value) {
        self.writes
            .retain(|w| !(w.collection == collection && w.key == key));
        self.writes.push(Write {
            collection: collection.to_string(),
            key: key.to_string(),
            body,
        });
    }

    fn pending(&self, collection: &str, key: &str) -> Option<&Write> {
        self.writes
            .iter()
            .find(|w| w.collection == collection && w.key == key)
    }

    /// Build the batch: every read becomes a version guard, and blind writes
    /// are guarded as "must not exist".
    pub fn into_batch(self) -> WriteBatch {
        let mut preconditions: Vec<Precondition> = self
            .reads
            .into_iter()
            .map(|((collection, key), expected_version)| Precondition {
                collection,
                key,
                expected_version,
            })
            .collect();

        for w in &self.writes {
            let guarded = preconditions
                .iter()
                .any(|p| p.collection == w.collection && p.key == w.key);
            if !guarded {
                preconditions.push(Precondition {
                    collection: w.collection.clone(),
                    key: w.key.clone(),
                    expected_version: None,
                });
            }
        }

        WriteBatch {
            preconditions,
            writes: self.writes,
        }
    }

    /// Commit atomically. Fails with [`StoreError::Conflict`] if anything read
    /// has changed since it was read.
    pub async fn commit(self) -> Result<(), StoreError> {
        let store = self.store;
        let batch = self.into_batch();
        if batch.is_empty() {
            return Ok(());
        }

        tracing::debug!(
            "Committing {} write(s) guarded by {} precondition(s)",
            batch.writes.len(),
            batch.preconditions.len()
        );
        store.commit(batch).await
    }
}
