use async_trait::async_trait;
use rusqlite::{params, OptionalExtension, Row};
use serde_json::Value;

use super::{new_key, Document, DocumentStore, FieldFilter, StoreError, WriteBatch};
use crate::state::DbPool;

impl From<r2d2::Error> for StoreError {
    fn from(e: r2d2::Error) -> Self {
        StoreError::Unavailable(format!("pool: {}", e))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Unavailable(format!("sqlite: {}", e))
    }
}

/// SQLite implementation. Every write is a row-level compare-and-swap on
/// the `version` column.
pub struct SqliteDocumentStore {
    pool: DbPool,
}

impl SqliteDocumentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_document(row: &Row<'_>) -> rusqlite::Result<(String, String, i64, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_document(
    (collection, key, version, body): (String, String, i64, String),
) -> Result<Document, StoreError> {
    Ok(Document {
        collection,
        key,
        version: version as u64,
        body: serde_json::from_str(&body)?,
    })
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>, StoreError> {
        let conn = self.pool.get()?;

        let raw = conn
            .query_row(
                "SELECT collection, key, version, body FROM documents
                 WHERE collection = ?1 AND key = ?2",
                params![collection, key],
                row_to_document,
            )
            .optional()?;

        raw.map(into_document).transpose()
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
        let conn = self.pool.get()?;
        let body_json = serde_json::to_string(&body)?;

        let rows = conn.execute(
            "INSERT INTO documents (collection, key, version, body)
             VALUES (?1, ?2, 1, ?3)
             ON CONFLICT(collection, key) DO NOTHING",
            params![collection, key, body_json],
        )?;

        if rows == 0 {
            return Err(StoreError::conflict(collection, key));
        }

        Ok(Document {
            collection: collection.to_string(),
            key: key.to_string(),
            version: 1,
            body,
        })
    }

    async fn list(
        &self,
        collection: &str,
        filter: Option<&FieldFilter>,
    ) -> Result<Vec<Document>, StoreError> {
        let conn = self.pool.get()?;

        // String equality is pushed down to SQLite; other filters run in Rust
        let raw = match filter {
            Some(FieldFilter {
                field,
                value: Value::String(s),
            }) => {
                let mut stmt = conn.prepare(
                    "SELECT collection, key, version, body FROM documents
                     WHERE collection = ?1 AND json_extract(body, ?2) = ?3
                     ORDER BY key",
                )?;
                let path = format!("$.{}", field);
                let rows = stmt
                    .query_map(params![collection, path, s], row_to_document)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            _ => {
                let mut stmt = conn.prepare(
                    "SELECT collection, key, version, body FROM documents
                     WHERE collection = ?1
                     ORDER BY key",
                )?;
                let rows = stmt
                    .query_map(params![collection], row_to_document)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };

        let mut docs = Vec::with_capacity(raw.len());
        for r in raw {
            let doc = into_document(r)?;
            if filter.map_or(true, |f| f.matches(&doc)) {
                docs.push(doc);
            }
        }
        Ok(docs)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let conn = self.pool.get()?;

        // Take the write lock up front so the checks and writes see one snapshot
        conn.execute("BEGIN IMMEDIATE", [])?;

        let result: Result<(), StoreError> = (|| {
            for pre in &batch.preconditions {
                let current: Option<i64> = conn
                    .query_row(
                        "SELECT version FROM documents WHERE collection = ?1 AND key = ?2",
                        params![pre.collection, pre.key],
                        |row| row.get(0),
                    )
                    .optional()?;

                if current.map(|v| v as u64) != pre.expected_version {
                    return Err(StoreError::conflict(&pre.collection, &pre.key));
                }
            }

            for write in &batch.writes {
                let body = serde_json::to_string(&write.body)?;

                let rows = match batch.expected_version(&write.collection, &write.key) {
                    Some(Some(expected)) => conn.execute(
                        "UPDATE documents
                         SET body = ?1, version = version + 1, updated_at = datetime('now')
                         WHERE collection = ?2 AND key = ?3 AND version = ?4",
                        params![body, write.collection, write.key, expected as i64],
                    )?,
                    Some(None) => conn.execute(
                        "INSERT INTO documents (collection, key, version, body)
                         VALUES (?1, ?2, 1, ?3)
                         ON CONFLICT(collection, key) DO NOTHING",
                        params![write.collection, write.key, body],
                    )?,
                    None => conn.execute(
                        "INSERT INTO documents (collection, key, version, body)
                         VALUES (?1, ?2, 1, ?3)
                         ON CONFLICT(collection, key) DO UPDATE SET
                           body = excluded.body,
                           version = documents.version + 1,
                           updated_at = datetime('now')",
                        params![write.collection, write.key, body],
                    )?,
                };

                if rows == 0 {
                    return Err(StoreError::conflict(&write.collection, &write.key));
                }
            }

            Ok(())
        })();

        match result {
            Ok(()) => {
                conn.execute("COMMIT", [])?;
                Ok(())
            }
            Err(e) => {
                conn.execute("ROLLBACK", [])?;
                Err(e)
            }
        }
    }

    async fn remove(&self, collection: &str, key: &str) -> Result<bool, StoreError> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND key = ?2",
            params![collection, key],
        )?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::store::{Precondition, Write};
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_store() -> (SqliteDocumentStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = db::create_pool(&db_path).unwrap();
        db::run_migrations(&pool).unwrap();

        (SqliteDocumentStore::new(pool), temp_dir)
    }

    fn write(key: &str, body: Value) -> Write {
        Write {
            collection: "posts".into(),
            key: key.into(),
            body,
        }
    }

    fn guard(key: &str, expected: Option<u64>) -> Precondition {
        Precondition {
            collection: "posts".into(),
            key: key.into(),
            expected_version: expected,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (store, _temp) = create_test_store();

        let created = store
            .create("posts", json!({"text": "hello", "likes": {}}))
            .await
            .unwrap();
        assert_eq!(created.version, 1);

        let loaded = store.get("posts", &created.key).await.unwrap();
        assert_eq!(loaded, Some(created));
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let (store, _temp) = create_test_store();
        assert_eq!(store.get("posts", "nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_conflicts_on_existing_key() {
        let (store, _temp) = create_test_store();
        store.put("users", "alice", json!({"name": "A"})).await.unwrap();

        let err = store.put("users", "alice", json!({"name": "B"})).await.unwrap_err();
        assert!(err.is_conflict());

        // Same key in another collection is fine
        store.put("sessions", "alice", json!({})).await.unwrap();
    }

    #[tokio::test]
    async fn test_commit_compare_and_swap() {
        let (store, _temp) = create_test_store();
        store.put("posts", "p1", json!({"n": 0})).await.unwrap();

        store
            .commit(WriteBatch {
                preconditions: vec![guard("p1", Some(1))],
                writes: vec![write("p1", json!({"n": 1}))],
            })
            .await
            .unwrap();

        let doc = store.get("posts", "p1").await.unwrap().unwrap();
        assert_eq!(doc.version, 2);
        assert_eq!(doc.body, json!({"n": 1}));

        // Stale writer is rejected
        let err = store
            .commit(WriteBatch {
                preconditions: vec![guard("p1", Some(1))],
                writes: vec![write("p1", json!({"n": 42}))],
            })
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let doc = store.get("posts", "p1").await.unwrap().unwrap();
        assert_eq!(doc.version, 2);
        assert_eq!(doc.body, json!({"n": 1}));
    }

    #[tokio::test]
    async fn test_commit_rolls_back_whole_batch() {
        let (store, _temp) = create_test_store();
        store.put("posts", "p1", json!({"n": 0})).await.unwrap();
        store.put("posts", "p2", json!({"n": 0})).await.unwrap();

        // p1 guard is fine, p2 guard is stale
        let err = store
            .commit(WriteBatch {
                preconditions: vec![guard("p1", Some(1)), guard("p2", Some(7))],
                writes: vec![write("p1", json!({"n": 1})), write("p2", json!({"n": 1}))],
            })
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let p1 = store.get("posts", "p1").await.unwrap().unwrap();
        assert_eq!(p1.version, 1);
        assert_eq!(p1.body, json!({"n": 0}));
    }

    #[tokio::test]
    async fn test_commit_insert_guard() {
        let (store, _temp) = create_test_store();

        let batch = WriteBatch {
            preconditions: vec![guard("fresh", None)],
            writes: vec![write("fresh", json!({"n": 1}))],
        };
        store.commit(batch.clone()).await.unwrap();

        // Replaying the same "must not exist" batch conflicts
        assert!(store.commit(batch).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_list_with_string_filter() {
        let (store, _temp) = create_test_store();
        store.put("posts", "a", json!({"authorId": "u1"})).await.unwrap();
        store.put("posts", "b", json!({"authorId": "u2"})).await.unwrap();
        store.put("posts", "c", json!({"authorId": "u1"})).await.unwrap();

        let filter = FieldFilter::eq("authorId", "u1");
        let docs = store.list("posts", Some(&filter)).await.unwrap();
        let keys: Vec<_> = docs.iter().map(|d| d.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "c"]);

        assert_eq!(store.list("posts", None).await.unwrap().len(), 3);
        assert!(store.list("users", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_with_non_string_filter() {
        let (store, _temp) = create_test_store();
        store.put("flags", "a", json!({"on": true})).await.unwrap();
        store.put("flags", "b", json!({"on": false})).await.unwrap();

        let filter = FieldFilter::eq("on", true);
        let docs = store.list("flags", Some(&filter)).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].key, "a");
    }

    #[tokio::test]
    async fn test_remove() {
        let (store, _temp) = create_test_store();
        store.put("sessions", "tok", json!({})).await.unwrap();

        assert!(store.remove("sessions", "tok").await.unwrap());
        assert!(!store.remove("sessions", "tok").await.unwrap());
        assert_eq!(store.get("sessions", "tok").await.unwrap(), None);
    }
}
