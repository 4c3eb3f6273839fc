//! Record CRUD operations.
//!
//! `put` upserts, `add` is insert-only, `get` returns the decoded entry or
//! `None` on a miss, `clear` deletes. Keys are supplied by the caller or,
//! for inline-keyed bodies, derived from the body's key field.

use async_trait::async_trait;
use serde_json::Value;
use tokio_rusqlite::rusqlite;
use tokio_rusqlite::params;

use super::LocalStore;
use super::connection::SqliteStore;
use crate::StoreError;
use crate::record::CacheEntry;

/// Extract the record key from a self-keying body.
fn inline_key(collection: &str, key_field: &str, body: &Value) -> Result<String, StoreError> {
    match body.get(key_field) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(StoreError::MissingKey {
            collection: collection.to_string(),
            key_field: key_field.to_string(),
        }),
    }
}

/// The `updated` timestamp is indexed separately when the body carries one.
fn updated_of(body: &Value) -> Option<String> {
    body.get("updated").and_then(Value::as_str).map(str::to_string)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

impl SqliteStore {
    fn resolve_key(&self, collection: &str, body: &Value, key: Option<&str>) -> Result<String, StoreError> {
        match key {
            Some(k) => Ok(k.to_string()),
            None => inline_key(collection, &self.key_field, body),
        }
    }

    async fn get_entry(&self, collection: &str, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        let collection = collection.to_string();
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, StoreError> {
                let mut stmt = conn.prepare(
                    "SELECT body_json, etag, updated, cached_at
                     FROM records WHERE collection = ?1 AND record_key = ?2",
                )?;

                let result = stmt.query_row(params![collection, key], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                });

                match result {
                    Ok((body_json, etag, updated, cached_at)) => {
                        let body = serde_json::from_str(&body_json).map_err(|e| StoreError::Corrupt {
                            collection: collection.clone(),
                            key: key.clone(),
                            message: e.to_string(),
                        })?;
                        Ok(Some(CacheEntry { collection, key, body, etag, updated, cached_at }))
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(StoreError::from)
    }

    async fn put_entry(
        &self,
        collection: &str,
        body: &Value,
        etag: Option<&str>,
        key: Option<&str>,
    ) -> Result<String, StoreError> {
        let key = self.resolve_key(collection, body, key)?;
        let collection = collection.to_string();
        let body_json = body.to_string();
        let etag = etag.map(str::to_string);
        let updated = updated_of(body);
        let cached_at = chrono::Utc::now().to_rfc3339();

        let stored_key = key.clone();
        self.conn
            .call(move |conn| -> Result<(), StoreError> {
                conn.execute(
                    "INSERT INTO records (collection, record_key, body_json, etag, updated, cached_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(collection, record_key) DO UPDATE SET
                        body_json = excluded.body_json,
                        etag = excluded.etag,
                        updated = excluded.updated,
                        cached_at = excluded.cached_at",
                    params![collection, stored_key, body_json, etag, updated, cached_at],
                )?;
                Ok(())
            })
            .await
            .map_err(StoreError::from)?;

        tracing::debug!("stored record {}", key);
        Ok(key)
    }

    async fn add_entry(
        &self,
        collection: &str,
        body: &Value,
        etag: Option<&str>,
        key: Option<&str>,
    ) -> Result<String, StoreError> {
        let key = self.resolve_key(collection, body, key)?;
        let collection = collection.to_string();
        let body_json = body.to_string();
        let etag = etag.map(str::to_string);
        let updated = updated_of(body);
        let cached_at = chrono::Utc::now().to_rfc3339();

        let stored_key = key.clone();
        let stored_collection = collection.clone();
        self.conn
            .call(move |conn| -> Result<(), StoreError> {
                conn.execute(
                    "INSERT INTO records (collection, record_key, body_json, etag, updated, cached_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![stored_collection, stored_key, body_json, etag, updated, cached_at],
                )
                .map_err(|e| {
                    if is_constraint_violation(&e) {
                        StoreError::KeyExists { collection: stored_collection.clone(), key: stored_key.clone() }
                    } else {
                        e.into()
                    }
                })?;
                Ok(())
            })
            .await
            .map_err(StoreError::from)?;

        tracing::debug!("added record {}", key);
        Ok(key)
    }

    async fn clear_entry(&self, collection: &str, key: &str) -> Result<(), StoreError> {
        let collection = collection.to_string();
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<(), StoreError> {
                conn.execute(
                    "DELETE FROM records WHERE collection = ?1 AND record_key = ?2",
                    params![collection, key],
                )?;
                Ok(())
            })
            .await
            .map_err(StoreError::from)
    }
}

#[async_trait]
impl LocalStore for SqliteStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        self.get_entry(collection, key).await
    }

    async fn put(
        &self,
        collection: &str,
        body: &Value,
        etag: Option<&str>,
        key: Option<&str>,
    ) -> Result<String, StoreError> {
        self.put_entry(collection, body, etag, key).await
    }

    async fn add(
        &self,
        collection: &str,
        body: &Value,
        etag: Option<&str>,
        key: Option<&str>,
    ) -> Result<String, StoreError> {
        self.add_entry(collection, body, etag, key).await
    }

    async fn clear(&self, collection: &str, key: &str) -> Result<(), StoreError> {
        self.clear_entry(collection, key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_and_get() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let body = json!({"id": "abc", "title": "A"});

        let key = store.put("feed", &body, Some("v1"), Some("abc")).await.unwrap();
        assert_eq!(key, "abc");

        let entry = store.get("feed", "abc").await.unwrap().unwrap();
        assert_eq!(entry.body, body);
        assert_eq!(entry.etag.as_deref(), Some("v1"));
        assert_eq!(entry.collection, "feed");
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        assert!(store.get("feed", "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_derives_inline_key() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let body = json!({"id": "xyz", "title": "inline"});

        let key = store.put("entry", &body, None, None).await.unwrap();
        assert_eq!(key, "xyz");
        assert!(store.get("entry", "xyz").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_put_missing_inline_key() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let body = json!({"title": "no id"});

        let err = store.put("entry", &body, None, None).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingKey { .. }));
    }

    #[tokio::test]
    async fn test_put_upserts() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store
            .put("feed", &json!({"id": "abc", "title": "A"}), Some("v1"), Some("abc"))
            .await
            .unwrap();
        store
            .put("feed", &json!({"id": "abc", "title": "B"}), Some("v2"), Some("abc"))
            .await
            .unwrap();

        let entry = store.get("feed", "abc").await.unwrap().unwrap();
        assert_eq!(entry.body["title"], "B");
        assert_eq!(entry.etag.as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_add_rejects_existing_key() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store
            .add("feed", &json!({"id": "abc"}), None, Some("abc"))
            .await
            .unwrap();

        let err = store
            .add("feed", &json!({"id": "abc"}), None, Some("abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::KeyExists { collection, key } if collection == "feed" && key == "abc"));
    }

    #[tokio::test]
    async fn test_same_key_different_collections() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.add("feed", &json!({"id": "abc"}), None, Some("abc")).await.unwrap();
        store.add("entry", &json!({"id": "abc"}), None, Some("abc")).await.unwrap();

        assert!(store.get("feed", "abc").await.unwrap().is_some());
        assert!(store.get("entry", "abc").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clear() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.put("feed", &json!({"id": "abc"}), None, Some("abc")).await.unwrap();

        store.clear("feed", "abc").await.unwrap();
        assert!(store.get("feed", "abc").await.unwrap().is_none());

        // clearing an absent entry is a no-op
        store.clear("feed", "abc").await.unwrap();
    }

    #[tokio::test]
    async fn test_updated_extracted_from_body() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let body = json!({"id": "abc", "updated": "2026-01-02T03:04:05Z"});

        store.put("feed", &body, None, None).await.unwrap();
        let entry = store.get("feed", "abc").await.unwrap().unwrap();
        assert_eq!(entry.updated.as_deref(), Some("2026-01-02T03:04:05Z"));
    }

    #[tokio::test]
    async fn test_custom_key_field() {
        let store = SqliteStore::open_in_memory().await.unwrap().with_key_field("uuid");
        let body = json!({"uuid": "u-1", "title": "custom"});

        let key = store.put("entry", &body, None, None).await.unwrap();
        assert_eq!(key, "u-1");
    }
}
