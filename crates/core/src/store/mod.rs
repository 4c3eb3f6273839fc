//! Local persistent key-value store for cached records.
//!
//! The store is a passive collaborator: it holds `(collection, key) ->
//! (body, etag)` entries and carries no caching logic of its own. Only the
//! sync engine writes to it. Backed by SQLite with async access via
//! tokio-rusqlite.

pub mod connection;
pub mod migrations;
pub mod records;

use async_trait::async_trait;
use serde_json::Value;

use crate::StoreError;
use crate::record::CacheEntry;

pub use connection::SqliteStore;

/// Storage contract consumed by the sync engine.
///
/// `put` is an upsert; `add` is insert-only and fails with
/// [`StoreError::KeyExists`] when the key is already present, which is what
/// distinguishes create from upsert. A `None` key means the body is
/// self-keying and the store derives the key from the body's key field.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<CacheEntry>, StoreError>;

    async fn put(
        &self,
        collection: &str,
        body: &Value,
        etag: Option<&str>,
        key: Option<&str>,
    ) -> Result<String, StoreError>;

    async fn add(
        &self,
        collection: &str,
        body: &Value,
        etag: Option<&str>,
        key: Option<&str>,
    ) -> Result<String, StoreError>;

    async fn clear(&self, collection: &str, key: &str) -> Result<(), StoreError>;
}
