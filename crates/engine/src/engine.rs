//! The etag-based sync engine.
//!
//! Orchestrates the local store and the remote endpoint:
//!
//! - reads are served from cache immediately when an entry exists, with a
//!   single background conditional GET revalidating freshness;
//! - writes always go to the server first and are committed to the cache
//!   only on server acknowledgement, using the server-returned body.
//!
//! The engine owns all cache writes. It never retries, never expires
//! entries by age, and never deduplicates concurrent operations.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::oneshot;

use restcache_client::endpoint::{ApiRequest, ApiResponse, Conditions, RemoteEndpoint};
use restcache_client::resources::Resource;
use restcache_core::record::{CacheEntry, Operation};
use restcache_core::{Error, LocalStore};

/// Where the primary read delivery came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    /// Served from the local store; a revalidation is in flight.
    Cache,
    /// Fetched from the server on a cache miss.
    Remote,
}

/// Result of a read: the primary delivery plus, for cache hits, a handle
/// to the single secondary revalidation delivery.
#[derive(Debug)]
pub struct ReadOutcome {
    pub entry: CacheEntry,
    pub source: ReadSource,
    /// Present iff the primary delivery came from cache. The primary
    /// delivery always precedes anything on this channel; a caller that
    /// doesn't care simply drops the handle.
    pub revalidation: Option<Revalidation>,
}

/// Handle to the secondary delivery of a read.
///
/// Resolves at most once: `Ok(Some(entry))` when the server reported a
/// changed body (the cache is already updated), `Ok(None)` when the server
/// reported no change, `Err` when revalidation failed. A failed
/// revalidation never touches the cache; the already-delivered value
/// stands.
#[derive(Debug)]
pub struct Revalidation {
    rx: oneshot::Receiver<Result<Option<CacheEntry>, Error>>,
}

impl Revalidation {
    /// Wait for the revalidation result.
    pub async fn wait(self) -> Result<Option<CacheEntry>, Error> {
        self.rx.await.unwrap_or_else(|_| {
            Err(Error::Remote { status: None, message: "revalidation task dropped".into() })
        })
    }
}

/// Inputs for the string-keyed [`SyncEngine::sync`] dispatch.
#[derive(Debug, Default)]
pub struct RecordRef<'a> {
    pub key: Option<&'a str>,
    pub etag: Option<&'a str>,
    pub body: Option<Value>,
}

/// Result of a dispatched sync operation.
#[derive(Debug)]
pub enum SyncOutcome {
    Read(ReadOutcome),
    Written(CacheEntry),
    Deleted,
}

/// Sync engine binding a [`LocalStore`] and a [`RemoteEndpoint`].
///
/// Both collaborators are injected; the engine holds no global state.
pub struct SyncEngine<S, R> {
    store: Arc<S>,
    remote: Arc<R>,
}

impl<S, R> Clone for SyncEngine<S, R> {
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store), remote: Arc::clone(&self.remote) }
    }
}

impl<S, R> SyncEngine<S, R>
where
    S: LocalStore + 'static,
    R: RemoteEndpoint + 'static,
{
    pub fn new(store: S, remote: R) -> Self {
        Self::with_shared(Arc::new(store), Arc::new(remote))
    }

    /// Build from already-shared collaborators. Useful when the caller
    /// keeps its own handle, e.g. to read the store directly.
    pub fn with_shared(store: Arc<S>, remote: Arc<R>) -> Self {
        Self { store, remote }
    }

    /// The injected local store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Read a record.
    ///
    /// Cache hit: returns the cached body immediately and spawns exactly
    /// one conditional GET using the cached etag; the outcome carries a
    /// [`Revalidation`] handle for the secondary delivery. Cache miss:
    /// performs an unconditional GET, populates the cache on success, and
    /// returns the body with no revalidation handle. A failed fetch on a
    /// miss leaves the cache untouched.
    pub async fn read(&self, resource: &Resource, key: &str) -> Result<ReadOutcome, Error> {
        let collection = resource.name();

        match self.store.get(collection, key).await? {
            Some(entry) => {
                tracing::debug!("cache hit for {collection}/{key}, revalidating");
                let conditions = Conditions::revalidate(entry.etag.as_deref(), entry.updated.as_deref());
                let req = resource.request(Operation::Read, &[(resource.key_param(), key)], conditions, None)?;

                let (tx, rx) = oneshot::channel();
                let store = Arc::clone(&self.store);
                let remote = Arc::clone(&self.remote);
                let collection = collection.to_string();
                let cache_key = cache_key(resource, key);
                tokio::spawn(async move {
                    let result = revalidate(&*remote, &*store, req, &collection, cache_key.as_deref()).await;
                    // the caller may have dropped the handle; that just
                    // abandons the secondary delivery
                    let _ = tx.send(result);
                });

                Ok(ReadOutcome { entry, source: ReadSource::Cache, revalidation: Some(Revalidation { rx }) })
            }
            None => {
                tracing::debug!("cache miss for {collection}/{key}");
                let req = resource.request(Operation::Read, &[(resource.key_param(), key)], Conditions::none(), None)?;
                let resp = self.remote.request(req).await?;
                let (body, etag) = expect_body(resp)?;

                let stored_key = self
                    .store
                    .put(collection, &body, etag.as_deref(), cache_key(resource, key).as_deref())
                    .await?;

                Ok(ReadOutcome {
                    entry: entry_now(collection, stored_key, body, etag),
                    source: ReadSource::Remote,
                    revalidation: None,
                })
            }
        }
    }

    /// Update a record with optimistic concurrency.
    ///
    /// Sends PUT with `If-Match` when an etag is given. On success the
    /// server-returned body is written through to the cache. A 412 yields
    /// [`Error::Conflict`] with the server's current body when present; no
    /// failure mutates the cache. A cache write failure after server
    /// success is [`Error::Diverged`].
    pub async fn update(
        &self,
        resource: &Resource,
        key: &str,
        body: Value,
        etag: Option<&str>,
    ) -> Result<CacheEntry, Error> {
        let collection = resource.name();
        let conditions = etag.map(Conditions::if_match).unwrap_or_default();
        let req = resource.request(Operation::Update, &[(resource.key_param(), key)], conditions, Some(body))?;

        let resp = self.remote.request(req).await?;
        if resp.is_precondition_failed() {
            tracing::debug!("update conflict for {collection}/{key}");
            return Err(Error::Conflict { current: resp.body });
        }
        let (returned, new_etag) = expect_body(resp)?;

        let stored_key = self
            .store
            .put(collection, &returned, new_etag.as_deref(), cache_key(resource, key).as_deref())
            .await
            .map_err(Error::Diverged)?;

        Ok(entry_now(collection, stored_key, returned, new_etag))
    }

    /// Create a record.
    ///
    /// Sends POST; on success the server-returned body is added to the
    /// cache as a new entry. Inline-keyed resources take the
    /// server-assigned key from the returned body; externally-keyed ones
    /// require `key`. A cache write failure after server success is
    /// [`Error::Diverged`].
    pub async fn create(&self, resource: &Resource, body: Value, key: Option<&str>) -> Result<CacheEntry, Error> {
        let collection = resource.name();
        if !resource.inline_key() && key.is_none() {
            return Err(Error::Missing { resource: collection.to_string(), what: "key".into() });
        }

        let values: Vec<(&str, &str)> = key.map(|k| (resource.key_param(), k)).into_iter().collect();
        let req = resource.request(Operation::Create, &values, Conditions::none(), Some(body))?;

        let resp = self.remote.request(req).await?;
        let (returned, new_etag) = expect_body(resp)?;

        let cache_key = if resource.inline_key() { None } else { key };
        let stored_key = self
            .store
            .add(collection, &returned, new_etag.as_deref(), cache_key)
            .await
            .map_err(Error::Diverged)?;

        tracing::debug!("created {collection}/{stored_key}");
        Ok(entry_now(collection, stored_key, returned, new_etag))
    }

    /// Delete a record.
    ///
    /// Sends DELETE; on success the cache entry is removed. On failure the
    /// cache is untouched. A cache clear failure after server success is
    /// [`Error::Diverged`].
    pub async fn delete(&self, resource: &Resource, key: &str) -> Result<(), Error> {
        let collection = resource.name();
        let req = resource.request(Operation::Delete, &[(resource.key_param(), key)], Conditions::none(), None)?;

        let resp = self.remote.request(req).await?;
        if !resp.is_success() {
            return Err(remote_rejection(&resp));
        }

        self.store.clear(collection, key).await.map_err(Error::Diverged)?;
        tracing::debug!("deleted {collection}/{key}");
        Ok(())
    }

    /// String-keyed dispatch over the four operations.
    ///
    /// An operation string outside {read, update, create, delete} fails
    /// with [`Error::Unsupported`] naming the offending operation.
    pub async fn sync(&self, operation: &str, resource: &Resource, rec: RecordRef<'_>) -> Result<SyncOutcome, Error> {
        let op: Operation = operation.parse()?;
        match op {
            Operation::Read => {
                let key = require(resource, rec.key, "key")?;
                Ok(SyncOutcome::Read(self.read(resource, key).await?))
            }
            Operation::Update => {
                let key = require(resource, rec.key, "key")?;
                let body = require(resource, rec.body, "body")?;
                Ok(SyncOutcome::Written(self.update(resource, key, body, rec.etag).await?))
            }
            Operation::Create => {
                let body = require(resource, rec.body, "body")?;
                Ok(SyncOutcome::Written(self.create(resource, body, rec.key).await?))
            }
            Operation::Delete => {
                let key = require(resource, rec.key, "key")?;
                self.delete(resource, key).await?;
                Ok(SyncOutcome::Deleted)
            }
        }
    }
}

/// Explicit cache key for store writes: `None` for inline-keyed resources
/// (the store derives the key from the body), the caller's key otherwise.
fn cache_key(resource: &Resource, key: &str) -> Option<String> {
    if resource.inline_key() { None } else { Some(key.to_string()) }
}

fn require<T>(resource: &Resource, value: Option<T>, what: &str) -> Result<T, Error> {
    value.ok_or_else(|| Error::Missing { resource: resource.name().to_string(), what: what.to_string() })
}

fn remote_rejection(resp: &ApiResponse) -> Error {
    Error::Remote { status: Some(resp.status), message: "server rejected request".into() }
}

/// Interpret a response that must carry a body: 2xx with body succeeds,
/// 412 becomes a conflict, everything else is a remote error.
fn expect_body(resp: ApiResponse) -> Result<(Value, Option<String>), Error> {
    if resp.is_precondition_failed() {
        return Err(Error::Conflict { current: resp.body });
    }
    if !resp.is_success() {
        return Err(remote_rejection(&resp));
    }
    match resp.body {
        Some(body) => Ok((body, resp.etag)),
        None => Err(Error::Remote { status: Some(resp.status), message: "response carried no body".into() }),
    }
}

fn entry_now(collection: &str, key: String, body: Value, etag: Option<String>) -> CacheEntry {
    let updated = body.get("updated").and_then(Value::as_str).map(str::to_string);
    CacheEntry {
        collection: collection.to_string(),
        key,
        body,
        etag,
        updated,
        cached_at: chrono::Utc::now().to_rfc3339(),
    }
}

/// Background half of a cache-hit read: one conditional GET, then either
/// a cache update (changed body) or nothing (no change). Errors are
/// reported on the secondary channel only; the cache is never invalidated
/// by a failed revalidation.
async fn revalidate<S, R>(
    remote: &R,
    store: &S,
    req: ApiRequest,
    collection: &str,
    cache_key: Option<&str>,
) -> Result<Option<CacheEntry>, Error>
where
    S: LocalStore + ?Sized,
    R: RemoteEndpoint + ?Sized,
{
    let resp = remote.request(req).await?;

    if resp.is_not_modified() {
        tracing::debug!("no change in server for {collection}");
        return Ok(None);
    }
    if !resp.is_success() {
        return Err(remote_rejection(&resp));
    }
    // an empty success body also expresses "no change"
    let Some(body) = resp.body else {
        return Ok(None);
    };

    let etag = resp.etag;
    let key = store.put(collection, &body, etag.as_deref(), cache_key).await?;
    tracing::debug!("revalidation updated {collection}/{key}");
    Ok(Some(entry_now(collection, key, body, etag)))
}
