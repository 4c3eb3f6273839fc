//! Typed-model conveniences over the engine.
//!
//! Record types implementing [`Syncable`] can round-trip through the sync
//! paths without the caller touching raw JSON bodies.

use serde_json::Value;

use restcache_client::endpoint::RemoteEndpoint;
use restcache_client::resources::Resource;
use restcache_core::{Error, LocalStore, Syncable};

use crate::engine::{Revalidation, SyncEngine};

impl<S, R> SyncEngine<S, R>
where
    S: LocalStore + 'static,
    R: RemoteEndpoint + 'static,
{
    /// Read a record as a typed model.
    ///
    /// The revalidation handle still delivers raw entries; a changed body
    /// can be decoded by the caller with [`serde_json::from_value`].
    pub async fn read_model<T: Syncable>(
        &self,
        resource: &Resource,
        key: &str,
    ) -> Result<(T, Option<Revalidation>), Error> {
        let outcome = self.read(resource, key).await?;
        let model = decode(outcome.entry.body)?;
        Ok((model, outcome.revalidation))
    }

    /// Update a record from a typed model, returning the server's version.
    ///
    /// The model must carry its key; its etag (when present) becomes the
    /// `If-Match` precondition.
    pub async fn update_model<T: Syncable>(&self, resource: &Resource, model: &T) -> Result<T, Error> {
        let key = model.key().ok_or_else(|| Error::Missing {
            resource: resource.name().to_string(),
            what: "key".into(),
        })?;
        let body = encode(model)?;
        let etag = model.etag();
        let entry = self.update(resource, &key, body, etag.as_deref()).await?;
        decode(entry.body)
    }

    /// Create a record from a typed model, returning the server's version
    /// (which carries the assigned key and etag).
    pub async fn create_model<T: Syncable>(&self, resource: &Resource, model: &T) -> Result<T, Error> {
        let body = encode(model)?;
        let key = model.key();
        let entry = self.create(resource, body, key.as_deref()).await?;
        decode(entry.body)
    }
}

fn encode<T: Syncable>(model: &T) -> Result<Value, Error> {
    serde_json::to_value(model).map_err(|e| Error::Decode(e.to_string()))
}

fn decode<T: Syncable>(body: Value) -> Result<T, Error> {
    serde_json::from_value(body).map_err(|e| Error::Decode(e.to_string()))
}
