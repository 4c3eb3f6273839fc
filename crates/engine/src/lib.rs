//! Sync engine for restcache.
//!
//! Coordinates a local record store and a remote REST endpoint under the
//! etag protocol: read-through with background revalidation, server-first
//! write-through. Collaborators are injected through the
//! [`restcache_core::LocalStore`] and
//! [`restcache_client::RemoteEndpoint`] traits.

pub mod engine;
mod models;

pub use engine::{ReadOutcome, ReadSource, RecordRef, Revalidation, SyncEngine, SyncOutcome};
