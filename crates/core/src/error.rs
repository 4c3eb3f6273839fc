//! Unified error types for restcache.
//!
//! Every failure is reported to the immediate caller through the `Result`
//! channel. Nothing is retried internally and nothing is logged-and-dropped.

use serde_json::Value;
use tokio_rusqlite::rusqlite;

/// Errors surfaced by sync operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network/transport failure or a non-2xx response not covered by a
    /// precondition. Carries the HTTP status when one was received.
    #[error("remote error{}: {message}", status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Remote { status: Option<u16>, message: String },

    /// Request timeout.
    #[error("request timeout")]
    Timeout,

    /// Precondition-failed response to a conditional update (etag mismatch).
    /// Carries the server's current body when the response included one, so
    /// the caller can merge, overwrite, or abort.
    #[error("conflict: etag precondition failed")]
    Conflict { current: Option<Value> },

    /// Operation string outside {read, update, create, delete}.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// A required parameter or input could not be resolved.
    #[error("{resource}: missing {what}")]
    Missing { resource: String, what: String },

    /// Local persistence failure. Cache state is unchanged.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The server accepted a write but the local cache write failed
    /// afterwards. Server and local state now differ; callers must not
    /// treat this as a server failure.
    #[error("cache diverged from server after successful write: {0}")]
    Diverged(StoreError),

    /// A record body could not be decoded into the requested model type.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Local store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(tokio_rusqlite::Error),

    /// `add` refused to overwrite an existing entry.
    #[error("key already exists: {collection}/{key}")]
    KeyExists { collection: String, key: String },

    /// An inline-keyed body carried no usable key field.
    #[error("no key in body for collection {collection} (key field: {key_field})")]
    MissingKey { collection: String, key_field: String },

    /// A cached body failed to parse as JSON.
    #[error("corrupt cache entry {collection}/{key}: {message}")]
    Corrupt {
        collection: String,
        key: String,
        message: String,
    },

    /// Schema migration failure.
    #[error("migration failed: {0}")]
    MigrationFailed(String),
}

impl From<tokio_rusqlite::Error<StoreError>> for StoreError {
    fn from(err: tokio_rusqlite::Error<StoreError>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => {
                StoreError::Database(tokio_rusqlite::Error::ConnectionClosed)
            }
            tokio_rusqlite::Error::Close(c) => StoreError::Database(tokio_rusqlite::Error::Close(c)),
            _ => StoreError::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for StoreError {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        StoreError::Database(err)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(tokio_rusqlite::Error::Error(err))
    }
}
