//! Record and operation vocabulary shared across the workspace.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Error;

/// A cached record: one `(collection, key)` slot in the local store.
///
/// The body is an opaque JSON object. The etag is the server-issued version
/// token; equal etags imply equal content. `updated` is the server's
/// last-modified timestamp when the body carries one, used for
/// `If-Modified-Since` on revalidation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub collection: String,
    pub key: String,
    pub body: Value,
    pub etag: Option<String>,
    pub updated: Option<String>,
    /// When this entry was last written, RFC 3339.
    pub cached_at: String,
}

/// The four sync operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Read,
    Update,
    Create,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Create => "create",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = Error;

    /// Anything outside the four known operations is rejected, naming the
    /// offending operation.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Operation::Read),
            "update" => Ok(Operation::Update),
            "create" => Ok(Operation::Create),
            "delete" => Ok(Operation::Delete),
            other => Err(Error::Unsupported(other.to_string())),
        }
    }
}

/// Capability interface for record types that can be synchronized.
///
/// The sync engine depends only on this trait, not on any concrete model
/// type. Implementors name their collection and expose the fields the etag
/// protocol needs.
pub trait Syncable: Serialize + DeserializeOwned + Send + Sync {
    /// Store/collection name for this record type (e.g. "feed", "entry").
    fn collection() -> &'static str;

    /// Primary key, when known. New records without a server-assigned key
    /// return `None`.
    fn key(&self) -> Option<String>;

    /// Server-issued version token, when known.
    fn etag(&self) -> Option<String>;

    /// Last-modified timestamp, when the record tracks one.
    fn updated(&self) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_round_trip() {
        for op in [Operation::Read, Operation::Update, Operation::Create, Operation::Delete] {
            assert_eq!(op.as_str().parse::<Operation>().unwrap(), op);
        }
    }

    #[test]
    fn test_operation_unknown() {
        let err = "patch".parse::<Operation>().unwrap_err();
        assert!(matches!(err, Error::Unsupported(op) if op == "patch"));
    }

    #[test]
    fn test_cache_entry_serde() {
        let entry = CacheEntry {
            collection: "feed".into(),
            key: "abc".into(),
            body: serde_json::json!({"id": "abc", "title": "A"}),
            etag: Some("v1".into()),
            updated: None,
            cached_at: "2026-01-01T00:00:00Z".into(),
        };
        let json = serde_json::to_string(&entry).unwrap();
        let back: CacheEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
