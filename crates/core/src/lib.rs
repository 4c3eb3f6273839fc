//! Core types and shared functionality for restcache.
//!
//! This crate provides:
//! - Record and operation vocabulary, including the `Syncable` trait
//! - The `LocalStore` contract and its SQLite implementation
//! - Unified error types
//! - Configuration structures

pub mod config;
pub mod error;
pub mod record;
pub mod store;

pub use config::AppConfig;
pub use error::{Error, StoreError};
pub use record::{CacheEntry, Operation, Syncable};
pub use store::{LocalStore, SqliteStore};
