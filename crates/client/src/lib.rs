//! Client code for restcache.
//!
//! This crate provides the remote endpoint abstraction, its reqwest-backed
//! HTTP implementation, and the static resource mapping table consumed by
//! the sync engine.

pub mod endpoint;
pub mod resources;

pub use endpoint::{ApiRequest, ApiResponse, Conditions, EndpointConfig, HttpEndpoint, Method, RemoteEndpoint};
pub use resources::{OperationSpec, Resource};
