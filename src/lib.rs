//! HTTP gateway over an S3-compatible object store.
//!
//! Clients upload, list, fetch and delete files through a small JSON API
//! without holding object store credentials. The
//! [`StorageGateway`](services::gateway::StorageGateway) owns the backend
//! connection and the single bucket; the handlers translate HTTP to gateway
//! calls and back.

pub mod backend;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
