//! Object store capability consumed by the gateway.
//!
//! The gateway never speaks the S3 wire protocol itself; it drives an
//! [`ObjectStoreClient`]. [`s3::S3Backend`] is the production implementation
//! and [`memory::InMemoryBackend`] is a process-local substitute.

pub mod memory;
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use std::{path::PathBuf, pin::Pin, time::Duration};
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::models::object::ObjectDescriptor;

pub use memory::InMemoryBackend;
pub use s3::S3Backend;

/// Errors reported by an object store implementation.
///
/// `NotFound` is kept apart from every other failure so callers can tell a
/// confirmed absence from a backend that could not answer.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{code}: {message}")]
    Service { code: String, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl BackendError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound(_))
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Payload source for `put_object`. The declared size travels separately and
/// is trusted by the backend.
#[derive(Debug, Clone)]
pub enum ObjectBody {
    Bytes(Bytes),
    File(PathBuf),
}

pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

/// An object being read: its metadata plus a reader over the payload.
pub struct ObjectStream {
    pub object: ObjectDescriptor,
    /// Payload length when the backend announced it up front.
    pub content_length: Option<u64>,
    pub reader: ObjectReader,
}

impl std::fmt::Debug for ObjectStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStream")
            .field("object", &self.object)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Bucket and object operations the gateway needs from an S3-compatible
/// store.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    async fn bucket_exists(&self, bucket: &str) -> BackendResult<bool>;

    async fn make_bucket(&self, bucket: &str, region: &str) -> BackendResult<()>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: ObjectBody,
        size: u64,
        content_type: &str,
    ) -> BackendResult<ObjectDescriptor>;

    async fn get_object(&self, bucket: &str, key: &str) -> BackendResult<ObjectStream>;

    /// Recursive listing of every key starting with `prefix`.
    async fn list_objects(&self, bucket: &str, prefix: &str) -> BackendResult<Vec<ObjectDescriptor>>;

    /// Metadata probe; absent keys yield [`BackendError::NotFound`].
    async fn stat_object(&self, bucket: &str, key: &str) -> BackendResult<ObjectDescriptor>;

    async fn remove_object(&self, bucket: &str, key: &str) -> BackendResult<()>;

    async fn presign_get(&self, bucket: &str, key: &str, expiry: Duration) -> BackendResult<String>;
}
