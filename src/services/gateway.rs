//! StorageGateway — the single owner of the object store connection.
//!
//! Wraps an [`ObjectStoreClient`] with the gateway's policy: the bucket is
//! provisioned at startup, upload keys come from a [`KeyPolicy`], share links
//! use fixed expiry defaults, and every backend call runs under a deadline.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::{future::Future, path::PathBuf, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use super::naming::KeyPolicy;
use crate::{
    backend::{BackendError, ObjectBody, ObjectStoreClient, ObjectStream},
    models::object::ObjectDescriptor,
};

const MAX_OBJECT_KEY_LEN: usize = 1024;

/// Share links handed out by uploads and listings.
pub const DEFAULT_UPLOAD_URL_EXPIRY: Duration = Duration::from_secs(24 * 60 * 60);
/// Share links used for direct retrieval redirects.
pub const DEFAULT_RETRIEVE_URL_EXPIRY: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(30);
/// Longest expiry SigV4 presigning accepts.
pub const MAX_URL_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("object store unavailable: {0}")]
    BackendUnavailable(String),
    #[error("failed to create bucket `{bucket}`: {reason}")]
    BucketProvisioningFailed { bucket: String, reason: String },
    #[error("invalid object key")]
    InvalidKey,
    #[error("expiry must be a positive duration")]
    InvalidExpiry,
    #[error("failed to upload file: {0}")]
    UploadFailed(String),
    #[error("object `{0}` not found")]
    ObjectNotFound(String),
    #[error("failed to download object: {0}")]
    DownloadFailed(String),
    #[error("error listing objects: {0}")]
    ListFailed(String),
    #[error("failed to check if object exists: {0}")]
    StatFailed(String),
    #[error("failed to delete object: {0}")]
    DeleteFailed(String),
    #[error("failed to generate presigned URL: {0}")]
    UrlSigningFailed(String),
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Tunable gateway policy.
#[derive(Debug, Clone)]
pub struct GatewayPolicy {
    pub upload_url_expiry: Duration,
    pub retrieve_url_expiry: Duration,
    pub key_policy: KeyPolicy,
    /// Upper bound for any single backend call.
    pub backend_timeout: Duration,
    /// Directory for spooled uploads; the system temp dir when unset.
    pub spool_dir: Option<PathBuf>,
}

impl Default for GatewayPolicy {
    fn default() -> Self {
        Self {
            upload_url_expiry: DEFAULT_UPLOAD_URL_EXPIRY,
            retrieve_url_expiry: DEFAULT_RETRIEVE_URL_EXPIRY,
            key_policy: KeyPolicy::default(),
            backend_timeout: DEFAULT_BACKEND_TIMEOUT,
            spool_dir: None,
        }
    }
}

/// Cheaply cloneable handle shared by all request handlers.
#[derive(Clone)]
pub struct StorageGateway {
    client: Arc<dyn ObjectStoreClient>,
    bucket: Arc<str>,
    region: Arc<str>,
    policy: Arc<GatewayPolicy>,
}

impl std::fmt::Debug for StorageGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageGateway")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl StorageGateway {
    pub fn new(
        client: Arc<dyn ObjectStoreClient>,
        bucket: impl Into<String>,
        region: impl Into<String>,
        policy: GatewayPolicy,
    ) -> Self {
        Self {
            client,
            bucket: Arc::from(bucket.into()),
            region: Arc::from(region.into()),
            policy: Arc::new(policy),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn policy(&self) -> &GatewayPolicy {
        &self.policy
    }

    /// Run one backend call under the configured deadline.
    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, BackendError>>,
    ) -> GatewayResult<Result<T, BackendError>> {
        let after = self.policy.backend_timeout;
        tokio::time::timeout(after, call)
            .await
            .map_err(|_| GatewayError::Timeout { operation, after })
    }

    fn ensure_key_valid(key: &str) -> GatewayResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(GatewayError::InvalidKey);
        }
        if key.bytes().any(|b| b.is_ascii_control()) {
            return Err(GatewayError::InvalidKey);
        }
        Ok(())
    }

    /// Make sure the configured bucket exists, creating it in the configured
    /// region when absent. Safe to call repeatedly.
    pub async fn ensure_bucket(&self) -> GatewayResult<()> {
        let exists = self
            .bounded("bucket_exists", self.client.bucket_exists(&self.bucket))
            .await?
            .map_err(|err| GatewayError::BackendUnavailable(err.to_string()))?;

        if exists {
            info!("Bucket '{}' already exists", self.bucket);
            return Ok(());
        }

        self.bounded("make_bucket", self.client.make_bucket(&self.bucket, &self.region))
            .await?
            .map_err(|err| GatewayError::BucketProvisioningFailed {
                bucket: self.bucket.to_string(),
                reason: err.to_string(),
            })?;
        info!("Bucket '{}' created in region {}", self.bucket, self.region);
        Ok(())
    }

    /// Store `body` under `key`, overwriting any existing object. `size` must
    /// be the exact payload length; the backend trusts it.
    pub async fn put_object(
        &self,
        key: &str,
        size: u64,
        body: ObjectBody,
        content_type: &str,
    ) -> GatewayResult<ObjectDescriptor> {
        Self::ensure_key_valid(key)?;
        let object = self
            .bounded(
                "put_object",
                self.client.put_object(&self.bucket, key, body, size, content_type),
            )
            .await?
            .map_err(|err| GatewayError::UploadFailed(err.to_string()))?;

        info!(key, size = object.size, "Object uploaded");
        Ok(object)
    }

    /// Open an object for streaming.
    pub async fn get_object_stream(&self, key: &str) -> GatewayResult<ObjectStream> {
        Self::ensure_key_valid(key)?;
        self.bounded("get_object", self.client.get_object(&self.bucket, key))
            .await?
            .map_err(|err| match err {
                BackendError::NotFound(_) => GatewayError::ObjectNotFound(key.to_string()),
                other => GatewayError::DownloadFailed(other.to_string()),
            })
    }

    /// Read an entire object into memory. Suited to small and medium objects
    /// only; prefer [`Self::get_object_stream`].
    pub async fn get_object_bytes(&self, key: &str) -> GatewayResult<Bytes> {
        let mut stream = self.get_object_stream(key).await?;
        let capacity = stream.content_length.unwrap_or_default() as usize;
        let mut buf = Vec::with_capacity(capacity);

        self.bounded("read_object", async {
            stream
                .reader
                .read_to_end(&mut buf)
                .await
                .map_err(|err| BackendError::Transport(err.to_string()))
        })
        .await?
        .map_err(|err| GatewayError::DownloadFailed(err.to_string()))?;

        debug!(key, size = buf.len(), "Object read into memory");
        Ok(Bytes::from(buf))
    }

    /// Every object whose key starts with `prefix`, in no particular order.
    pub async fn list_objects(&self, prefix: &str) -> GatewayResult<Vec<ObjectDescriptor>> {
        let objects = self
            .bounded("list_objects", self.client.list_objects(&self.bucket, prefix))
            .await?
            .map_err(|err| GatewayError::ListFailed(err.to_string()))?;

        debug!(prefix, count = objects.len(), "Listed objects");
        Ok(objects)
    }

    /// `Ok(false)` only when the backend confirms the key is absent.
    pub async fn object_exists(&self, key: &str) -> GatewayResult<bool> {
        Self::ensure_key_valid(key)?;
        match self
            .bounded("stat_object", self.client.stat_object(&self.bucket, key))
            .await?
        {
            Ok(_) => Ok(true),
            Err(BackendError::NotFound(_)) => Ok(false),
            Err(err) => Err(GatewayError::StatFailed(err.to_string())),
        }
    }

    /// Remove an object. Removing a missing key is not an error.
    pub async fn delete_object(&self, key: &str) -> GatewayResult<()> {
        Self::ensure_key_valid(key)?;
        self.bounded("remove_object", self.client.remove_object(&self.bucket, key))
            .await?
            .map_err(|err| GatewayError::DeleteFailed(err.to_string()))?;

        info!(key, "Object deleted");
        Ok(())
    }

    /// Ask the backend for a signed GET URL. Existence is not checked.
    pub async fn presigned_url(&self, key: &str, expiry: Duration) -> GatewayResult<String> {
        Self::ensure_key_valid(key)?;
        if expiry.is_zero() {
            return Err(GatewayError::InvalidExpiry);
        }

        let url = self
            .bounded("presign_get", self.client.presign_get(&self.bucket, key, expiry))
            .await?
            .map_err(|err| GatewayError::UrlSigningFailed(err.to_string()))?;

        debug!(key, ?expiry, "Generated presigned URL");
        Ok(url)
    }

    /// Object key for an upload under the configured [`KeyPolicy`].
    pub fn derive_object_key(
        &self,
        file_name: &str,
        uploaded_at: DateTime<Utc>,
        digest: &md5::Digest,
    ) -> String {
        self.policy.key_policy.derive(file_name, uploaded_at, digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;

    async fn gateway_with(backend: &InMemoryBackend) -> StorageGateway {
        let gateway = StorageGateway::new(
            Arc::new(backend.clone()),
            "mybucket",
            "eu-west-1",
            GatewayPolicy::default(),
        );
        gateway.ensure_bucket().await.unwrap();
        gateway
    }

    async fn put_bytes(gateway: &StorageGateway, key: &str, data: &'static [u8]) -> ObjectDescriptor {
        gateway
            .put_object(
                key,
                data.len() as u64,
                ObjectBody::Bytes(Bytes::from_static(data)),
                "text/plain",
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn ensure_bucket_creates_once_in_configured_region() {
        let backend = InMemoryBackend::new();
        let gateway = gateway_with(&backend).await;
        assert_eq!(backend.bucket_region("mybucket").await.as_deref(), Some("eu-west-1"));

        // Second call sees the bucket and does not try to recreate it.
        gateway.ensure_bucket().await.unwrap();
    }

    #[tokio::test]
    async fn ensure_bucket_reports_unreachable_backend() {
        let backend = InMemoryBackend::new();
        backend.set_offline(true);
        let gateway = StorageGateway::new(Arc::new(backend), "mybucket", "us-east-1", GatewayPolicy::default());

        let err = gateway.ensure_bucket().await.unwrap_err();
        assert!(matches!(err, GatewayError::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn ensure_bucket_reports_creation_failure() {
        let backend = InMemoryBackend::new();
        backend.set_refuse_bucket_creation(true);
        let gateway = StorageGateway::new(Arc::new(backend), "mybucket", "us-east-1", GatewayPolicy::default());

        let err = gateway.ensure_bucket().await.unwrap_err();
        assert!(matches!(err, GatewayError::BucketProvisioningFailed { ref bucket, .. } if bucket == "mybucket"));
    }

    #[tokio::test]
    async fn uploaded_bytes_round_trip() {
        let backend = InMemoryBackend::new();
        let gateway = gateway_with(&backend).await;

        let object = put_bytes(&gateway, "uploads/1-a.txt", b"0123456789").await;
        assert_eq!(object.size, 10);
        assert!(gateway.object_exists("uploads/1-a.txt").await.unwrap());
        assert_eq!(
            &gateway.get_object_bytes("uploads/1-a.txt").await.unwrap()[..],
            b"0123456789"
        );
    }

    #[tokio::test]
    async fn missing_keys_are_not_errors_for_exists() {
        let backend = InMemoryBackend::new();
        let gateway = gateway_with(&backend).await;

        assert!(!gateway.object_exists("never-written").await.unwrap());
        assert!(matches!(
            gateway.get_object_bytes("never-written").await.unwrap_err(),
            GatewayError::ObjectNotFound(_)
        ));

        backend.set_offline(true);
        assert!(matches!(
            gateway.object_exists("never-written").await.unwrap_err(),
            GatewayError::StatFailed(_)
        ));
    }

    #[tokio::test]
    async fn listing_matches_prefix_exactly() {
        let backend = InMemoryBackend::new();
        let gateway = gateway_with(&backend).await;
        put_bytes(&gateway, "uploads/1-a.txt", b"a").await;
        put_bytes(&gateway, "uploads/2-b.txt", b"b").await;
        put_bytes(&gateway, "archive/c.txt", b"c").await;

        let mut keys: Vec<String> = gateway
            .list_objects("uploads/")
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["uploads/1-a.txt", "uploads/2-b.txt"]);

        assert_eq!(gateway.list_objects("").await.unwrap().len(), 3);
        assert!(gateway.list_objects("nothing/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_from_listing_and_is_idempotent() {
        let backend = InMemoryBackend::new();
        let gateway = gateway_with(&backend).await;
        put_bytes(&gateway, "uploads/1-a.txt", b"a").await;

        gateway.delete_object("uploads/1-a.txt").await.unwrap();
        assert!(gateway.list_objects("uploads/").await.unwrap().is_empty());
        assert!(!gateway.object_exists("uploads/1-a.txt").await.unwrap());

        gateway.delete_object("uploads/1-a.txt").await.unwrap();
        gateway.delete_object("uploads/never-there").await.unwrap();
    }

    #[tokio::test]
    async fn presign_rejects_zero_expiry_and_surfaces_backend_errors() {
        let backend = InMemoryBackend::new();
        let gateway = gateway_with(&backend).await;

        assert!(matches!(
            gateway.presigned_url("k", Duration::ZERO).await.unwrap_err(),
            GatewayError::InvalidExpiry
        ));

        // Signing does not require the object to exist.
        let url = gateway.presigned_url("k", Duration::from_secs(60)).await.unwrap();
        assert!(url.contains("/mybucket/k?"));

        backend.set_refuse_signing(true);
        assert!(matches!(
            gateway.presigned_url("k", Duration::from_secs(60)).await.unwrap_err(),
            GatewayError::UrlSigningFailed(_)
        ));
    }

    #[tokio::test]
    async fn invalid_keys_are_rejected_before_backend_calls() {
        let backend = InMemoryBackend::new();
        let gateway = gateway_with(&backend).await;
        backend.set_offline(true);

        assert!(matches!(gateway.object_exists("").await.unwrap_err(), GatewayError::InvalidKey));
        assert!(matches!(gateway.delete_object("bad\nkey").await.unwrap_err(), GatewayError::InvalidKey));
        let long = "k".repeat(MAX_OBJECT_KEY_LEN + 1);
        assert!(matches!(gateway.object_exists(&long).await.unwrap_err(), GatewayError::InvalidKey));
    }

    #[tokio::test]
    async fn slow_backend_calls_hit_the_deadline() {
        let backend = InMemoryBackend::new();
        backend.make_bucket("mybucket", "us-east-1").await.unwrap();
        backend.set_latency(Some(Duration::from_millis(500)));
        let gateway = StorageGateway::new(
            Arc::new(backend),
            "mybucket",
            "us-east-1",
            GatewayPolicy {
                backend_timeout: Duration::from_millis(20),
                ..GatewayPolicy::default()
            },
        );

        let err = gateway.list_objects("").await.unwrap_err();
        assert!(matches!(err, GatewayError::Timeout { operation: "list_objects", .. }));
    }

    #[tokio::test]
    async fn concurrent_uploads_with_distinct_keys_all_land() {
        let backend = InMemoryBackend::new();
        let gateway = gateway_with(&backend).await;

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..16 {
            let gateway = gateway.clone();
            tasks.spawn(async move {
                let key = format!("uploads/{i}-file.bin");
                let body = Bytes::from(vec![i as u8; 32]);
                gateway
                    .put_object(&key, 32, ObjectBody::Bytes(body), "application/octet-stream")
                    .await
                    .map(|_| key)
            });
        }

        let mut keys = Vec::new();
        while let Some(result) = tasks.join_next().await {
            keys.push(result.unwrap().unwrap());
        }
        for key in keys {
            let bytes = gateway.get_object_bytes(&key).await.unwrap();
            assert_eq!(bytes.len(), 32);
        }
        assert_eq!(gateway.list_objects("uploads/").await.unwrap().len(), 16);
    }
}
