//! Process-local [`ObjectStoreClient`] used by tests and by `--backend memory`.
//!
//! Mirrors the observable S3 semantics the gateway relies on: missing buckets
//! and keys are `NotFound`, deletes are idempotent, listings are recursive and
//! unordered from the caller's point of view. Faults can be injected to drive
//! the gateway's error paths.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::{
    collections::{BTreeMap, HashMap},
    io::Cursor,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::{fs, sync::RwLock};

use super::{BackendError, BackendResult, ObjectBody, ObjectStoreClient, ObjectStream};
use crate::models::object::ObjectDescriptor;

const DEFAULT_BASE_URL: &str = "http://memory.local";

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
    last_modified: DateTime<Utc>,
    etag: String,
}

impl StoredObject {
    fn descriptor(&self, key: &str) -> ObjectDescriptor {
        ObjectDescriptor {
            key: key.to_string(),
            size: self.data.len() as i64,
            content_type: Some(self.content_type.clone()),
            last_modified: Some(self.last_modified),
            etag: Some(self.etag.clone()),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryBucket {
    region: String,
    objects: BTreeMap<String, StoredObject>,
}

#[derive(Debug, Default)]
struct Faults {
    offline: AtomicBool,
    refuse_bucket_creation: AtomicBool,
    refuse_signing: AtomicBool,
    latency: std::sync::Mutex<Option<Duration>>,
}

/// In-memory object store. Cloning shares the same underlying state.
#[derive(Debug, Clone)]
pub struct InMemoryBackend {
    buckets: Arc<RwLock<HashMap<String, MemoryBucket>>>,
    faults: Arc<Faults>,
    base_url: Arc<str>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Base URL prefixed to generated share links.
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            buckets: Arc::default(),
            faults: Arc::default(),
            base_url: Arc::from(base_url.trim_end_matches('/')),
        }
    }

    /// When offline every call fails with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.faults.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_refuse_bucket_creation(&self, refuse: bool) {
        self.faults.refuse_bucket_creation.store(refuse, Ordering::SeqCst);
    }

    pub fn set_refuse_signing(&self, refuse: bool) {
        self.faults.refuse_signing.store(refuse, Ordering::SeqCst);
    }

    /// Delay applied before every call.
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut guard) = self.faults.latency.lock() {
            *guard = latency;
        }
    }

    /// Region a bucket was created in, if it exists.
    pub async fn bucket_region(&self, bucket: &str) -> Option<String> {
        self.buckets.read().await.get(bucket).map(|b| b.region.clone())
    }

    async fn enter(&self) -> BackendResult<()> {
        let latency = self.faults.latency.lock().ok().and_then(|guard| *guard);
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
        if self.faults.offline.load(Ordering::SeqCst) {
            return Err(BackendError::Transport("connection refused".into()));
        }
        Ok(())
    }
}

fn no_such_bucket(bucket: &str) -> BackendError {
    BackendError::NotFound(format!("bucket `{}` does not exist", bucket))
}

#[async_trait]
impl ObjectStoreClient for InMemoryBackend {
    async fn bucket_exists(&self, bucket: &str) -> BackendResult<bool> {
        self.enter().await?;
        Ok(self.buckets.read().await.contains_key(bucket))
    }

    async fn make_bucket(&self, bucket: &str, region: &str) -> BackendResult<()> {
        self.enter().await?;
        if self.faults.refuse_bucket_creation.load(Ordering::SeqCst) {
            return Err(BackendError::Service {
                code: "AccessDenied".into(),
                message: "bucket creation is not permitted".into(),
            });
        }

        let mut buckets = self.buckets.write().await;
        if buckets.contains_key(bucket) {
            return Err(BackendError::Service {
                code: "BucketAlreadyOwnedByYou".into(),
                message: format!("bucket `{}` already exists", bucket),
            });
        }
        buckets.insert(
            bucket.to_string(),
            MemoryBucket {
                region: region.to_string(),
                objects: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: ObjectBody,
        size: u64,
        content_type: &str,
    ) -> BackendResult<ObjectDescriptor> {
        self.enter().await?;
        let data = match body {
            ObjectBody::Bytes(bytes) => bytes,
            ObjectBody::File(path) => Bytes::from(fs::read(&path).await.map_err(|err| {
                BackendError::InvalidInput(format!("cannot read {}: {}", path.display(), err))
            })?),
        };
        if data.len() as u64 != size {
            return Err(BackendError::Service {
                code: "IncompleteBody".into(),
                message: format!(
                    "declared size {} does not match {} bytes received",
                    size,
                    data.len()
                ),
            });
        }

        let mut buckets = self.buckets.write().await;
        let target = buckets.get_mut(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        let stored = StoredObject {
            etag: format!("{:x}", md5::compute(&data)),
            data,
            content_type: content_type.to_string(),
            last_modified: Utc::now(),
        };
        let descriptor = stored.descriptor(key);
        target.objects.insert(key.to_string(), stored);
        Ok(descriptor)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> BackendResult<ObjectStream> {
        self.enter().await?;
        let buckets = self.buckets.read().await;
        let stored = buckets
            .get(bucket)
            .ok_or_else(|| no_such_bucket(bucket))?
            .objects
            .get(key)
            .ok_or_else(|| BackendError::NotFound(format!("key `{}` does not exist", key)))?;

        Ok(ObjectStream {
            object: stored.descriptor(key),
            content_length: Some(stored.data.len() as u64),
            reader: Box::pin(Cursor::new(stored.data.clone())),
        })
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> BackendResult<Vec<ObjectDescriptor>> {
        self.enter().await?;
        let buckets = self.buckets.read().await;
        let target = buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        Ok(target
            .objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, stored)| stored.descriptor(key))
            .collect())
    }

    async fn stat_object(&self, bucket: &str, key: &str) -> BackendResult<ObjectDescriptor> {
        self.enter().await?;
        let buckets = self.buckets.read().await;
        buckets
            .get(bucket)
            .ok_or_else(|| no_such_bucket(bucket))?
            .objects
            .get(key)
            .map(|stored| stored.descriptor(key))
            .ok_or_else(|| BackendError::NotFound(format!("key `{}` does not exist", key)))
    }

    async fn remove_object(&self, bucket: &str, key: &str) -> BackendResult<()> {
        self.enter().await?;
        let mut buckets = self.buckets.write().await;
        let target = buckets.get_mut(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        target.objects.remove(key);
        Ok(())
    }

    async fn presign_get(&self, bucket: &str, key: &str, expiry: Duration) -> BackendResult<String> {
        self.enter().await?;
        if self.faults.refuse_signing.load(Ordering::SeqCst) {
            return Err(BackendError::Service {
                code: "SignatureDoesNotMatch".into(),
                message: "signing key rejected".into(),
            });
        }
        if expiry.is_zero() {
            return Err(BackendError::InvalidInput("expiry must be positive".into()));
        }

        let signature = md5::compute(format!("{}/{}/{}", bucket, key, expiry.as_secs()));
        Ok(format!(
            "{}/{}/{}?X-Expires={}&X-Signature={:x}",
            self.base_url,
            bucket,
            key,
            expiry.as_secs(),
            signature
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn backend_with_bucket() -> InMemoryBackend {
        let backend = InMemoryBackend::new();
        backend.make_bucket("b", "us-east-1").await.unwrap();
        backend
    }

    async fn put(backend: &InMemoryBackend, key: &str, data: &'static [u8]) {
        backend
            .put_object("b", key, ObjectBody::Bytes(Bytes::from_static(data)), data.len() as u64, "text/plain")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn stat_distinguishes_missing_key_from_outage() {
        let backend = backend_with_bucket().await;
        assert!(backend.stat_object("b", "nope").await.unwrap_err().is_not_found());

        backend.set_offline(true);
        let err = backend.stat_object("b", "nope").await.unwrap_err();
        assert!(!err.is_not_found());
        assert!(matches!(err, BackendError::Transport(_)));
    }

    #[tokio::test]
    async fn list_is_prefix_scoped_and_recursive() {
        let backend = backend_with_bucket().await;
        put(&backend, "uploads/a.txt", b"a").await;
        put(&backend, "uploads/deep/b.txt", b"b").await;
        put(&backend, "other/c.txt", b"c").await;

        let keys: Vec<String> = backend
            .list_objects("b", "uploads/")
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(keys, vec!["uploads/a.txt", "uploads/deep/b.txt"]);
        assert_eq!(backend.list_objects("b", "").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn declared_size_mismatch_is_rejected() {
        let backend = backend_with_bucket().await;
        let err = backend
            .put_object("b", "k", ObjectBody::Bytes(Bytes::from_static(b"abc")), 4, "text/plain")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Service { ref code, .. } if code == "IncompleteBody"));
    }

    #[tokio::test]
    async fn get_streams_stored_bytes() {
        let backend = backend_with_bucket().await;
        put(&backend, "k", b"payload").await;

        let mut stream = backend.get_object("b", "k").await.unwrap();
        assert_eq!(stream.content_length, Some(7));
        let mut buf = Vec::new();
        stream.reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"payload");
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let backend = backend_with_bucket().await;
        put(&backend, "k", b"x").await;
        backend.remove_object("b", "k").await.unwrap();
        backend.remove_object("b", "k").await.unwrap();
        assert!(backend.stat_object("b", "k").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn presign_embeds_key_and_expiry() {
        let backend = InMemoryBackend::with_base_url("http://files.test/");
        let url = backend.presign_get("b", "uploads/a.txt", Duration::from_secs(3600)).await.unwrap();
        assert!(url.starts_with("http://files.test/b/uploads/a.txt?X-Expires=3600&X-Signature="));
    }
}
