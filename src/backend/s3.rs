//! `aws-sdk-s3` implementation of [`ObjectStoreClient`].
//!
//! Talks to any S3-compatible endpoint (MinIO, Ceph RGW, AWS S3) using
//! path-style addressing and static credentials.

use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region},
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    presigning::PresigningConfig,
    primitives::{ByteStream, DateTime as S3DateTime, Length},
    types::{BucketLocationConstraint, CreateBucketConfiguration},
};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info};

use super::{BackendError, BackendResult, ObjectBody, ObjectStoreClient, ObjectStream};
use crate::models::object::ObjectDescriptor;

/// Region in which S3 rejects an explicit location constraint.
const DEFAULT_S3_REGION: &str = "us-east-1";

/// Connection settings for an S3-compatible endpoint.
#[derive(Clone)]
pub struct S3Settings {
    /// Full endpoint URL including scheme, e.g. `http://localhost:9000`.
    pub endpoint_url: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

impl std::fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Settings")
            .field("endpoint_url", &self.endpoint_url)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct S3Backend {
    client: Client,
}

impl S3Backend {
    pub fn new(settings: &S3Settings) -> Self {
        info!(
            endpoint = %settings.endpoint_url,
            region = %settings.region,
            "Initializing S3 client"
        );

        let credentials = Credentials::new(
            settings.access_key.clone(),
            settings.secret_key.clone(),
            None,
            None,
            "storage-gateway",
        );

        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(settings.region.clone()))
            .endpoint_url(&settings.endpoint_url)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(config),
        }
    }
}

#[async_trait]
impl ObjectStoreClient for S3Backend {
    async fn bucket_exists(&self, bucket: &str) -> BackendResult<bool> {
        debug!(bucket, "head_bucket");
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => match classify(err, |e| e.is_not_found()) {
                BackendError::NotFound(_) => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn make_bucket(&self, bucket: &str, region: &str) -> BackendResult<()> {
        debug!(bucket, region, "create_bucket");
        let mut request = self.client.create_bucket().bucket(bucket);
        if !region.is_empty() && region != DEFAULT_S3_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }

        request
            .send()
            .await
            .map(|_| ())
            .map_err(|err| classify(err, |_| false))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: ObjectBody,
        size: u64,
        content_type: &str,
    ) -> BackendResult<ObjectDescriptor> {
        debug!(bucket, key, size, content_type, "put_object");
        let stream = match body {
            ObjectBody::Bytes(bytes) => ByteStream::from(bytes),
            ObjectBody::File(path) => ByteStream::read_from()
                .path(&path)
                .length(Length::Exact(size))
                .build()
                .await
                .map_err(|err| {
                    BackendError::InvalidInput(format!(
                        "cannot read upload source {}: {}",
                        path.display(),
                        err
                    ))
                })?,
        };
        let content_length = i64::try_from(size)
            .map_err(|_| BackendError::InvalidInput(format!("object size {size} too large")))?;

        let output = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(stream)
            .content_length(content_length)
            .content_type(content_type)
            .send()
            .await
            .map_err(|err| classify(err, |_| false))?;

        Ok(ObjectDescriptor {
            key: key.to_string(),
            size: content_length,
            content_type: Some(content_type.to_string()),
            last_modified: None,
            etag: output.e_tag().map(trim_etag),
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> BackendResult<ObjectStream> {
        debug!(bucket, key, "get_object");
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| classify(err, |e| e.is_no_such_key()))?;

        let content_length = output.content_length().and_then(|len| u64::try_from(len).ok());
        let object = ObjectDescriptor {
            key: key.to_string(),
            size: output.content_length().unwrap_or_default(),
            content_type: output.content_type().map(str::to_string),
            last_modified: output.last_modified().and_then(to_chrono),
            etag: output.e_tag().map(trim_etag),
        };

        Ok(ObjectStream {
            object,
            content_length,
            reader: Box::pin(output.body.into_async_read()),
        })
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> BackendResult<Vec<ObjectDescriptor>> {
        debug!(bucket, prefix, "list_objects_v2");
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|err| classify(err, |e| e.is_no_such_bucket()))?;

            for entry in response.contents() {
                let Some(key) = entry.key() else { continue };
                objects.push(ObjectDescriptor {
                    key: key.to_string(),
                    size: entry.size().unwrap_or_default(),
                    content_type: None,
                    last_modified: entry.last_modified().and_then(to_chrono),
                    etag: entry.e_tag().map(trim_etag),
                });
            }

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(objects)
    }

    async fn stat_object(&self, bucket: &str, key: &str) -> BackendResult<ObjectDescriptor> {
        debug!(bucket, key, "head_object");
        let output = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| classify(err, |e| e.is_not_found() || e.code() == Some("NoSuchKey")))?;

        Ok(ObjectDescriptor {
            key: key.to_string(),
            size: output.content_length().unwrap_or_default(),
            content_type: output.content_type().map(str::to_string),
            last_modified: output.last_modified().and_then(to_chrono),
            etag: output.e_tag().map(trim_etag),
        })
    }

    async fn remove_object(&self, bucket: &str, key: &str) -> BackendResult<()> {
        debug!(bucket, key, "delete_object");
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map(|_| ())
            .map_err(|err| classify(err, |_| false))
    }

    async fn presign_get(&self, bucket: &str, key: &str, expiry: Duration) -> BackendResult<String> {
        let presigning = PresigningConfig::expires_in(expiry)
            .map_err(|err| BackendError::InvalidInput(err.to_string()))?;

        let request = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|err| classify(err, |_| false))?;

        Ok(request.uri().to_string())
    }
}

/// Split an SDK failure into "not found" (as decided by `is_not_found`),
/// service-reported errors and everything else (dispatch, timeout, decoding).
fn classify<E, R>(err: SdkError<E, R>, is_not_found: impl FnOnce(&E) -> bool) -> BackendError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    match err {
        SdkError::ServiceError(context) => {
            let service_err = context.err();
            if is_not_found(service_err) {
                BackendError::NotFound(DisplayErrorContext(service_err).to_string())
            } else {
                BackendError::Service {
                    code: service_err.code().unwrap_or("Unknown").to_string(),
                    message: service_err
                        .message()
                        .map(str::to_string)
                        .unwrap_or_else(|| DisplayErrorContext(service_err).to_string()),
                }
            }
        }
        other => BackendError::Transport(DisplayErrorContext(&other).to_string()),
    }
}

fn to_chrono(value: &S3DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(value.secs(), value.subsec_nanos())
}

fn trim_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etag_quotes_are_stripped() {
        assert_eq!(trim_etag("\"9a0364b9e99bb480dd25e1f0284c8555\""), "9a0364b9e99bb480dd25e1f0284c8555");
        assert_eq!(trim_etag("plain"), "plain");
    }

    #[test]
    fn smithy_timestamps_convert_to_chrono() {
        let converted = to_chrono(&S3DateTime::from_secs(1_700_000_000)).unwrap();
        assert_eq!(converted.timestamp(), 1_700_000_000);
    }

    #[test]
    fn settings_debug_redacts_secret() {
        let settings = S3Settings {
            endpoint_url: "http://localhost:9000".into(),
            region: "us-east-1".into(),
            access_key: "minio_admin".into(),
            secret_key: "minio_password".into(),
        };
        let rendered = format!("{:?}", settings);
        assert!(rendered.contains("minio_admin"));
        assert!(!rendered.contains("minio_password"));
    }

    /// Round trip against a live MinIO, configured through `MINIO_*`.
    #[tokio::test]
    #[ignore] // Requires a running S3-compatible endpoint
    async fn live_round_trip_and_presign() {
        let env = |key: &str, default: &str| std::env::var(key).unwrap_or_else(|_| default.into());
        let settings = S3Settings {
            endpoint_url: env("MINIO_ENDPOINT_URL", "http://localhost:9000"),
            region: env("MINIO_LOCATION", "us-east-1"),
            access_key: env("MINIO_ACCESS_KEY", "minio_admin"),
            secret_key: env("MINIO_SECRET_KEY", "minio_password"),
        };
        let bucket = env("MINIO_BUCKET", "gateway-it");
        let backend = S3Backend::new(&settings);

        if !backend.bucket_exists(&bucket).await.unwrap() {
            backend.make_bucket(&bucket, &settings.region).await.unwrap();
        }

        let key = format!("it/{}.txt", uuid::Uuid::new_v4());
        backend
            .put_object(&bucket, &key, ObjectBody::Bytes(bytes::Bytes::from_static(b"hello")), 5, "text/plain")
            .await
            .unwrap();

        let stat = backend.stat_object(&bucket, &key).await.unwrap();
        assert_eq!(stat.size, 5);

        let url = backend.presign_get(&bucket, &key, Duration::from_secs(60)).await.unwrap();
        assert!(url.contains("X-Amz-Signature"));

        backend.remove_object(&bucket, &key).await.unwrap();
        assert!(backend.stat_object(&bucket, &key).await.unwrap_err().is_not_found());
        // Deleting twice is not an error.
        backend.remove_object(&bucket, &key).await.unwrap();
    }
}
