use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::primitives::ByteStream;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// StoredMedia
///
/// What the media host hands back for an upload: the object key (needed to delete it later) and
/// the public reference URL persisted next to the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMedia {
    pub key: String,
    pub url: String,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("media host rejected the upload: {0}")]
    Upload(String),

    #[error("media host failed to delete {key}: {reason}")]
    Delete { key: String, reason: String },
}

// 1. StorageService Contract
/// StorageService
///
/// Abstract contract for the third-party media host. Handlers proxy uploaded images through it and
/// persist the returned URL; the real S3 client and the in-memory mock are interchangeable.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Ensures the configured bucket exists. Used for the local MinIO setup.
    async fn ensure_bucket_exists(&self);

    /// Stores `bytes` under `key` and returns its reference URL.
    async fn upload(
        &self,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredMedia, StorageError>;

    /// Removes the object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

// 2. The Real Implementation (S3 / MinIO / R2)
/// S3StorageClient
///
/// Media host client built on the AWS SDK. Path-style addressing keeps it compatible with MinIO and
/// other S3-compatible gateways.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
    public_base_url: String,
}

impl S3StorageClient {
    pub fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
        public_base_url: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket_name: bucket.to_string(),
            public_base_url: public_base_url.to_string(),
        }
    }

    /// Public reference URL of an object: `<base>/<bucket>/<key>`.
    pub fn public_url(&self, key: &str) -> String {
        public_url(&self.public_base_url, &self.bucket_name, key)
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    async fn ensure_bucket_exists(&self) {
        // CreateBucket fails harmlessly when the bucket already exists.
        if let Err(e) = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            tracing::debug!(bucket = %self.bucket_name, error = %e, "create_bucket skipped");
        }
    }

    async fn upload(
        &self,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredMedia, StorageError> {
        let key = sanitize_key(key);
        let size = bytes.len();

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StorageError::Upload(e.to_string()))?;

        tracing::info!(%key, size, "media uploaded");
        Ok(StoredMedia {
            url: self.public_url(&key),
            key,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Delete {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        tracing::info!(%key, "media deleted");
        Ok(())
    }
}

pub fn public_url(base: &str, bucket: &str, key: &str) -> String {
    format!("{}/{}/{}", base.trim_end_matches('/'), bucket, key)
}

/// sanitize_key
///
/// Strips directory navigation components (`..`, `.`) and empty segments from an object key.
pub fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

// 3. The Mock Implementation (For Tests and Local Runs)
/// MockStorageService
///
/// In-memory media host. Records every upload and delete so tests can assert on side effects.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, all operations return a simulated failure.
    pub should_fail: bool,
    objects: Arc<Mutex<Vec<StoredMedia>>>,
    deleted: Arc<Mutex<Vec<String>>>,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Objects currently held, in upload order.
    pub async fn objects(&self) -> Vec<StoredMedia> {
        self.objects.lock().await.clone()
    }

    /// Keys passed to `delete`, in call order.
    pub async fn deleted_keys(&self) -> Vec<String> {
        self.deleted.lock().await.clone()
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    async fn upload(
        &self,
        key: &str,
        _content_type: &str,
        _bytes: Vec<u8>,
    ) -> Result<StoredMedia, StorageError> {
        if self.should_fail {
            return Err(StorageError::Upload(
                "Mock Storage Error: Simulation requested".to_string(),
            ));
        }

        let key = sanitize_key(key);
        let media = StoredMedia {
            url: public_url("http://localhost:9000", "mock-bucket", &key),
            key,
        };
        self.objects.lock().await.push(media.clone());
        Ok(media)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        if self.should_fail {
            return Err(StorageError::Delete {
                key: key.to_string(),
                reason: "Mock Storage Error: Simulation requested".to_string(),
            });
        }
        self.objects.lock().await.retain(|media| media.key != key);
        self.deleted.lock().await.push(key.to_string());
        Ok(())
    }
}

/// StorageState
///
/// The concrete type used to share the media host across the application state.
pub type StorageState = Arc<dyn StorageService>;
