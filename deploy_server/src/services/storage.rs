//! Object storage backends for published artifacts.
//!
//! Supports S3 (and S3-compatible endpoints) in production and any
//! `object_store` implementation, such as `InMemory`, in tests.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{
    Attribute, Attributes, MultipartUpload, ObjectStore, PutMultipartOpts, PutOptions, PutPayload,
};

use crate::config::DeployConfig;

/// Write side of a bucket.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `body` under `key` with the given content type.
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), object_store::Error>;

    /// Start a multipart upload to `key` with the given content type.
    ///
    /// Backends that cannot stream leave the default, which refuses.
    async fn put_multipart(
        &self,
        _key: &str,
        _content_type: &str,
    ) -> Result<Box<dyn MultipartUpload>, object_store::Error> {
        Err(object_store::Error::NotImplemented)
    }
}

fn content_type_attributes(content_type: &str) -> Attributes {
    let mut attributes = Attributes::new();
    attributes.insert(Attribute::ContentType, content_type.to_string().into());
    attributes
}

/// [`ObjectStorage`] over an `object_store` backend.
#[derive(Debug, Clone)]
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreBackend {
    /// S3 client for the configured bucket.
    pub fn s3(config: &DeployConfig) -> Result<Self, object_store::Error> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&config.bucket)
            .with_access_key_id(&config.aws_access_key_id)
            .with_secret_access_key(&config.aws_secret_access_key);
        if !config.aws_region.is_empty() {
            builder = builder.with_region(&config.aws_region);
        }
        if let Some(endpoint) = &config.s3_endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }
        let store = builder.build()?;

        tracing::info!(
            bucket = %config.bucket,
            region = %config.aws_region,
            endpoint = config.s3_endpoint.as_deref().unwrap_or("aws"),
            "S3 client created"
        );

        Ok(Self {
            store: Arc::new(store),
        })
    }

    /// Wrap a pre-configured object store.
    pub fn with_store(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ObjectStorage for ObjectStoreBackend {
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), object_store::Error> {
        let opts = PutOptions {
            attributes: content_type_attributes(content_type),
            ..Default::default()
        };

        self.store
            .put_opts(&ObjectPath::from(key), PutPayload::from(body), opts)
            .await?;
        Ok(())
    }

    async fn put_multipart(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<Box<dyn MultipartUpload>, object_store::Error> {
        let opts = PutMultipartOpts {
            attributes: content_type_attributes(content_type),
            ..Default::default()
        };
        self.store
            .put_multipart_opts(&ObjectPath::from(key), opts)
            .await
    }
}

/// Storage that rejects every write.
///
/// Stands in when the S3 client cannot be built from the environment, so a
/// missing bucket or credential surfaces per deployment instead of at
/// startup.
#[derive(Debug, Clone)]
pub struct UnconfiguredStorage {
    reason: String,
}

impl UnconfiguredStorage {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn refusal(&self) -> object_store::Error {
        object_store::Error::Generic {
            store: "unconfigured",
            source: self.reason.clone().into(),
        }
    }
}

#[async_trait]
impl ObjectStorage for UnconfiguredStorage {
    async fn put_object(
        &self,
        _key: &str,
        _body: Bytes,
        _content_type: &str,
    ) -> Result<(), object_store::Error> {
        Err(self.refusal())
    }

    async fn put_multipart(
        &self,
        _key: &str,
        _content_type: &str,
    ) -> Result<Box<dyn MultipartUpload>, object_store::Error> {
        Err(self.refusal())
    }
}
