//! S3 Object Store Implementation
//!
//! Provides an S3-compatible object store for production use.
//! Uses the `object_store` crate from the Arrow ecosystem.
//!
//! Supports:
//! - AWS S3
//! - S3-compatible services (MinIO, LocalStack, etc.)
//! - Custom endpoints
//!
//! Small objects are sent with a single PUT. Objects larger than
//! `S3Config::multipart_threshold` are streamed from the body through a
//! multipart upload, so a large scratch file is never held in memory.

use crate::staging::config::S3Config;
use crate::staging::object_store::{check_length, read_body, ObjectBody, ObjectMeta, ObjectStore, StoreFuture};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{
    Attribute, AttributeValue, Attributes, ObjectStore as ObjectStoreTrait, PutMultipartOpts,
    PutOptions, PutPayload, WriteMultipart,
};
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Read size when streaming a body into a multipart upload
const CHUNK_SIZE: usize = 1024 * 1024;
/// Parts allowed in flight per multipart upload
const MAX_CONCURRENT_PARTS: usize = 4;

/// S3 Object Store for production deployments
#[derive(Clone)]
pub struct S3ObjectStore {
    store: Arc<dyn ObjectStoreTrait>,
    prefix: String,
    multipart_threshold: u64,
}

impl S3ObjectStore {
    /// Create a new S3 object store
    ///
    /// Credentials come from the standard environment variables
    /// (AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY, AWS_SESSION_TOKEN);
    /// region and endpoint from the config take precedence.
    pub fn new(config: &S3Config) -> IoResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&config.bucket)
            .with_region(&config.region);

        // Use custom endpoint for S3-compatible services (MinIO)
        if let Some(endpoint) = &config.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        let store = builder.build().map_err(|e| {
            IoError::new(
                ErrorKind::InvalidInput,
                format!("Failed to create S3 store: {}", e),
            )
        })?;

        Ok(S3ObjectStore {
            store: Arc::new(store),
            prefix: config.prefix.clone(),
            multipart_threshold: config.multipart_threshold,
        })
    }

    /// Create from an existing object store (for testing)
    pub fn from_store(store: Arc<dyn ObjectStoreTrait>, prefix: String, multipart_threshold: u64) -> Self {
        S3ObjectStore {
            store,
            prefix,
            multipart_threshold,
        }
    }

    /// Get the full path with prefix
    fn full_path(&self, key: &str) -> ObjectPath {
        if self.prefix.is_empty() {
            ObjectPath::from(key)
        } else {
            ObjectPath::from(format!("{}/{}", self.prefix, key))
        }
    }

    fn content_attributes(content_type: &str) -> Attributes {
        Attributes::from_iter([(
            Attribute::ContentType,
            AttributeValue::from(content_type.to_string()),
        )])
    }

    /// Convert object_store errors to IoError
    fn map_error(err: object_store::Error) -> IoError {
        match &err {
            object_store::Error::NotFound { .. } => IoError::new(ErrorKind::NotFound, err.to_string()),
            object_store::Error::AlreadyExists { .. } => {
                IoError::new(ErrorKind::AlreadyExists, err.to_string())
            }
            object_store::Error::Precondition { .. } => {
                IoError::new(ErrorKind::InvalidInput, err.to_string())
            }
            _ => IoError::new(ErrorKind::Other, err.to_string()),
        }
    }

    async fn put_single(
        &self,
        path: &ObjectPath,
        body: ObjectBody,
        size: u64,
        content_type: &str,
    ) -> IoResult<()> {
        let data = read_body(body, size).await?;
        let opts = PutOptions {
            attributes: Self::content_attributes(content_type),
            ..Default::default()
        };
        self.store
            .put_opts(path, PutPayload::from(data), opts)
            .await
            .map_err(Self::map_error)?;
        Ok(())
    }

    async fn put_streaming(
        &self,
        path: &ObjectPath,
        mut body: ObjectBody,
        size: u64,
        content_type: &str,
    ) -> IoResult<()> {
        let opts = PutMultipartOpts {
            attributes: Self::content_attributes(content_type),
            ..Default::default()
        };
        let upload = self
            .store
            .put_multipart_opts(path, opts)
            .await
            .map_err(Self::map_error)?;
        let mut writer = WriteMultipart::new(upload);

        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut sent: u64 = 0;
        let streamed: IoResult<()> = async {
            loop {
                let n = body.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                writer
                    .wait_for_capacity(MAX_CONCURRENT_PARTS)
                    .await
                    .map_err(Self::map_error)?;
                writer.write(&buf[..n]);
                sent += n as u64;
            }
            check_length(size, sent)
        }
        .await;

        if let Err(e) = streamed {
            // Report the streaming failure, not the abort result
            let _ = writer.abort().await;
            return Err(e);
        }

        writer.finish().await.map_err(Self::map_error)?;
        debug!(path = %path, bytes = sent, "Completed multipart upload");
        Ok(())
    }
}

impl std::fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ObjectStore")
            .field("prefix", &self.prefix)
            .field("multipart_threshold", &self.multipart_threshold)
            .finish()
    }
}

impl ObjectStore for S3ObjectStore {
    fn put<'a>(
        &'a self,
        key: &'a str,
        body: ObjectBody,
        size: u64,
        content_type: &'a str,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let path = self.full_path(key);
            if size > self.multipart_threshold {
                self.put_streaming(&path, body, size, content_type).await
            } else {
                self.put_single(&path, body, size, content_type).await
            }
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<u8>> {
        Box::pin(async move {
            let path = self.full_path(key);
            let result = self.store.get(&path).await.map_err(Self::map_error)?;
            let data = result.bytes().await.map_err(Self::map_error)?;
            Ok(data.to_vec())
        })
    }

    fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let path = self.full_path(key);
            match self.store.head(&path).await {
                Ok(_) => Ok(true),
                Err(object_store::Error::NotFound { .. }) => Ok(false),
                Err(e) => Err(Self::map_error(e)),
            }
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let path = self.full_path(key);
            // S3 delete is idempotent - ignore not found errors
            match self.store.delete(&path).await {
                Ok(()) => Ok(()),
                Err(object_store::Error::NotFound { .. }) => Ok(()),
                Err(e) => Err(Self::map_error(e)),
            }
        })
    }

    fn head<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ObjectMeta> {
        Box::pin(async move {
            let path = self.full_path(key);
            let meta = self.store.head(&path).await.map_err(Self::map_error)?;

            Ok(ObjectMeta {
                key: key.to_string(),
                size_bytes: meta.size as u64,
                content_type: None,
                created_at_ms: meta.last_modified.timestamp_millis().try_into().unwrap_or(0),
            })
        })
    }
}
