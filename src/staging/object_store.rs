//! Object Store Abstraction
//!
//! Trait-based abstraction over the remote bucket that committed streams
//! land in. Uploads take a readable body plus its exact length, so a
//! finalized scratch file can be streamed without loading it into memory.
//!
//! Implementations:
//! - `InMemoryObjectStore`: For unit tests
//! - `LocalFsObjectStore`: For development and local testing
//! - `S3ObjectStore`: For production (feature-gated)
//! - `SimulatedObjectStore`: Fault injection wrapper for tests

use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

/// Content type used for every committed object unless configured otherwise
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Readable body handed to [`ObjectStore::put`]
pub type ObjectBody = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed future returned by store operations
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = IoResult<T>> + Send + 'a>>;

/// Metadata for a stored object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Object key (path)
    pub key: String,
    /// Size in bytes
    pub size_bytes: u64,
    /// Content type recorded at upload, when the backend keeps it
    pub content_type: Option<String>,
    /// Creation timestamp (Unix ms)
    pub created_at_ms: u64,
}

/// Object store abstraction trait
pub trait ObjectStore: Send + Sync + 'static {
    /// Upload `size` bytes read from `body` as the object `key` (create or overwrite).
    ///
    /// Fails with `InvalidData` if the body does not yield exactly `size` bytes,
    /// in which case no object is written.
    fn put<'a>(
        &'a self,
        key: &'a str,
        body: ObjectBody,
        size: u64,
        content_type: &'a str,
    ) -> StoreFuture<'a, ()>;

    /// Get an object's contents
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<u8>>;

    /// Check if an object exists
    fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool>;

    /// Delete an object
    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;

    /// Get object metadata without downloading content
    fn head<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ObjectMeta>;
}

/// Read a body completely, checking it against the declared length.
pub(crate) async fn read_body(mut body: ObjectBody, size: u64) -> IoResult<Vec<u8>> {
    let capacity = usize::try_from(size).unwrap_or(0);
    let mut data = Vec::with_capacity(capacity);
    body.read_to_end(&mut data).await?;
    check_length(size, data.len() as u64)?;
    Ok(data)
}

pub(crate) fn check_length(expected: u64, actual: u64) -> IoResult<()> {
    if expected != actual {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("body length mismatch: declared {}, read {}", expected, actual),
        ));
    }
    Ok(())
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ============================================================================
// InMemoryObjectStore - For tests
// ============================================================================

/// In-memory object store for unit tests
#[derive(Debug, Clone, Default)]
pub struct InMemoryObjectStore {
    data: Arc<RwLock<HashMap<String, StoredObject>>>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
    created_at_ms: u64,
}

impl InMemoryObjectStore {
    /// Create a new in-memory object store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of stored objects (for testing)
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if empty (for testing)
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// All stored keys, sorted (for testing)
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.data.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn put<'a>(
        &'a self,
        key: &'a str,
        body: ObjectBody,
        size: u64,
        content_type: &'a str,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let data = read_body(body, size).await?;
            let obj = StoredObject {
                data: Bytes::from(data),
                content_type: content_type.to_string(),
                created_at_ms: now_ms(),
            };
            self.data.write().insert(key.to_string(), obj);
            Ok(())
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<u8>> {
        Box::pin(async move {
            self.data
                .read()
                .get(key)
                .map(|obj| obj.data.to_vec())
                .ok_or_else(|| IoError::new(ErrorKind::NotFound, format!("Key not found: {}", key)))
        })
    }

    fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move { Ok(self.data.read().contains_key(key)) })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.data.write().remove(key);
            Ok(())
        })
    }

    fn head<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ObjectMeta> {
        Box::pin(async move {
            self.data
                .read()
                .get(key)
                .map(|obj| ObjectMeta {
                    key: key.to_string(),
                    size_bytes: obj.data.len() as u64,
                    content_type: Some(obj.content_type.clone()),
                    created_at_ms: obj.created_at_ms,
                })
                .ok_or_else(|| IoError::new(ErrorKind::NotFound, format!("Key not found: {}", key)))
        })
    }
}

// ============================================================================
// LocalFsObjectStore - For development
// ============================================================================

/// Local filesystem object store for development and testing.
///
/// Objects are written to a sibling `.part` file and renamed into place, so a
/// failed upload never leaves a truncated object behind. Content types are
/// not persisted.
#[derive(Debug, Clone)]
pub struct LocalFsObjectStore {
    base_path: PathBuf,
}

impl LocalFsObjectStore {
    /// Create a new local filesystem object store
    pub fn new(base_path: PathBuf) -> Self {
        LocalFsObjectStore { base_path }
    }

    /// Get the full path for a key
    fn full_path(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }

    /// Ensure parent directories exist
    async fn ensure_parent(path: &Path) -> IoResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Get the base path
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

impl ObjectStore for LocalFsObjectStore {
    fn put<'a>(
        &'a self,
        key: &'a str,
        mut body: ObjectBody,
        size: u64,
        _content_type: &'a str,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let path = self.full_path(key);
            Self::ensure_parent(&path).await?;

            let mut part = path.clone().into_os_string();
            part.push(".part");
            let part = PathBuf::from(part);

            let result = async {
                let mut file = tokio::fs::File::create(&part).await?;
                let copied = tokio::io::copy(&mut body, &mut file).await?;
                check_length(size, copied)?;
                file.flush().await?;
                file.sync_all().await?;
                tokio::fs::rename(&part, &path).await
            }
            .await;

            if result.is_err() {
                let _ = tokio::fs::remove_file(&part).await;
            }
            result
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<u8>> {
        Box::pin(async move { tokio::fs::read(self.full_path(key)).await })
    }

    fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move { tokio::fs::try_exists(self.full_path(key)).await })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            match tokio::fs::remove_file(self.full_path(key)).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()), // Already deleted
                Err(e) => Err(e),
            }
        })
    }

    fn head<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ObjectMeta> {
        Box::pin(async move {
            let metadata = tokio::fs::metadata(self.full_path(key)).await?;
            Ok(ObjectMeta {
                key: key.to_string(),
                size_bytes: metadata.len(),
                content_type: None,
                created_at_ms: metadata
                    .created()
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_millis() as u64)
                    .unwrap_or(0),
            })
        })
    }
}
