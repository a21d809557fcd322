//! Storage backend abstraction for object storage (GCS, in-memory).
//!
//! This module defines the storage contract used for staging submission
//! artifacts and persisting capture streams:
//! - Whole-object writes from bytes or from a byte stream
//! - Object metadata for verification
//! - Client construction scoped to the access level the caller needs
//!
//! Writes are single-shot from the caller's point of view. A failed write
//! leaves no guaranteed-consistent object behind; backends that stream the
//! body do not offer resumable semantics at this layer.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};

/// A readable byte stream handed to a storage write.
pub type ByteReader = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// Access level requested when constructing a storage client.
///
/// Staging and capture only ever write, so read-write is the one level
/// clients are built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageScope {
    /// Read and write access.
    ReadWrite,
}

impl StorageScope {
    /// Returns the OAuth scope URL for this access level.
    #[must_use]
    pub const fn oauth_scope(self) -> &'static str {
        match self {
            Self::ReadWrite => "https://www.googleapis.com/auth/devstorage.read_write",
        }
    }
}

/// Metadata about a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Bucket holding the object.
    pub bucket: String,
    /// Object path (key).
    pub path: String,
    /// Object size in bytes.
    pub size: u64,
    /// Opaque version token (GCS generation).
    pub version: String,
    /// Last modification timestamp.
    pub last_modified: Option<DateTime<Utc>>,
}

/// Storage backend trait for object storage.
///
/// All storage backends (GCS, memory) implement this trait.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Reads an entire object.
    ///
    /// Returns `Error::NotFound` if the object doesn't exist.
    async fn get(&self, bucket: &str, path: &str) -> Result<Bytes>;

    /// Writes an object, creating or overwriting it.
    async fn put(&self, bucket: &str, path: &str, data: Bytes) -> Result<ObjectMeta>;

    /// Writes the full content of `reader` to an object in one logical write.
    ///
    /// The default implementation buffers the stream and delegates to
    /// [`StorageBackend::put`]. Backends that can stream a request body
    /// should override it.
    async fn put_stream(&self, bucket: &str, path: &str, mut reader: ByteReader) -> Result<ObjectMeta> {
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .await
            .map_err(|e| Error::storage_with_source(format!("failed to read stream for {path}"), e))?;
        self.put(bucket, path, Bytes::from(buf)).await
    }

    /// Gets object metadata without reading content.
    ///
    /// Returns `None` if the object doesn't exist.
    async fn head(&self, bucket: &str, path: &str) -> Result<Option<ObjectMeta>>;
}

/// Constructs authenticated storage clients.
///
/// Client construction is where credentials are acquired, so it is the
/// step most likely to fail outside of tests.
#[async_trait]
pub trait StorageClientFactory: Send + Sync {
    /// Returns a client with at least the requested access level.
    async fn connect(&self, scope: StorageScope) -> Result<Arc<dyn StorageBackend>>;
}

/// In-memory storage backend for testing.
///
/// Thread-safe via `RwLock`. Not suitable for production.
/// Uses numeric versions internally (stored as strings) to simulate GCS-like behavior.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    objects: Arc<RwLock<HashMap<(String, String), StoredObject>>>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    version: i64,
    last_modified: DateTime<Utc>,
}

impl StoredObject {
    fn meta(&self, bucket: &str, path: &str) -> ObjectMeta {
        ObjectMeta {
            bucket: bucket.to_string(),
            path: path.to_string(),
            size: self.data.len() as u64,
            version: self.version.to_string(),
            last_modified: Some(self.last_modified),
        }
    }
}

impl MemoryBackend {
    /// Creates a new empty memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the `(bucket, path)` keys of all stored objects, sorted.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` if the lock is poisoned.
    pub fn keys(&self) -> Result<Vec<(String, String)>> {
        let objects = self.objects.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;
        let mut keys: Vec<_> = objects.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, bucket: &str, path: &str) -> Result<Bytes> {
        let objects = self.objects.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        objects
            .get(&(bucket.to_string(), path.to_string()))
            .map(|o| o.data.clone())
            .ok_or_else(|| Error::NotFound(format!("object not found: gs://{bucket}/{path}")))
    }

    async fn put(&self, bucket: &str, path: &str, data: Bytes) -> Result<ObjectMeta> {
        let mut objects = self.objects.write().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        let key = (bucket.to_string(), path.to_string());
        let version = objects.get(&key).map_or(1, |o| o.version + 1);
        let stored = StoredObject {
            data,
            version,
            last_modified: Utc::now(),
        };
        let meta = stored.meta(bucket, path);
        objects.insert(key, stored);
        drop(objects);

        Ok(meta)
    }

    async fn head(&self, bucket: &str, path: &str) -> Result<Option<ObjectMeta>> {
        let objects = self.objects.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        Ok(objects
            .get(&(bucket.to_string(), path.to_string()))
            .map(|obj| obj.meta(bucket, path)))
    }
}

/// Client factory that hands out a shared [`MemoryBackend`].
#[derive(Debug, Default, Clone)]
pub struct MemoryClientFactory {
    backend: MemoryBackend,
}

impl MemoryClientFactory {
    /// Creates a factory over `backend`.
    #[must_use]
    pub const fn new(backend: MemoryBackend) -> Self {
        Self { backend }
    }

    /// Returns the backend shared by every client this factory hands out.
    #[must_use]
    pub const fn backend(&self) -> &MemoryBackend {
        &self.backend
    }
}

#[async_trait]
impl StorageClientFactory for MemoryClientFactory {
    async fn connect(&self, _scope: StorageScope) -> Result<Arc<dyn StorageBackend>> {
        Ok(Arc::new(self.backend.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_roundtrip() {
        let backend = MemoryBackend::new();
        let data = Bytes::from("hello world");

        let meta = backend
            .put("bucket", "test/file.txt", data.clone())
            .await
            .expect("put should succeed");
        assert_eq!(meta.version, "1");
        assert_eq!(meta.size, 11);

        let retrieved = backend
            .get("bucket", "test/file.txt")
            .await
            .expect("get should succeed");
        assert_eq!(retrieved, data);
    }

    #[tokio::test]
    async fn test_buckets_are_isolated() {
        let backend = MemoryBackend::new();
        backend
            .put("a", "same/path", Bytes::from("a"))
            .await
            .expect("put should succeed");

        assert!(backend.get("b", "same/path").await.is_err());
        assert!(backend.head("b", "same/path").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites_and_bumps_version() {
        let backend = MemoryBackend::new();
        backend.put("b", "obj", Bytes::from("v1")).await.unwrap();
        let meta = backend.put("b", "obj", Bytes::from("v22")).await.unwrap();

        assert_eq!(meta.version, "2");
        assert_eq!(meta.size, 3);
        assert_eq!(backend.get("b", "obj").await.unwrap(), Bytes::from("v22"));
    }

    #[tokio::test]
    async fn test_put_stream_reads_whole_reader() {
        let backend = MemoryBackend::new();
        let reader: ByteReader = Box::new(&b"streamed content"[..]);

        let meta = backend
            .put_stream("b", "streams/one", reader)
            .await
            .expect("put_stream should succeed");

        assert_eq!(meta.size, 16);
        assert_eq!(
            backend.get("b", "streams/one").await.unwrap(),
            Bytes::from("streamed content")
        );
    }

    #[tokio::test]
    async fn test_client_factory_shares_backend() {
        let factory = MemoryClientFactory::default();
        let client = factory
            .connect(StorageScope::ReadWrite)
            .await
            .expect("connect should succeed");
        client.put("b", "k", Bytes::from("x")).await.unwrap();

        assert_eq!(
            factory.backend().keys().unwrap(),
            vec![("b".to_string(), "k".to_string())]
        );
    }

    #[test]
    fn test_scope_urls() {
        assert!(StorageScope::ReadWrite.oauth_scope().ends_with("read_write"));
    }
}
