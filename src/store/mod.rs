//! Object store capability.
//!
//! The upload coordinator only needs "put bytes under a key, get back a
//! stable public URL". That capability is a trait so the backend is an
//! explicitly constructed value handed to the service at startup: [`s3::S3Store`]
//! for the managed service, [`fs::FsObjectStore`] for local disk.

pub mod fs;
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::io;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncRead;

pub const MAX_FILENAME_LEN: usize = 255;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("invalid filename `{0}`")]
    InvalidFilename(String),
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("object store backend error: {0}")]
    Backend(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type ObjectStoreResult<T> = Result<T, ObjectStoreError>;

/// A successfully stored object: the key it landed under and the public URL
/// that resolves to it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
}

/// An object payload opened for reading.
pub struct ObjectPayload {
    /// Size in bytes, when the backend knows it up front.
    pub len: Option<u64>,
    pub reader: Pin<Box<dyn AsyncRead + Send>>,
}

impl std::fmt::Debug for ObjectPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectPayload")
            .field("len", &self.len)
            .field("reader", &"<dyn AsyncRead>")
            .finish()
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Persist `body` under `key` and return the publicly resolvable URL.
    /// The write is durable once this returns Ok.
    async fn put_object(
        &self,
        key: &str,
        content_type: Option<&str>,
        body: Bytes,
    ) -> ObjectStoreResult<String>;

    /// Open `key` for reading.
    async fn get_object(&self, key: &str) -> ObjectStoreResult<ObjectPayload>;

    /// Readiness probe for /readyz.
    async fn check_ready(&self) -> ObjectStoreResult<()>;
}

/// Build the storage key for an uploaded file: a millisecond timestamp
/// prefix keeps concurrently uploaded files with the same name from
/// colliding while leaving the original filename visible in the URL.
pub fn object_key(filename: &str) -> String {
    format!("{}-{}", Utc::now().timestamp_millis(), filename)
}

/// Basic filename validation to avoid trivial path traversal vectors.
///
/// Rejects empty and oversized names, path separators, `..`, and control
/// characters. Runs before any I/O so a bad name has no side effects.
pub fn ensure_filename_safe(name: &str) -> ObjectStoreResult<()> {
    if name.is_empty() || name.len() > MAX_FILENAME_LEN {
        return Err(ObjectStoreError::InvalidFilename(name.to_string()));
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(ObjectStoreError::InvalidFilename(name.to_string()));
    }
    if name.bytes().any(|b| b.is_ascii_control() || b == b'\0') {
        return Err(ObjectStoreError::InvalidFilename(name.to_string()));
    }
    Ok(())
}
