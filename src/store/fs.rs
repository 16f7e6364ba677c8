//! Local-disk object store.
//!
//! Payloads live beneath `base_path/{shard}/{shard}/{key}`, sharded by the
//! first two MD5 bytes of the key to keep directory fan-out bounded. Public
//! URLs point back at this service's `GET /objects/{key}` route.

use super::{ObjectPayload, ObjectStore, ObjectStoreError, ObjectStoreResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct FsObjectStore {
    base_path: PathBuf,
    public_base_url: String,
}

impl FsObjectStore {
    /// `public_base_url` is the externally reachable root of this service,
    /// e.g. `http://localhost:5000`; object URLs are built beneath its
    /// `/objects/` route.
    pub fn new(base_path: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        let public_base_url = public_base_url.into().trim_end_matches('/').to_string();
        Self {
            base_path: base_path.into(),
            public_base_url,
        }
    }

    /// Generate two-level shard identifiers for an object key.
    ///
    /// Uses MD5(key) and returns the first two bytes as lowercase
    /// hexadecimal strings (00-ff). Reduces file count per directory.
    fn object_shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Physical payload path for `key`. Parent directories may not exist yet.
    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(key);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/objects/{}",
            self.public_base_url,
            urlencoding::encode(key)
        )
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    /// Write the payload to a temporary file, fsync, then rename into the
    /// final location so a crash never leaves a partial object behind.
    async fn put_object(
        &self,
        key: &str,
        _content_type: Option<&str>,
        body: Bytes,
    ) -> ObjectStoreResult<String> {
        let file_path = self.object_path(key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            ObjectStoreError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;
        let result = async {
            file.write_all(&body).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        if let Err(err) = result {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ObjectStoreError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(ObjectStoreError::Io(err));
            }
        }

        Ok(self.object_url(key))
    }

    async fn get_object(&self, key: &str) -> ObjectStoreResult<ObjectPayload> {
        let file_path = self.object_path(key);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                ObjectStoreError::NotFound(key.to_string())
            } else {
                ObjectStoreError::Io(err)
            }
        })?;
        let len = file.metadata().await.ok().map(|m| m.len());
        Ok(ObjectPayload {
            len,
            reader: Box::pin(file),
        })
    }

    /// Best-effort write/read/delete round-trip beneath `base_path`.
    async fn check_ready(&self) -> ObjectStoreResult<()> {
        fs::create_dir_all(&self.base_path).await?;
        let tmp_path = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&tmp_path, b"readyz").await?;
        let bytes = fs::read(&tmp_path).await?;
        let _ = fs::remove_file(&tmp_path).await;
        if bytes != b"readyz" {
            return Err(ObjectStoreError::Backend(
                "readiness probe read back unexpected content".into(),
            ));
        }
        Ok(())
    }
}
