//! Upload transaction coordinator.
//!
//! A batch of files moves through an explicit state machine:
//!
//! ```text
//! PendingBatch --upload_objects--> UploadedBatch --commit_metadata--> BatchReceipt
//!        \                                  \
//!         ObjectUploadFailed                 MetadataRolledBack
//! ```
//!
//! Object uploads happen before the metadata transaction opens, so the two
//! failure arms differ: an object failure aborts the remaining uploads with
//! no metadata written, while a metadata failure rolls back every insert of
//! the batch but leaves the already-uploaded objects orphaned in the store.
//! Orphans are not deleted (see DESIGN.md); both terminal errors carry the
//! orphaned URLs so callers and tests can observe them.

use crate::models::record::DriveRecord;
use crate::store::{ObjectStore, ObjectStoreError, StoredObject, ensure_filename_safe, object_key};
use bytes::Bytes;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Configured bounds on upload requests.
#[derive(Debug, Clone)]
pub struct UploadLimits {
    /// Maximum number of files in one multipart batch.
    pub max_batch_files: usize,
    /// Per-file byte limit for batch uploads.
    pub batch_file_bytes: usize,
    /// Byte limit for single-file uploads.
    pub single_file_bytes: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_batch_files: 10,
            batch_file_bytes: 5 * 1024 * 1024,
            single_file_bytes: 50 * 1024 * 1024,
        }
    }
}

/// One file extracted from a multipart request.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("no files in upload batch")]
    EmptyBatch,
    #[error("{count} files exceeds the {limit}-file batch limit")]
    TooManyFiles { count: usize, limit: usize },
    #[error("file `{filename}` is {size} bytes, limit is {limit}")]
    FileTooLarge {
        filename: String,
        size: usize,
        limit: usize,
    },
    #[error("unsafe filename `{0}`")]
    UnsafeFilename(String),
    #[error("object upload for `{key}` failed: {source}")]
    ObjectUpload {
        key: String,
        #[source]
        source: ObjectStoreError,
        /// URLs of objects that did land before the failure; now orphaned.
        uploaded: Vec<String>,
    },
    #[error("metadata transaction failed: {source}")]
    Metadata {
        #[source]
        source: sqlx::Error,
        /// Every URL of the batch; the objects exist but no row records them.
        orphaned: Vec<String>,
    },
}

impl UploadError {
    /// URLs of objects durably written before the batch failed. Empty for
    /// input-validation errors, which run before any I/O.
    pub fn orphaned_urls(&self) -> &[String] {
        match self {
            UploadError::ObjectUpload { uploaded, .. } => uploaded,
            UploadError::Metadata { orphaned, .. } => orphaned,
            _ => &[],
        }
    }
}

pub type UploadResult<T> = Result<T, UploadError>;

/// A validated batch; nothing has touched the object store yet.
#[derive(Debug)]
pub struct PendingBatch {
    files: Vec<UploadFile>,
}

impl PendingBatch {
    /// Validate the batch up front: non-empty, within the file-count limit,
    /// every file within `per_file_limit` and safely named. Rejection here
    /// has no side effects.
    pub fn new(
        files: Vec<UploadFile>,
        max_files: usize,
        per_file_limit: usize,
    ) -> UploadResult<Self> {
        if files.is_empty() {
            return Err(UploadError::EmptyBatch);
        }
        if files.len() > max_files {
            return Err(UploadError::TooManyFiles {
                count: files.len(),
                limit: max_files,
            });
        }
        for file in &files {
            ensure_filename_safe(&file.filename)
                .map_err(|_| UploadError::UnsafeFilename(file.filename.clone()))?;
            if file.bytes.len() > per_file_limit {
                return Err(UploadError::FileTooLarge {
                    filename: file.filename.clone(),
                    size: file.bytes.len(),
                    limit: per_file_limit,
                });
            }
        }
        Ok(Self { files })
    }

    /// Upload every file sequentially, in input order. The first failure
    /// aborts the remaining uploads; the error carries the URLs that did
    /// land, since those objects are now orphaned.
    pub async fn upload_objects(self, store: &dyn ObjectStore) -> UploadResult<UploadedBatch> {
        let mut stored: Vec<StoredObject> = Vec::with_capacity(self.files.len());
        for file in &self.files {
            let key = object_key(&file.filename);
            match store
                .put_object(&key, file.content_type.as_deref(), file.bytes.clone())
                .await
            {
                Ok(url) => stored.push(StoredObject { key, url }),
                Err(source) => {
                    return Err(UploadError::ObjectUpload {
                        key,
                        source,
                        uploaded: stored.into_iter().map(|s| s.url).collect(),
                    });
                }
            }
        }
        Ok(UploadedBatch { stored })
    }
}

/// Every object of the batch is durably in the store; no metadata exists yet.
#[derive(Debug)]
pub struct UploadedBatch {
    stored: Vec<StoredObject>,
}

impl UploadedBatch {
    pub fn urls(&self) -> Vec<String> {
        self.stored.iter().map(|s| s.url.clone()).collect()
    }

    /// Insert one row per URL, in input order, inside a single transaction.
    /// Any failure rolls the whole batch back; the error then reports every
    /// URL of the batch as orphaned.
    pub async fn commit_metadata(self, db: &SqlitePool) -> UploadResult<BatchReceipt> {
        let urls = self.urls();

        match Self::insert_all(db, &urls).await {
            Ok(records) => Ok(BatchReceipt { urls, records }),
            Err(source) => Err(UploadError::Metadata {
                source,
                orphaned: urls,
            }),
        }
    }

    async fn insert_all(db: &SqlitePool, urls: &[String]) -> Result<Vec<DriveRecord>, sqlx::Error> {
        let mut tx = db.begin().await?;
        let mut records = Vec::with_capacity(urls.len());
        for url in urls {
            match sqlx::query_as::<_, DriveRecord>(
                "INSERT INTO drive (url, created_at) VALUES (?, ?) RETURNING id, url, created_at",
            )
            .bind(url)
            .bind(Utc::now())
            .fetch_one(&mut *tx)
            .await
            {
                Ok(record) => records.push(record),
                Err(err) => {
                    let _ = tx.rollback().await;
                    return Err(err);
                }
            }
        }
        tx.commit().await?;
        Ok(records)
    }
}

/// Terminal success state: objects stored and rows committed, in matching
/// input order.
#[derive(Debug)]
pub struct BatchReceipt {
    pub urls: Vec<String>,
    pub records: Vec<DriveRecord>,
}

/// The request-facing service: owns the pooled metadata connection and the
/// injected object-store client, both shared across in-flight requests.
#[derive(Clone)]
pub struct DriveService {
    db: Arc<SqlitePool>,
    store: Arc<dyn ObjectStore>,
    limits: UploadLimits,
}

impl DriveService {
    pub fn new(db: Arc<SqlitePool>, store: Arc<dyn ObjectStore>, limits: UploadLimits) -> Self {
        Self { db, store, limits }
    }

    pub fn db(&self) -> &SqlitePool {
        &self.db
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    pub fn limits(&self) -> &UploadLimits {
        &self.limits
    }

    /// All records, newest first.
    pub async fn list_records(&self) -> Result<Vec<DriveRecord>, sqlx::Error> {
        sqlx::query_as::<_, DriveRecord>(
            "SELECT id, url, created_at FROM drive ORDER BY id DESC",
        )
        .fetch_all(&*self.db)
        .await
    }

    /// Single-file upload: same ordering as a batch (object first, then the
    /// row) but without transaction wrapping at N = 1.
    pub async fn upload_single(&self, file: UploadFile) -> UploadResult<(String, DriveRecord)> {
        ensure_filename_safe(&file.filename)
            .map_err(|_| UploadError::UnsafeFilename(file.filename.clone()))?;
        if file.bytes.len() > self.limits.single_file_bytes {
            return Err(UploadError::FileTooLarge {
                filename: file.filename.clone(),
                size: file.bytes.len(),
                limit: self.limits.single_file_bytes,
            });
        }

        let key = object_key(&file.filename);
        let url = self
            .store
            .put_object(&key, file.content_type.as_deref(), file.bytes.clone())
            .await
            .map_err(|source| UploadError::ObjectUpload {
                key,
                source,
                uploaded: Vec::new(),
            })?;

        match sqlx::query_as::<_, DriveRecord>(
            "INSERT INTO drive (url, created_at) VALUES (?, ?) RETURNING id, url, created_at",
        )
        .bind(&url)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await
        {
            Ok(record) => {
                info!(url = %url, id = record.id, "file uploaded and recorded");
                Ok((url, record))
            }
            Err(source) => {
                warn!(url = %url, "metadata insert failed, object left orphaned");
                Err(UploadError::Metadata {
                    source,
                    orphaned: vec![url],
                })
            }
        }
    }

    /// Multi-file upload: all N rows commit or none do.
    pub async fn upload_batch(&self, files: Vec<UploadFile>) -> UploadResult<BatchReceipt> {
        let pending = PendingBatch::new(files, self.limits.max_batch_files, self.limits.batch_file_bytes)?;

        let uploaded = pending.upload_objects(self.store.as_ref()).await.map_err(|err| {
            warn!(
                orphaned = err.orphaned_urls().len(),
                "batch aborted during object upload; uploaded objects left orphaned"
            );
            err
        })?;

        match uploaded.commit_metadata(&self.db).await {
            Ok(receipt) => {
                info!(count = receipt.records.len(), "batch committed");
                Ok(receipt)
            }
            Err(err) => {
                warn!(
                    orphaned = ?err.orphaned_urls(),
                    "batch metadata rolled back; objects left orphaned in store"
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::store::ObjectStoreResult;
    use crate::store::fs::FsObjectStore;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Succeeds for the first `fail_after` puts, then reports an outage.
    struct ScriptedStore {
        fail_after: usize,
        puts: Mutex<Vec<String>>,
    }

    impl ScriptedStore {
        fn failing_after(fail_after: usize) -> Self {
            Self {
                fail_after,
                puts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ObjectStore for ScriptedStore {
        async fn put_object(
            &self,
            key: &str,
            _content_type: Option<&str>,
            _body: Bytes,
        ) -> ObjectStoreResult<String> {
            let mut puts = self.puts.lock().unwrap();
            if puts.len() >= self.fail_after {
                return Err(ObjectStoreError::Backend("synthetic outage".into()));
            }
            let url = format!("http://objects.test/{key}");
            puts.push(url.clone());
            Ok(url)
        }

        async fn get_object(&self, key: &str) -> ObjectStoreResult<crate::store::ObjectPayload> {
            Err(ObjectStoreError::NotFound(key.to_string()))
        }

        async fn check_ready(&self) -> ObjectStoreResult<()> {
            Ok(())
        }
    }

    fn file(name: &str, data: &'static [u8]) -> UploadFile {
        UploadFile {
            filename: name.to_string(),
            content_type: Some("text/plain".into()),
            bytes: Bytes::from_static(data),
        }
    }

    async fn test_pool(tmp: &TempDir) -> Arc<SqlitePool> {
        let db_path = tmp.path().join("drive.db");
        let pool = db::connect(&format!("sqlite://{}", db_path.display()))
            .await
            .unwrap();
        db::apply_migrations(&pool).await.unwrap();
        Arc::new(pool)
    }

    async fn test_service(tmp: &TempDir) -> DriveService {
        let store = FsObjectStore::new(tmp.path().join("objects"), "http://localhost:5000");
        DriveService::new(test_pool(tmp).await, Arc::new(store), UploadLimits::default())
    }

    async fn row_count(db: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM drive")
            .fetch_one(db)
            .await
            .unwrap()
    }

    #[test]
    fn empty_batch_is_rejected_before_any_io() {
        let err = PendingBatch::new(Vec::new(), 10, 1024).unwrap_err();
        assert!(matches!(err, UploadError::EmptyBatch));
    }

    #[test]
    fn batch_over_the_file_count_limit_is_rejected() {
        let files = (0..11).map(|i| file(&format!("f{i}.txt"), b"x")).collect();
        let err = PendingBatch::new(files, 10, 1024).unwrap_err();
        assert!(matches!(err, UploadError::TooManyFiles { count: 11, limit: 10 }));
    }

    #[test]
    fn oversized_file_is_rejected() {
        let err = PendingBatch::new(vec![file("big.bin", b"0123456789")], 10, 4).unwrap_err();
        assert!(matches!(err, UploadError::FileTooLarge { size: 10, limit: 4, .. }));
    }

    #[test]
    fn unsafe_filename_is_rejected() {
        let err = PendingBatch::new(vec![file("../evil.sh", b"x")], 10, 1024).unwrap_err();
        assert!(matches!(err, UploadError::UnsafeFilename(_)));
    }

    #[tokio::test]
    async fn object_failure_aborts_remaining_uploads() {
        let store = ScriptedStore::failing_after(2);
        let batch = PendingBatch::new(
            vec![file("a.txt", b"a"), file("b.txt", b"b"), file("c.txt", b"c"), file("d.txt", b"d")],
            10,
            1024,
        )
        .unwrap();

        let err = batch.upload_objects(&store).await.unwrap_err();
        match &err {
            UploadError::ObjectUpload { key, uploaded, .. } => {
                assert!(key.ends_with("-c.txt"));
                assert_eq!(uploaded.len(), 2);
            }
            other => panic!("expected ObjectUpload, got {other:?}"),
        }
        // d.txt was never attempted
        assert_eq!(store.puts.lock().unwrap().len(), 2);
        assert_eq!(err.orphaned_urls().len(), 2);
    }

    #[tokio::test]
    async fn committed_batch_matches_input_order() {
        let tmp = tempfile::tempdir().unwrap();
        let service = test_service(&tmp).await;

        let receipt = service
            .upload_batch(vec![file("one.txt", b"1"), file("two.txt", b"2"), file("three.txt", b"3")])
            .await
            .unwrap();

        assert_eq!(receipt.urls.len(), 3);
        assert_eq!(receipt.records.len(), 3);
        assert!(receipt.urls[0].contains("one.txt"));
        assert!(receipt.urls[2].contains("three.txt"));
        for (url, record) in receipt.urls.iter().zip(&receipt.records) {
            assert_eq!(url, &record.url);
        }
        assert!(receipt.records.windows(2).all(|w| w[0].id < w[1].id));
        assert_eq!(row_count(service.db()).await, 3);
    }

    #[tokio::test]
    async fn metadata_failure_rolls_back_the_whole_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let service = test_service(&tmp).await;

        // Refuse inserts whose URL mentions "boom"; the second insert of the
        // batch trips it after both objects are already in the store.
        sqlx::query(
            "CREATE TRIGGER drive_reject_boom BEFORE INSERT ON drive
             WHEN NEW.url LIKE '%boom%'
             BEGIN SELECT RAISE(ABORT, 'forced metadata failure'); END",
        )
        .execute(service.db())
        .await
        .unwrap();

        let err = service
            .upload_batch(vec![file("fine.txt", b"ok"), file("boom.txt", b"ok")])
            .await
            .unwrap_err();

        match &err {
            UploadError::Metadata { orphaned, .. } => assert_eq!(orphaned.len(), 2),
            other => panic!("expected Metadata, got {other:?}"),
        }
        assert_eq!(row_count(service.db()).await, 0);

        // The orphaned objects really do exist in the store.
        for url in err.orphaned_urls() {
            let key = url.rsplit('/').next().unwrap();
            let key = urlencoding::decode(key).unwrap();
            service.store().get_object(&key).await.unwrap();
        }
    }

    #[tokio::test]
    async fn single_upload_inserts_one_row() {
        let tmp = tempfile::tempdir().unwrap();
        let service = test_service(&tmp).await;

        let (url, record) = service.upload_single(file("solo.txt", b"solo")).await.unwrap();
        assert_eq!(url, record.url);
        assert_eq!(row_count(service.db()).await, 1);
    }

    #[tokio::test]
    async fn single_upload_respects_the_single_file_limit() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(tmp.path().join("objects"), "http://localhost:5000");
        let limits = UploadLimits {
            single_file_bytes: 4,
            ..UploadLimits::default()
        };
        let service = DriveService::new(test_pool(&tmp).await, Arc::new(store), limits);

        let err = service.upload_single(file("big.bin", b"0123456789")).await.unwrap_err();
        assert!(matches!(err, UploadError::FileTooLarge { .. }));
        assert_eq!(row_count(service.db()).await, 0);
    }

    #[tokio::test]
    async fn listing_returns_newest_first() {
        let tmp = tempfile::tempdir().unwrap();
        let service = test_service(&tmp).await;

        for name in ["a.txt", "b.txt", "c.txt"] {
            service.upload_single(file(name, b"x")).await.unwrap();
        }

        let records = service.list_records().await.unwrap();
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }
}
