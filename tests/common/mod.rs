//! Test helpers: an in-process app wired to a temp-dir SQLite file and a
//! disk-backed object store, plus raw multipart body construction.

use axum::Router;
use drive_store::db;
use drive_store::routes;
use drive_store::services::upload_service::{DriveService, UploadLimits};
use drive_store::store::fs::FsObjectStore;
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;

/// Origin the test router is configured to allow.
pub const ALLOWED_ORIGIN: &str = "http://localhost:5173";

/// Base URL the fs store stamps into object URLs.
pub const PUBLIC_BASE_URL: &str = "http://localhost:5000";

pub const BOUNDARY: &str = "x-test-boundary-4f9d2a";

pub struct TestApp {
    pub router: Router,
    pub db: Arc<SqlitePool>,
    _tmp: TempDir,
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with_limits(UploadLimits::default()).await
}

pub async fn spawn_app_with_limits(limits: UploadLimits) -> TestApp {
    let tmp = tempfile::tempdir().expect("create temp dir");

    let db_path = tmp.path().join("drive.db");
    let db = Arc::new(
        db::connect(&format!("sqlite://{}", db_path.display()))
            .await
            .expect("connect to test database"),
    );
    db::apply_migrations(&db).await.expect("apply migrations");

    let store = Arc::new(FsObjectStore::new(
        tmp.path().join("objects"),
        PUBLIC_BASE_URL,
    ));
    let service = DriveService::new(db.clone(), store, limits.clone());
    let router = routes::routes(ALLOWED_ORIGIN, &limits).with_state(service);

    TestApp {
        router,
        db,
        _tmp: tmp,
    }
}

/// Build a raw `multipart/form-data` body carrying each file under
/// `field_name`. Pass an empty slice for a body with no parts.
pub fn multipart_body(field_name: &str, files: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (filename, content_type, data) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\n\
                 Content-Disposition: form-data; name=\"{field_name}\"; filename=\"{filename}\"\r\n\
                 Content-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn row_count(db: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM drive")
        .fetch_one(db)
        .await
        .expect("count drive rows")
}
