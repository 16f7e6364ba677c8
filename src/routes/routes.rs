//! Defines routes for the drive API.
//!
//! ## Structure
//! - `GET  /api/drive`           — list stored file records, newest first
//! - `POST /api/upload`          — single-file multipart upload (field `file`)
//! - `POST /api/upload-multiple` — batch multipart upload (field `files`)
//! - `GET  /objects/{*key}`      — serve a stored payload (fs backend URLs)
//! - `GET  /healthz`, `/readyz`  — liveness and readiness
//!
//! Cross-origin requests are restricted to the single configured origin,
//! permitting `GET, POST, PUT, OPTIONS` with `Content-Type`/`Authorization`
//! headers. Body limits differ per route: the single-file route accepts one
//! large file, the batch route up to `max_batch_files` smaller ones.

use crate::{
    handlers::{
        drive_handlers::{get_object, list_drive, upload_multiple, upload_single},
        health_handlers::{healthz, readyz},
    },
    services::upload_service::{DriveService, UploadLimits},
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{
        HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};

/// Slack on top of the payload limits for multipart boundaries and part
/// headers.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build and return the router for all drive routes.
///
/// The router carries shared state (`DriveService`) to all handlers.
pub fn routes(allowed_origin: &str, limits: &UploadLimits) -> Router<DriveService> {
    let single_limit = limits.single_file_bytes + MULTIPART_OVERHEAD;
    let batch_limit = limits.max_batch_files * limits.batch_file_bytes + MULTIPART_OVERHEAD;

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // drive API
        .route("/api/drive", get(list_drive))
        .route(
            "/api/upload",
            post(upload_single).layer(DefaultBodyLimit::max(single_limit)),
        )
        .route(
            "/api/upload-multiple",
            post(upload_multiple).layer(DefaultBodyLimit::max(batch_limit)),
        )
        // object payloads (fs backend)
        .route("/objects/{*key}", get(get_object))
        .layer(cors_layer(allowed_origin))
}

/// CORS restricted to the one configured origin. An unparseable origin falls
/// back to permissive mode with a warning.
fn cors_layer(allowed_origin: &str) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::PUT, Method::OPTIONS];

    match allowed_origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_methods(methods)
            .allow_headers([CONTENT_TYPE, AUTHORIZATION])
            .allow_origin(origin),
        Err(_) => {
            tracing::warn!(
                "allowed origin `{}` is not a valid header value, allowing any origin",
                allowed_origin
            );
            CorsLayer::new()
                .allow_methods(methods)
                .allow_headers(Any)
                .allow_origin(Any)
        }
    }
}
