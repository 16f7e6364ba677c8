//! HTTP handlers for the drive API: listing, single and batch upload, and
//! object retrieval for the local-disk backend. Multipart extraction and
//! limit checks live here; upload semantics are delegated to `DriveService`.

use crate::{
    errors::AppError,
    models::record::DriveRecord,
    services::upload_service::{DriveService, UploadFile},
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tokio_util::io::ReaderStream;

/// `201` body for `POST /api/upload`.
#[derive(Serialize)]
pub struct SingleUploadResponse {
    pub message: String,
    #[serde(rename = "fileUrl")]
    pub file_url: String,
    #[serde(rename = "dbEntry")]
    pub db_entry: DriveRecord,
}

/// `201` body for `POST /api/upload-multiple`.
#[derive(Serialize)]
pub struct MultiUploadResponse {
    pub message: String,
    #[serde(rename = "fileUrls")]
    pub file_urls: Vec<String>,
    #[serde(rename = "dbEntries")]
    pub db_entries: Vec<DriveRecord>,
}

/// GET `/api/drive` — every record, newest first.
pub async fn list_drive(
    State(service): State<DriveService>,
) -> Result<Json<Vec<DriveRecord>>, AppError> {
    let records = service.list_records().await.map_err(|err| {
        tracing::error!("listing drive records failed: {err}");
        AppError::internal(format!("Database error: {err}"))
    })?;
    Ok(Json(records))
}

/// POST `/api/upload` — multipart with one `file` field.
pub async fn upload_single(
    State(service): State<DriveService>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let files = collect_files(multipart, "file").await?;
    let Some(file) = files.into_iter().next() else {
        return Err(AppError::bad_request("No File Uploaded."));
    };

    let (url, record) = service.upload_single(file).await?;

    Ok((
        StatusCode::CREATED,
        Json(SingleUploadResponse {
            message: "File uploaded and URL saved to database successfully!".into(),
            file_url: url,
            db_entry: record,
        }),
    ))
}

/// POST `/api/upload-multiple` — multipart with repeated `files` fields.
pub async fn upload_multiple(
    State(service): State<DriveService>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let files = collect_files(multipart, "files").await?;
    if files.is_empty() {
        return Err(AppError::bad_request("No files uploaded."));
    }

    let receipt = service.upload_batch(files).await?;

    Ok((
        StatusCode::CREATED,
        Json(MultiUploadResponse {
            message: "Files uploaded and URLs saved to database successfully!".into(),
            file_urls: receipt.urls,
            db_entries: receipt.records,
        }),
    ))
}

/// GET `/objects/{*key}` — stream a stored payload back out. This is what
/// makes fs-backend URLs resolvable; under the S3 backend URLs point at the
/// bucket directly and this route is a fallback.
pub async fn get_object(
    State(service): State<DriveService>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let payload = service.store().get_object(&key).await?;

    let mime = mime_guess::from_path(&key).first_or_octet_stream();
    let mut response = Response::new(Body::from_stream(ReaderStream::new(payload.reader)));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime.as_ref())
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    if let Some(len) = payload.len {
        headers.insert(
            header::CONTENT_LENGTH,
            HeaderValue::from_str(&len.to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("0")),
        );
    }
    Ok(response)
}

/// Drain the multipart stream, keeping fields named `field_name`. Fields
/// under any other name are ignored, matching the upload middleware the
/// browser client was written against.
async fn collect_files(
    mut multipart: Multipart,
    field_name: &str,
) -> Result<Vec<UploadFile>, AppError> {
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(field_name) {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| "unnamed".into());
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(multipart_error)?;
        files.push(UploadFile {
            filename,
            content_type,
            bytes,
        });
    }
    Ok(files)
}

fn multipart_error(err: MultipartError) -> AppError {
    AppError::new(err.status(), err.body_text())
}
