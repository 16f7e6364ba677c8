//! drive-store — a small file-storage web service.
//!
//! Browser clients upload files over multipart HTTP; payloads land in an
//! object store (S3 or local disk) and one `drive` row per file records the
//! public URL. The interesting part is the batch upload coordinator in
//! [`services::upload_service`], which keeps the object store and the
//! metadata table consistent under partial failure.

pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
pub mod view;
