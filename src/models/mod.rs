//! Data models for the file-storage service.
//!
//! These map to database rows via `sqlx::FromRow` and serialize as JSON via
//! `serde`.

pub mod record;
