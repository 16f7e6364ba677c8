//! Represents one stored file reference in the `drive` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One row per successfully persisted file.
///
/// A row exists if and only if the corresponding object was durably written
/// to the object store and the metadata insertion committed. Rows are
/// created by the upload coordinator and never updated or deleted.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct DriveRecord {
    /// Server-assigned, monotonically increasing identifier.
    pub id: i64,

    /// Publicly resolvable location returned by the object store.
    /// Not validated for uniqueness.
    pub url: String,

    /// Assigned at insertion time, immutable afterward.
    pub created_at: DateTime<Utc>,
}
