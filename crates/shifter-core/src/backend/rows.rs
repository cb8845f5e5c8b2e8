//! Row-storage capability of the backend service.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::StorageError;

/// A stored row: a JSON object keyed by column name.
pub type Record = Map<String, Value>;

/// Column holding the primary key of every row.
pub const ID_COLUMN: &str = "id";

/// Minimal table access used for profile and progression persistence.
///
/// Implementations must enforce uniqueness of [`ID_COLUMN`] per table:
/// inserting a second row with the same id fails with
/// [`StorageError::Conflict`].
#[async_trait]
pub trait RowStorage: Send + Sync {
    /// Fetches a row by id.
    ///
    /// - `Ok(Some(record))`: row found
    /// - `Ok(None)`: no such row
    async fn get(&self, table: &str, id: &str) -> Result<Option<Record>, StorageError>;

    /// Inserts a new row and returns it as stored.
    async fn insert(&self, table: &str, record: Record) -> Result<Record, StorageError>;

    /// Merges `patch` into an existing row and returns the updated row.
    async fn update(&self, table: &str, id: &str, patch: Record) -> Result<Record, StorageError>;
}

/// Reads the id column of a record.
pub fn record_id(record: &Record) -> Option<&str> {
    record.get(ID_COLUMN).and_then(Value::as_str)
}
