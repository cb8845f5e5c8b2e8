//! Object-storage capability of the backend service.
//!
//! Not used by the stores; upload and media features sit on top of it.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::StorageError;

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Stores `bytes` at `path` inside `bucket`, replacing any existing object.
    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> Result<(), StorageError>;

    /// Returns a URL granting read access to the object for `ttl`.
    async fn create_signed_url(
        &self,
        bucket: &str,
        path: &str,
        ttl: Duration,
    ) -> Result<String, StorageError>;
}
