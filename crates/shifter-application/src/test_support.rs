//! Row storage wrappers and fixtures shared by the store tests.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::broadcast;

use shifter_core::backend::{AuthChange, AuthService, Record, RowStorage, SessionToken};
use shifter_core::{AuthError, StorageError};
use shifter_infrastructure::InMemoryBackend;

use crate::session::SessionStore;

pub(crate) fn memory_store() -> (InMemoryBackend, Arc<SessionStore>) {
    let backend = InMemoryBackend::new();
    let store = SessionStore::new(backend.auth(), backend.rows());
    (backend, Arc::new(store))
}

/// Never finds a row, as if another client were always one step ahead.
pub(crate) struct BlindRows {
    inner: Arc<dyn RowStorage>,
}

impl BlindRows {
    pub(crate) fn new(inner: Arc<dyn RowStorage>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl RowStorage for BlindRows {
    async fn get(&self, _table: &str, _id: &str) -> Result<Option<Record>, StorageError> {
        Ok(None)
    }

    async fn insert(&self, table: &str, record: Record) -> Result<Record, StorageError> {
        self.inner.insert(table, record).await
    }

    async fn update(&self, table: &str, id: &str, patch: Record) -> Result<Record, StorageError> {
        self.inner.update(table, id, patch).await
    }
}

/// Yields to the scheduler around every write so concurrent callers interleave.
pub(crate) struct YieldingRows {
    inner: Arc<dyn RowStorage>,
}

impl YieldingRows {
    pub(crate) fn new(inner: Arc<dyn RowStorage>) -> Self {
        Self { inner }
    }

    async fn pause() {
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl RowStorage for YieldingRows {
    async fn get(&self, table: &str, id: &str) -> Result<Option<Record>, StorageError> {
        Self::pause().await;
        self.inner.get(table, id).await
    }

    async fn insert(&self, table: &str, record: Record) -> Result<Record, StorageError> {
        Self::pause().await;
        self.inner.insert(table, record).await
    }

    async fn update(&self, table: &str, id: &str, patch: Record) -> Result<Record, StorageError> {
        Self::pause().await;
        let result = self.inner.update(table, id, patch).await;
        Self::pause().await;
        result
    }
}

/// Identity provider whose sign-out always fails.
pub(crate) struct FailingRevoke {
    inner: Arc<dyn AuthService>,
}

impl FailingRevoke {
    pub(crate) fn new(inner: Arc<dyn AuthService>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl AuthService for FailingRevoke {
    async fn sign_in(&self, email: &str, password: &str) -> Result<SessionToken, AuthError> {
        self.inner.sign_in(email, password).await
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Map<String, Value>,
    ) -> Result<SessionToken, AuthError> {
        self.inner.sign_up(email, password, metadata).await
    }

    async fn current_session(&self) -> Result<Option<SessionToken>, AuthError> {
        self.inner.current_session().await
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        Err(AuthError::Rejected {
            status: 500,
            message: "revoke unavailable".to_string(),
        })
    }

    fn session_changes(&self) -> broadcast::Receiver<AuthChange> {
        self.inner.session_changes()
    }
}
