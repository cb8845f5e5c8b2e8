//! Process-local backend.
//!
//! Implements all three backend capabilities in memory. Used by the CLI demo
//! and by tests; `set_offline(true)` makes every call fail with a network
//! error so failure paths can be exercised end to end.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use shifter_core::backend::{
    record_id, AuthChange, AuthService, AuthUser, ObjectStorage, Record, RowStorage, SessionToken,
    ID_COLUMN,
};
use shifter_core::{AuthError, StorageError};

const MIN_PASSWORD_LEN: usize = 6;
const CHANGE_CHANNEL_CAP: usize = 16;
const OFFLINE_MESSAGE: &str = "backend offline";

#[derive(Debug, Clone)]
struct Account {
    user: AuthUser,
    password_digest: String,
}

fn password_digest(user_id: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Shared "network is down" switch.
#[derive(Debug, Clone, Default)]
struct Connectivity(Arc<AtomicBool>);

impl Connectivity {
    fn is_offline(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn set_offline(&self, offline: bool) {
        self.0.store(offline, Ordering::SeqCst);
    }

    fn auth(&self) -> Result<(), AuthError> {
        if self.is_offline() {
            Err(AuthError::Network(OFFLINE_MESSAGE.to_string()))
        } else {
            Ok(())
        }
    }

    fn storage(&self) -> Result<(), StorageError> {
        if self.is_offline() {
            Err(StorageError::Network(OFFLINE_MESSAGE.to_string()))
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// Auth
// ============================================================================

/// In-memory accounts and a single current session.
pub struct InMemoryAuthService {
    /// Accounts keyed by lower-cased email.
    accounts: RwLock<HashMap<String, Account>>,
    current: RwLock<Option<SessionToken>>,
    changes: broadcast::Sender<AuthChange>,
    session_ttl: ChronoDuration,
    connectivity: Connectivity,
}

impl InMemoryAuthService {
    pub fn new() -> Self {
        Self::with_connectivity(Connectivity::default())
    }

    fn with_connectivity(connectivity: Connectivity) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAP);
        Self {
            accounts: RwLock::new(HashMap::new()),
            current: RwLock::new(None),
            changes,
            session_ttl: ChronoDuration::hours(1),
            connectivity,
        }
    }

    /// Ends the current session as if it had timed out remotely, notifying
    /// listeners with [`AuthChange::Expired`].
    pub async fn expire_current_session(&self) {
        let had_session = self.current.write().await.take().is_some();
        if had_session {
            tracing::debug!("In-memory session expired");
            let _ = self.changes.send(AuthChange::Expired);
        }
    }

    fn issue_token(&self, user: AuthUser) -> SessionToken {
        SessionToken {
            access_token: Uuid::new_v4().to_string(),
            refresh_token: Some(Uuid::new_v4().to_string()),
            user,
            expires_at: Utc::now() + self.session_ttl,
        }
    }
}

impl Default for InMemoryAuthService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthService for InMemoryAuthService {
    async fn sign_in(&self, email: &str, password: &str) -> Result<SessionToken, AuthError> {
        self.connectivity.auth()?;

        let account = {
            let accounts = self.accounts.read().await;
            accounts.get(&email.trim().to_lowercase()).cloned()
        };
        let account = account.ok_or(AuthError::CredentialsRejected)?;
        if account.password_digest != password_digest(&account.user.id, password) {
            return Err(AuthError::CredentialsRejected);
        }

        let token = self.issue_token(account.user);
        *self.current.write().await = Some(token.clone());
        Ok(token)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Map<String, Value>,
    ) -> Result<SessionToken, AuthError> {
        self.connectivity.auth()?;

        let key = email.trim().to_lowercase();
        if !key.contains('@') {
            return Err(AuthError::Rejected {
                status: 422,
                message: "Unable to validate email address: invalid format".to_string(),
            });
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::Rejected {
                status: 422,
                message: format!("Password should be at least {} characters", MIN_PASSWORD_LEN),
            });
        }

        let user = {
            let mut accounts = self.accounts.write().await;
            if accounts.contains_key(&key) {
                return Err(AuthError::AlreadyRegistered(key));
            }
            let user = AuthUser {
                id: Uuid::new_v4().to_string(),
                email: key.clone(),
                metadata,
            };
            accounts.insert(
                key,
                Account {
                    password_digest: password_digest(&user.id, password),
                    user: user.clone(),
                },
            );
            user
        };

        let token = self.issue_token(user);
        *self.current.write().await = Some(token.clone());
        Ok(token)
    }

    async fn current_session(&self) -> Result<Option<SessionToken>, AuthError> {
        self.connectivity.auth()?;

        let mut current = self.current.write().await;
        if current
            .as_ref()
            .is_some_and(|token| token.is_expired_at(Utc::now()))
        {
            *current = None;
        }
        Ok(current.clone())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.connectivity.auth()?;

        if self.current.write().await.take().is_some() {
            let _ = self.changes.send(AuthChange::SignedOut);
        }
        Ok(())
    }

    fn session_changes(&self) -> broadcast::Receiver<AuthChange> {
        self.changes.subscribe()
    }
}

// ============================================================================
// Rows
// ============================================================================

/// In-memory tables with a unique `id` column.
#[derive(Default)]
pub struct InMemoryRowStorage {
    tables: RwLock<HashMap<String, HashMap<String, Record>>>,
    connectivity: Connectivity,
}

impl InMemoryRowStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_connectivity(connectivity: Connectivity) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            connectivity,
        }
    }

    /// Number of rows in `table`.
    pub async fn count(&self, table: &str) -> usize {
        self.tables.read().await.get(table).map_or(0, HashMap::len)
    }
}

#[async_trait]
impl RowStorage for InMemoryRowStorage {
    async fn get(&self, table: &str, id: &str) -> Result<Option<Record>, StorageError> {
        self.connectivity.storage()?;
        let tables = self.tables.read().await;
        Ok(tables.get(table).and_then(|rows| rows.get(id)).cloned())
    }

    async fn insert(&self, table: &str, record: Record) -> Result<Record, StorageError> {
        self.connectivity.storage()?;
        let id = record_id(&record)
            .ok_or_else(|| StorageError::Malformed(format!("{} row without string id", table)))?
            .to_string();

        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();
        if rows.contains_key(&id) {
            return Err(StorageError::conflict(table, id));
        }
        rows.insert(id, record.clone());
        Ok(record)
    }

    async fn update(&self, table: &str, id: &str, patch: Record) -> Result<Record, StorageError> {
        self.connectivity.storage()?;
        if let Some(patched_id) = record_id(&patch).filter(|patched| *patched != id) {
            return Err(StorageError::Malformed(format!(
                "cannot change {} id from '{}' to '{}'",
                table, id, patched_id
            )));
        }

        let mut tables = self.tables.write().await;
        let row = tables
            .get_mut(table)
            .and_then(|rows| rows.get_mut(id))
            .ok_or_else(|| StorageError::not_found(table, id))?;
        for (column, value) in patch {
            if column != ID_COLUMN {
                row.insert(column, value);
            }
        }
        Ok(row.clone())
    }
}

// ============================================================================
// Objects
// ============================================================================

#[derive(Default)]
pub struct InMemoryObjectStorage {
    objects: RwLock<HashMap<(String, String), Vec<u8>>>,
    connectivity: Connectivity,
}

impl InMemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_connectivity(connectivity: Connectivity) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            connectivity,
        }
    }

    pub async fn download(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        let objects = self.objects.read().await;
        objects.get(&(bucket.to_string(), path.to_string())).cloned()
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        self.connectivity.storage()?;
        let path = path.trim_start_matches('/');
        if bucket.is_empty() || path.is_empty() {
            return Err(StorageError::Malformed("bucket and path are required".into()));
        }
        let mut objects = self.objects.write().await;
        objects.insert((bucket.to_string(), path.to_string()), bytes);
        Ok(())
    }

    async fn create_signed_url(
        &self,
        bucket: &str,
        path: &str,
        ttl: Duration,
    ) -> Result<String, StorageError> {
        self.connectivity.storage()?;
        let path = path.trim_start_matches('/');
        let objects = self.objects.read().await;
        if !objects.contains_key(&(bucket.to_string(), path.to_string())) {
            return Err(StorageError::not_found(bucket, path));
        }
        let expires = Utc::now() + ChronoDuration::seconds(ttl.as_secs() as i64);
        Ok(format!(
            "memory://{}/{}?token={}&expires={}",
            bucket,
            path,
            Uuid::new_v4(),
            expires.timestamp()
        ))
    }
}

// ============================================================================
// Bundle
// ============================================================================

/// All three capabilities sharing one connectivity switch.
#[derive(Clone)]
pub struct InMemoryBackend {
    auth: Arc<InMemoryAuthService>,
    rows: Arc<InMemoryRowStorage>,
    objects: Arc<InMemoryObjectStorage>,
    connectivity: Connectivity,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        let connectivity = Connectivity::default();
        Self {
            auth: Arc::new(InMemoryAuthService::with_connectivity(connectivity.clone())),
            rows: Arc::new(InMemoryRowStorage::with_connectivity(connectivity.clone())),
            objects: Arc::new(InMemoryObjectStorage::with_connectivity(connectivity.clone())),
            connectivity,
        }
    }

    pub fn auth(&self) -> Arc<InMemoryAuthService> {
        self.auth.clone()
    }

    pub fn rows(&self) -> Arc<InMemoryRowStorage> {
        self.rows.clone()
    }

    pub fn objects(&self) -> Arc<InMemoryObjectStorage> {
        self.objects.clone()
    }

    /// While offline every call fails with a network error.
    pub fn set_offline(&self, offline: bool) {
        tracing::debug!(offline, "In-memory backend connectivity changed");
        self.connectivity.set_offline(offline);
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}
