//! RestBackend - HTTP client for a hosted auth + rows + objects platform.
//!
//! Speaks the common hosted-Postgres REST dialect:
//!
//! - auth: `/auth/v1/signup`, `/auth/v1/token?grant_type=password|refresh_token`, `/auth/v1/logout`
//! - rows: `/rest/v1/{table}?id=eq.{id}`
//! - objects: `/storage/v1/object/{bucket}/{path}`, `/storage/v1/object/sign/{bucket}/{path}`
//!
//! Every request carries the project `apikey`; row and object calls use the
//! signed-in user's bearer token when there is one.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use reqwest::header::HeaderValue;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};

use shifter_core::backend::{
    AuthChange, AuthService, AuthUser, ObjectStorage, Record, RowStorage, SessionToken,
};
use shifter_core::config::BackendSettings;
use shifter_core::{AuthError, Result, ShifterError, StorageError};

use super::session_file::SessionFile;
use crate::paths::ShifterPaths;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CHANGE_CHANNEL_CAP: usize = 16;
/// Refresh this long before the access token actually expires.
const EXPIRY_SKEW_SECS: i64 = 30;

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct WireSession {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: WireUser,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct WireSignedUrl {
    #[serde(rename = "signedURL", alias = "signedUrl")]
    signed_url: String,
}

/// Converts an auth response body into a session token.
fn parse_session(body: Value, now: DateTime<Utc>) -> std::result::Result<SessionToken, AuthError> {
    let wire: WireSession = serde_json::from_value(body).map_err(|e| AuthError::Rejected {
        status: 200,
        message: format!("response without a session (email confirmation pending?): {}", e),
    })?;

    let expires_at = match (wire.expires_at, wire.expires_in) {
        (Some(at), _) => Utc.timestamp_opt(at, 0).single().unwrap_or(now),
        (None, Some(secs)) => now + ChronoDuration::seconds(secs),
        (None, None) => now + ChronoDuration::hours(1),
    };

    Ok(SessionToken {
        access_token: wire.access_token,
        refresh_token: wire.refresh_token,
        user: AuthUser {
            id: wire.user.id,
            email: wire.user.email.unwrap_or_default(),
            metadata: wire.user.user_metadata,
        },
        expires_at,
    })
}

/// Best human-readable message in an error body.
fn error_message(body: &Value) -> String {
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

fn map_auth_failure(status: StatusCode, body: &Value, email: &str) -> AuthError {
    let message = error_message(body);
    let lower = message.to_lowercase();
    let invalid_grant = body.get("error").and_then(Value::as_str) == Some("invalid_grant");

    if status == StatusCode::BAD_REQUEST
        && (invalid_grant || lower.contains("invalid login credentials"))
    {
        AuthError::CredentialsRejected
    } else if (status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN)
        && lower.contains("expired")
    {
        AuthError::SessionExpired
    } else if lower.contains("already registered") {
        AuthError::AlreadyRegistered(email.to_string())
    } else if status.is_server_error() {
        AuthError::Network(format!("{}: {}", status, message))
    } else {
        AuthError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

fn map_storage_failure(status: StatusCode, body: &Value, table: &str, id: &str) -> StorageError {
    // 23505 = unique_violation
    let duplicate = body.get("code").and_then(Value::as_str) == Some("23505");

    if status == StatusCode::NOT_FOUND {
        StorageError::not_found(table, id)
    } else if status == StatusCode::CONFLICT || duplicate {
        StorageError::conflict(table, id)
    } else if status.is_server_error() {
        StorageError::Network(format!("{}: {}", status, error_message(body)))
    } else {
        StorageError::Malformed(format!("{}: {}", status, error_message(body)))
    }
}

/// First row of a `return=representation` response.
fn first_row(body: Value) -> Option<Record> {
    match body {
        Value::Array(rows) => rows.into_iter().next().and_then(|row| match row {
            Value::Object(map) => Some(map),
            _ => None,
        }),
        Value::Object(map) => Some(map),
        _ => None,
    }
}

// ============================================================================
// Client
// ============================================================================

/// Signed-in token plus whether it has been seeded from the session file.
/// Both live under one lock so the file is read at most once.
#[derive(Default)]
struct CurrentSession {
    token: Option<SessionToken>,
    restored: bool,
}

impl CurrentSession {
    fn set(&mut self, token: Option<SessionToken>) {
        self.token = token;
        self.restored = true;
    }
}

pub struct RestBackend {
    client: Client,
    base_url: String,
    api_key: String,
    current: RwLock<CurrentSession>,
    session_file: Option<SessionFile>,
    changes: broadcast::Sender<AuthChange>,
}

impl RestBackend {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ShifterError::config(format!("failed to build HTTP client: {}", e)))?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAP);

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            current: RwLock::new(CurrentSession::default()),
            session_file: None,
            changes,
        })
    }

    /// Builds a client from the `[backend]` config section. The session is
    /// kept in `session_file`, or `session.json` in the config directory.
    pub fn from_settings(settings: &BackendSettings) -> Result<Self> {
        let url = settings
            .url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ShifterError::config("backend.url is required for the rest backend"))?;
        let api_key = settings
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ShifterError::config("backend.api_key is required for the rest backend"))?;

        let backend = Self::new(url, api_key)?;
        let session_path = match &settings.session_file {
            Some(path) => Some(path.clone()),
            None => ShifterPaths::default().session_file().ok(),
        };
        Ok(match session_path {
            Some(path) => backend.with_session_file(SessionFile::new(path)),
            None => backend,
        })
    }

    pub fn with_session_file(mut self, file: SessionFile) -> Self {
        self.session_file = Some(file);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn rows_url(&self, table: &str) -> String {
        self.url(&format!("rest/v1/{}", table))
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        self.url(&format!(
            "storage/v1/object/{}/{}",
            bucket,
            path.trim_start_matches('/')
        ))
    }

    fn sign_url(&self, bucket: &str, path: &str) -> String {
        self.url(&format!(
            "storage/v1/object/sign/{}/{}",
            bucket,
            path.trim_start_matches('/')
        ))
    }

    async fn bearer(&self) -> String {
        match self.current.read().await.token.as_ref() {
            Some(token) => token.access_token.clone(),
            None => self.api_key.clone(),
        }
    }

    async fn request(&self, method: Method, url: String) -> RequestBuilder {
        let bearer = self.bearer().await;
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
    }

    /// Sends a request and returns its status and JSON body (`Null` when empty).
    async fn send(
        &self,
        request: RequestBuilder,
    ) -> std::result::Result<(StatusCode, Value), reqwest::Error> {
        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        Ok((status, body))
    }

    async fn auth_call(
        &self,
        path: &str,
        payload: Value,
        email: &str,
    ) -> std::result::Result<SessionToken, AuthError> {
        tracing::debug!(path, "Auth request");
        let request = self
            .client
            .post(self.url(path))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .json(&payload);
        let (status, body) = self
            .send(request)
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(map_auth_failure(status, &body, email));
        }
        parse_session(body, Utc::now())
    }

    async fn remember(&self, token: &SessionToken) {
        self.current.write().await.set(Some(token.clone()));
        if let Some(file) = &self.session_file {
            if let Err(e) = file.store(token).await {
                tracing::warn!(error = %e, "Failed to persist session");
            }
        }
    }

    async fn forget(&self) {
        self.current.write().await.set(None);
        if let Some(file) = &self.session_file {
            if let Err(e) = file.clear().await {
                tracing::warn!(error = %e, "Failed to remove session file");
            }
        }
    }

    async fn refresh(&self, token: &SessionToken) -> std::result::Result<Option<SessionToken>, AuthError> {
        let Some(refresh_token) = token.refresh_token.as_deref() else {
            return Ok(None);
        };
        match self
            .auth_call(
                "auth/v1/token?grant_type=refresh_token",
                json!({ "refresh_token": refresh_token }),
                &token.user.email,
            )
            .await
        {
            Ok(refreshed) => Ok(Some(refreshed)),
            Err(AuthError::Network(message)) => Err(AuthError::Network(message)),
            Err(e) => {
                tracing::info!(error = %e, "Session refresh rejected");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl AuthService for RestBackend {
    async fn sign_in(&self, email: &str, password: &str) -> std::result::Result<SessionToken, AuthError> {
        let token = self
            .auth_call(
                "auth/v1/token?grant_type=password",
                json!({ "email": email, "password": password }),
                email,
            )
            .await?;
        self.remember(&token).await;
        Ok(token)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Map<String, Value>,
    ) -> std::result::Result<SessionToken, AuthError> {
        let token = self
            .auth_call(
                "auth/v1/signup",
                json!({ "email": email, "password": password, "data": metadata }),
                email,
            )
            .await?;
        self.remember(&token).await;
        Ok(token)
    }

    async fn current_session(&self) -> std::result::Result<Option<SessionToken>, AuthError> {
        let current = {
            let mut current = self.current.write().await;
            if !current.restored {
                let stored = match &self.session_file {
                    Some(file) => file.load().await,
                    None => None,
                };
                current.set(stored);
            }
            current.token.clone()
        };

        let Some(token) = current else {
            return Ok(None);
        };
        if !token.is_expired_at(Utc::now() + ChronoDuration::seconds(EXPIRY_SKEW_SECS)) {
            return Ok(Some(token));
        }

        match self.refresh(&token).await? {
            Some(refreshed) => {
                self.remember(&refreshed).await;
                let _ = self.changes.send(AuthChange::TokenRefreshed {
                    token: refreshed.clone(),
                });
                Ok(Some(refreshed))
            }
            None => {
                self.forget().await;
                let _ = self.changes.send(AuthChange::Expired);
                Ok(None)
            }
        }
    }

    async fn sign_out(&self) -> std::result::Result<(), AuthError> {
        let token = self.current.read().await.token.clone();
        // Local state goes regardless of what the server says.
        self.forget().await;

        let Some(token) = token else {
            return Ok(());
        };
        let request = self
            .client
            .post(self.url("auth/v1/logout"))
            .header("apikey", &self.api_key)
            .bearer_auth(&token.access_token);
        let (status, body) = self
            .send(request)
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let _ = self.changes.send(AuthChange::SignedOut);
        if status.is_success() {
            Ok(())
        } else {
            Err(map_auth_failure(status, &body, &token.user.email))
        }
    }

    fn session_changes(&self) -> broadcast::Receiver<AuthChange> {
        self.changes.subscribe()
    }
}

#[async_trait]
impl RowStorage for RestBackend {
    async fn get(&self, table: &str, id: &str) -> std::result::Result<Option<Record>, StorageError> {
        let request = self
            .request(Method::GET, self.rows_url(table))
            .await
            .query(&[("id", format!("eq.{}", id)), ("select", "*".to_string())]);
        let (status, body) = self
            .send(request)
            .await
            .map_err(|e| StorageError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(map_storage_failure(status, &body, table, id));
        }
        Ok(first_row(body))
    }

    async fn insert(&self, table: &str, record: Record) -> std::result::Result<Record, StorageError> {
        let id = shifter_core::backend::record_id(&record)
            .unwrap_or_default()
            .to_string();
        let request = self
            .request(Method::POST, self.rows_url(table))
            .await
            .header("Prefer", HeaderValue::from_static("return=representation"))
            .json(&record);
        let (status, body) = self
            .send(request)
            .await
            .map_err(|e| StorageError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(map_storage_failure(status, &body, table, &id));
        }
        first_row(body).ok_or_else(|| StorageError::Malformed(format!("{} insert returned no row", table)))
    }

    async fn update(
        &self,
        table: &str,
        id: &str,
        patch: Record,
    ) -> std::result::Result<Record, StorageError> {
        let request = self
            .request(Method::PATCH, self.rows_url(table))
            .await
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", HeaderValue::from_static("return=representation"))
            .json(&patch);
        let (status, body) = self
            .send(request)
            .await
            .map_err(|e| StorageError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(map_storage_failure(status, &body, table, id));
        }
        // An empty result set means the filter matched nothing.
        first_row(body).ok_or_else(|| StorageError::not_found(table, id))
    }
}

#[async_trait]
impl ObjectStorage for RestBackend {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
    ) -> std::result::Result<(), StorageError> {
        let request = self
            .request(Method::POST, self.object_url(bucket, path))
            .await
            .header("x-upsert", HeaderValue::from_static("true"))
            .body(bytes);
        let (status, body) = self
            .send(request)
            .await
            .map_err(|e| StorageError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(map_storage_failure(status, &body, bucket, path));
        }
        Ok(())
    }

    async fn create_signed_url(
        &self,
        bucket: &str,
        path: &str,
        ttl: Duration,
    ) -> std::result::Result<String, StorageError> {
        let request = self
            .request(Method::POST, self.sign_url(bucket, path))
            .await
            .json(&json!({ "expiresIn": ttl.as_secs() }));
        let (status, body) = self
            .send(request)
            .await
            .map_err(|e| StorageError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(map_storage_failure(status, &body, bucket, path));
        }
        let signed: WireSignedUrl = serde_json::from_value(body)
            .map_err(|e| StorageError::Malformed(format!("signed url response: {}", e)))?;
        Ok(self.url(&format!("storage/v1/{}", signed.signed_url.trim_start_matches('/'))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> RestBackend {
        RestBackend::new("https://project.example.invalid/", "anon-key").unwrap()
    }

    #[test]
    fn test_url_building() {
        let backend = backend();
        assert_eq!(
            backend.rows_url("profiles"),
            "https://project.example.invalid/rest/v1/profiles"
        );
        assert_eq!(
            backend.object_url("sigils", "/u1/a.png"),
            "https://project.example.invalid/storage/v1/object/sigils/u1/a.png"
        );
        assert_eq!(
            backend.sign_url("sigils", "u1/a.png"),
            "https://project.example.invalid/storage/v1/object/sign/sigils/u1/a.png"
        );
    }

    #[test]
    fn test_parse_session_with_expires_in() {
        let now = Utc::now();
        let token = parse_session(
            json!({
                "access_token": "at",
                "refresh_token": "rt",
                "expires_in": 3600,
                "user": {
                    "id": "u1",
                    "email": "a@b.com",
                    "user_metadata": { "display_name": "Ana" }
                }
            }),
            now,
        )
        .unwrap();

        assert_eq!(token.user_id(), "u1");
        assert_eq!(token.user.display_name(), Some("Ana"));
        assert_eq!(token.expires_at, now + ChronoDuration::seconds(3600));
    }

    #[test]
    fn test_parse_session_without_token_is_rejected() {
        let err = parse_session(json!({ "id": "u1", "email": "a@b.com" }), Utc::now()).unwrap_err();
        assert!(matches!(err, AuthError::Rejected { .. }));
    }

    #[test]
    fn test_auth_failure_mapping() {
        let body = json!({ "error": "invalid_grant", "error_description": "Invalid login credentials" });
        assert_eq!(
            map_auth_failure(StatusCode::BAD_REQUEST, &body, "a@b.com"),
            AuthError::CredentialsRejected
        );

        let body = json!({ "code": 422, "msg": "User already registered" });
        assert_eq!(
            map_auth_failure(StatusCode::UNPROCESSABLE_ENTITY, &body, "a@b.com"),
            AuthError::AlreadyRegistered("a@b.com".into())
        );

        let body = json!({ "message": "upstream down" });
        assert!(matches!(
            map_auth_failure(StatusCode::BAD_GATEWAY, &body, "a@b.com"),
            AuthError::Network(_)
        ));
    }

    #[test]
    fn test_storage_failure_mapping() {
        let body = json!({ "code": "23505", "message": "duplicate key value" });
        assert_eq!(
            map_storage_failure(StatusCode::BAD_REQUEST, &body, "profiles", "u1"),
            StorageError::conflict("profiles", "u1")
        );
        assert_eq!(
            map_storage_failure(StatusCode::NOT_FOUND, &Value::Null, "profiles", "u1"),
            StorageError::not_found("profiles", "u1")
        );
        assert!(matches!(
            map_storage_failure(StatusCode::SERVICE_UNAVAILABLE, &Value::Null, "profiles", "u1"),
            StorageError::Network(_)
        ));
    }

    #[test]
    fn test_first_row() {
        assert!(first_row(json!([])).is_none());
        let row = first_row(json!([{ "id": "u1" }])).unwrap();
        assert_eq!(row["id"], "u1");
    }

    #[test]
    fn test_from_settings_requires_url_and_key() {
        let settings = BackendSettings::default();
        assert!(matches!(
            RestBackend::from_settings(&settings),
            Err(ShifterError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_current_session_restores_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = SessionFile::new(dir.path().join("session.json"));
        let token = SessionToken {
            access_token: "at".into(),
            refresh_token: None,
            user: AuthUser {
                id: "u1".into(),
                email: "a@b.com".into(),
                metadata: Map::new(),
            },
            expires_at: Utc::now() + ChronoDuration::hours(1),
        };
        file.store(&token).await.unwrap();

        let backend = backend().with_session_file(file);
        assert_eq!(backend.current_session().await.unwrap(), Some(token));
    }

    #[tokio::test]
    async fn test_session_file_is_read_once() {
        let dir = tempfile::tempdir().unwrap();
        let file = SessionFile::new(dir.path().join("session.json"));
        let token = SessionToken {
            access_token: "at".into(),
            refresh_token: None,
            user: AuthUser {
                id: "u1".into(),
                email: "a@b.com".into(),
                metadata: Map::new(),
            },
            expires_at: Utc::now() + ChronoDuration::hours(1),
        };
        file.store(&token).await.unwrap();
        let backend = backend().with_session_file(file.clone());

        let (first, second) = tokio::join!(backend.current_session(), backend.current_session());
        assert_eq!(first.unwrap(), Some(token.clone()));
        assert_eq!(second.unwrap(), Some(token.clone()));

        // Later changes to the file are not picked up again.
        file.clear().await.unwrap();
        assert_eq!(backend.current_session().await.unwrap(), Some(token));
    }

    #[tokio::test]
    async fn test_expired_session_without_refresh_token_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let file = SessionFile::new(dir.path().join("session.json"));
        let token = SessionToken {
            access_token: "at".into(),
            refresh_token: None,
            user: AuthUser {
                id: "u1".into(),
                email: "a@b.com".into(),
                metadata: Map::new(),
            },
            expires_at: Utc::now() - ChronoDuration::hours(1),
        };
        file.store(&token).await.unwrap();

        let backend = backend().with_session_file(file.clone());
        let mut changes = backend.session_changes();

        assert_eq!(backend.current_session().await.unwrap(), None);
        assert_eq!(changes.recv().await.unwrap(), AuthChange::Expired);
        assert!(file.load().await.is_none());
    }
}
