//! Authentication capability of the backend service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::error::AuthError;

/// Metadata key holding the display name chosen at sign-up.
pub const DISPLAY_NAME_KEY: &str = "display_name";

/// Identity attached to a session by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    /// User metadata supplied at sign-up.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl AuthUser {
    pub fn display_name(&self) -> Option<&str> {
        self.metadata
            .get(DISPLAY_NAME_KEY)
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty())
    }
}

/// Opaque session handle issued by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: AuthUser,
    pub expires_at: DateTime<Utc>,
}

impl SessionToken {
    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Pushed notification about a session change the client did not initiate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthChange {
    SignedIn { token: SessionToken },
    TokenRefreshed { token: SessionToken },
    SignedOut,
    Expired,
}

/// Authentication operations the session store relies on.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Checks credentials and opens a session.
    async fn sign_in(&self, email: &str, password: &str) -> Result<SessionToken, AuthError>;

    /// Creates an account and opens a session for it.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Map<String, Value>,
    ) -> Result<SessionToken, AuthError>;

    /// Returns the persisted session, if one is still valid.
    async fn current_session(&self) -> Result<Option<SessionToken>, AuthError>;

    /// Revokes the current session.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Stream of externally triggered session changes.
    fn session_changes(&self) -> broadcast::Receiver<AuthChange>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with(metadata: Value) -> AuthUser {
        AuthUser {
            id: "u1".into(),
            email: "a@b.com".into(),
            metadata: metadata.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_display_name_from_metadata() {
        let user = user_with(serde_json::json!({ "display_name": "Ana" }));
        assert_eq!(user.display_name(), Some("Ana"));
    }

    #[test]
    fn test_blank_display_name_is_ignored() {
        let user = user_with(serde_json::json!({ "display_name": "  " }));
        assert_eq!(user.display_name(), None);
        assert_eq!(user_with(serde_json::json!({})).display_name(), None);
    }

    #[test]
    fn test_auth_change_tagging() {
        let json = serde_json::to_value(AuthChange::Expired).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "expired" }));
    }
}
