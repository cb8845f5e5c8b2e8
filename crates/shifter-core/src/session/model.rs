//! Session domain model.

use serde::{Deserialize, Serialize};

use crate::backend::SessionToken;
use crate::error::ShifterError;
use crate::user::UserProfile;

/// Authentication lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SessionStatus {
    #[default]
    Anonymous,
    /// Transient: only observed while initialize/sign-in/sign-up is in flight.
    Authenticating,
    Authenticated,
    /// Session restore failed; `initialize` again to retry.
    Error,
}

/// Who the current user is.
///
/// `token` and `profile` are present exactly when `status` is
/// [`SessionStatus::Authenticated`]. Construct through the associated
/// functions to keep that invariant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<SessionToken>,
    pub profile: Option<UserProfile>,
    /// Most recent failure of a session operation, cleared on success.
    pub last_error: Option<ShifterError>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticating() -> Self {
        Self {
            status: SessionStatus::Authenticating,
            ..Self::default()
        }
    }

    pub fn authenticated(token: SessionToken, profile: UserProfile) -> Self {
        Self {
            status: SessionStatus::Authenticated,
            token: Some(token),
            profile: Some(profile),
            last_error: None,
        }
    }

    pub fn failed(error: ShifterError) -> Self {
        Self {
            status: SessionStatus::Error,
            last_error: Some(error),
            ..Self::default()
        }
    }

    /// Returns this session with `last_error` replaced.
    pub fn with_error(mut self, error: ShifterError) -> Self {
        self.last_error = Some(error);
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == SessionStatus::Authenticated
    }

    pub fn is_loading(&self) -> bool {
        self.status == SessionStatus::Authenticating
    }

    pub fn user_id(&self) -> Option<&str> {
        self.token.as_ref().map(SessionToken::user_id)
    }
}
