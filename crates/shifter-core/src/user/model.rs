//! UserProfile domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::AuthUser;
use crate::progression::ProgressionTable;

/// Profile of an authenticated user.
///
/// Level and title are not stored: they are computed from
/// `progression_score` through a [`ProgressionTable`] whenever asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub progression_score: u64,
    pub onboarding_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// Fresh profile with score 0.
    pub fn new(seed: ProfileSeed) -> Self {
        let now = Utc::now();
        Self {
            id: seed.user_id,
            email: seed.email,
            display_name: seed.display_name,
            progression_score: 0,
            onboarding_completed: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn level(&self, table: &ProgressionTable) -> u32 {
        table.level_for(self.progression_score)
    }

    pub fn title<'a>(&self, table: &'a ProgressionTable) -> &'a str {
        table.title_for(self.progression_score)
    }
}

/// Values used to create a profile that does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSeed {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
}

impl ProfileSeed {
    /// Seed carrying only the id; email and name are filled with defaults.
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: String::new(),
            display_name: String::new(),
        }
        .with_fallback_name()
    }

    /// Seed derived from the backend identity; the display name falls back to
    /// the email's local part.
    pub fn from_auth_user(user: &AuthUser) -> Self {
        Self {
            user_id: user.id.clone(),
            email: user.email.clone(),
            display_name: user.display_name().unwrap_or_default().to_string(),
        }
        .with_fallback_name()
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self.with_fallback_name()
    }

    fn with_fallback_name(mut self) -> Self {
        if self.display_name.trim().is_empty() {
            self.display_name = match self.email.split_once('@') {
                Some((local, _)) if !local.is_empty() => local.to_string(),
                _ => "Seeker".to_string(),
            };
        }
        self
    }
}
