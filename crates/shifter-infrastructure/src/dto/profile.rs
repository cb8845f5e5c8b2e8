//! Profile row DTO.
//!
//! Maps [`UserProfile`] to and from the backend's `profiles` row. The row
//! carries `level` and `title` for remote readers (leaderboards, other
//! clients), but they are recomputed from `progression_score` on every read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use shifter_core::backend::Record;
use shifter_core::progression::ProgressionTable;
use shifter_core::user::UserProfile;
use shifter_core::StorageError;

/// Profile row as stored remotely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub progression_score: u64,
    /// Denormalized for remote readers; ignored on read.
    #[serde(default)]
    pub level: u32,
    /// Denormalized for remote readers; ignored on read.
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub onboarding_completed: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl ProfileRecord {
    pub fn from_domain(profile: &UserProfile, table: &ProgressionTable) -> Self {
        Self {
            id: profile.id.clone(),
            email: profile.email.clone(),
            display_name: profile.display_name.clone(),
            progression_score: profile.progression_score,
            level: profile.level(table),
            title: profile.title(table).to_string(),
            onboarding_completed: profile.onboarding_completed,
            created_at: profile.created_at,
            updated_at: profile.updated_at,
        }
    }

    pub fn into_domain(self) -> UserProfile {
        UserProfile {
            id: self.id,
            email: self.email,
            display_name: self.display_name,
            progression_score: self.progression_score,
            onboarding_completed: self.onboarding_completed,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn from_record(record: Record) -> Result<Self, StorageError> {
        serde_json::from_value(Value::Object(record))
            .map_err(|e| StorageError::Malformed(format!("profile row: {}", e)))
    }

    pub fn into_record(self) -> Result<Record, StorageError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(StorageError::Malformed(format!(
                "profile row serialized to non-object: {}",
                other
            ))),
            Err(e) => Err(StorageError::Malformed(e.to_string())),
        }
    }
}

/// Decodes a profile row straight into the domain model.
pub fn profile_from_record(record: Record) -> Result<UserProfile, StorageError> {
    ProfileRecord::from_record(record).map(ProfileRecord::into_domain)
}

/// Encodes a profile as a full row for insertion.
pub fn profile_to_record(
    profile: &UserProfile,
    table: &ProgressionTable,
) -> Result<Record, StorageError> {
    ProfileRecord::from_domain(profile, table).into_record()
}

/// Patch written when the score changes: score plus its derived columns.
pub fn progression_patch(score: u64, table: &ProgressionTable, at: DateTime<Utc>) -> Record {
    let mut patch = Record::new();
    patch.insert("progression_score".into(), Value::from(score));
    patch.insert("level".into(), Value::from(table.level_for(score)));
    patch.insert("title".into(), Value::from(table.title_for(score)));
    patch.insert("updated_at".into(), Value::from(at.to_rfc3339()));
    patch
}
