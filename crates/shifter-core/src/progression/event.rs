use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ShifterError};

/// A single score increment, applied atomically to a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionEvent {
    pub amount: u64,
    pub timestamp: DateTime<Utc>,
    /// Free-form origin of the award (e.g. "ritual_completed").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ProgressionEvent {
    /// Validates `amount > 0` and stamps the event with the current time.
    pub fn new(amount: i64, reason: Option<String>) -> Result<Self> {
        if amount <= 0 {
            return Err(ShifterError::InvalidAmount(amount));
        }
        Ok(Self {
            amount: amount as u64,
            timestamp: Utc::now(),
            reason,
        })
    }
}

/// Result of a successful score award.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionOutcome {
    pub event: ProgressionEvent,
    pub previous_score: u64,
    pub score: u64,
    pub level: u32,
    pub title: String,
    pub leveled_up: bool,
}

/// Progression view of the current user, published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressionSnapshot {
    pub user_id: String,
    pub score: u64,
    pub level: u32,
    pub title: String,
    /// Score needed for the next tier; `None` at the top tier.
    pub next_tier_at: Option<u64>,
}
