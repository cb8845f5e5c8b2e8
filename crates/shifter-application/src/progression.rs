//! Progression (XP) store.
//!
//! The score lives on the signed-in user's profile; this store only awards
//! points and derives level and title from it. Nothing is cached here, so
//! reads always agree with the session store.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch::{self, error::RecvError};
use tokio::sync::Mutex;

use shifter_core::backend::RowStorage;
use shifter_core::progression::{
    ProgressionEvent, ProgressionOutcome, ProgressionSnapshot, ProgressionTable,
};
use shifter_core::session::Session;
use shifter_core::user::UserProfile;
use shifter_core::{Result, ShifterError};
use shifter_infrastructure::dto::{profile_from_record, progression_patch};

use crate::analytics::ANALYTICS_TARGET;
use crate::session::SessionStore;

/// Awards progression points to the signed-in user.
///
/// Awards are serialized: each one reads the score left by the previous one,
/// persists the new total, and only then updates local state. A failed write
/// leaves score, level and title exactly as they were.
pub struct ProgressionStore {
    session: Arc<SessionStore>,
    rows: Arc<dyn RowStorage>,
    table: ProgressionTable,
    gate: Mutex<()>,
}

impl ProgressionStore {
    /// Creates a store writing through the session store's row storage,
    /// using its tier table.
    pub fn new(session: Arc<SessionStore>) -> Self {
        let rows = session.rows().clone();
        let table = session.progression_table().clone();
        Self {
            session,
            rows,
            table,
            gate: Mutex::new(()),
        }
    }

    pub fn table(&self) -> &ProgressionTable {
        &self.table
    }

    /// Adds `amount` points to the signed-in user's score.
    ///
    /// # Errors
    ///
    /// - `InvalidAmount` if `amount <= 0` (checked first, nothing is sent)
    /// - `NotAuthenticated` if nobody is signed in, or the user signed out
    ///   while the write was in flight
    /// - `Storage` if the write fails; local state is unchanged
    pub async fn add_score(&self, amount: i64) -> Result<ProgressionOutcome> {
        self.add_score_with_reason(amount, None).await
    }

    /// Same as [`add_score`](Self::add_score), recording why the points were
    /// awarded (e.g. "ritual_completed").
    pub async fn add_score_with_reason(
        &self,
        amount: i64,
        reason: Option<String>,
    ) -> Result<ProgressionOutcome> {
        let event = ProgressionEvent::new(amount, reason)?;
        if !self.session.is_authenticated() {
            return Err(ShifterError::NotAuthenticated);
        }

        let _guard = self.gate.lock().await;
        // Re-read after waiting: an earlier award or a sign-out may have landed.
        let profile = self
            .session
            .profile()
            .filter(|_| self.session.is_authenticated())
            .ok_or(ShifterError::NotAuthenticated)?;

        let previous_score = profile.progression_score;
        let score = previous_score
            .checked_add(event.amount)
            .ok_or(ShifterError::InvalidAmount(amount))?;

        // Never stamp the row older than the copy it was computed from.
        let stamped = Utc::now().max(profile.updated_at);
        let patch = progression_patch(score, &self.table, stamped);
        let stored = match self
            .rows
            .update(self.session.profile_table(), &profile.id, patch)
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(
                    user_id = %profile.id,
                    amount,
                    error = %e,
                    "Score update failed; local score unchanged"
                );
                return Err(e.into());
            }
        };

        let updated = profile_from_record(stored).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Unreadable profile row after score update");
            UserProfile {
                progression_score: score,
                updated_at: stamped,
                ..profile.clone()
            }
        });

        if !self.session.replace_profile(updated.clone()) {
            tracing::warn!(
                user_id = %updated.id,
                score = updated.progression_score,
                "Score stored but the session changed before it could be applied"
            );
            return Err(ShifterError::NotAuthenticated);
        }

        let previous_level = self.table.level_for(previous_score);
        let level = self.table.level_for(updated.progression_score);
        let title = self.table.title_for(updated.progression_score).to_string();
        let leveled_up = level > previous_level;

        tracing::debug!(user_id = %updated.id, amount, score = updated.progression_score, "Score awarded");
        if leveled_up {
            tracing::info!(
                target: ANALYTICS_TARGET,
                event = "level_up",
                user_id = %updated.id,
                level,
                title = %title,
                score = updated.progression_score,
                "Reached a new level"
            );
        }

        Ok(ProgressionOutcome {
            previous_score,
            score: updated.progression_score,
            level,
            title,
            leveled_up,
            event,
        })
    }

    pub fn current_score(&self) -> Option<u64> {
        self.session.profile().map(|p| p.progression_score)
    }

    pub fn current_level(&self) -> Option<u32> {
        self.session.profile().map(|p| p.level(&self.table))
    }

    pub fn current_title(&self) -> Option<String> {
        self.session
            .profile()
            .map(|p| p.title(&self.table).to_string())
    }

    pub fn snapshot(&self) -> Option<ProgressionSnapshot> {
        snapshot_of(self.session.profile().as_ref(), &self.table)
    }

    /// Follows the signed-in user's progression through every session
    /// change: awards, refreshes, sign-in, sign-out and restore.
    pub fn subscribe(&self) -> ProgressionUpdates {
        let session = self.session.subscribe();
        let seen = snapshot_of(session.borrow().profile.as_ref(), &self.table);
        ProgressionUpdates {
            session,
            table: self.table.clone(),
            seen,
        }
    }
}

/// Progression view over the session feed.
///
/// Only wakes when the derived snapshot differs from the last one seen, so a
/// token refresh does not count as a change.
pub struct ProgressionUpdates {
    session: watch::Receiver<Session>,
    table: ProgressionTable,
    seen: Option<ProgressionSnapshot>,
}

impl ProgressionUpdates {
    /// Latest snapshot, without marking it seen.
    pub fn latest(&self) -> Option<ProgressionSnapshot> {
        snapshot_of(self.session.borrow().profile.as_ref(), &self.table)
    }

    pub fn borrow_and_update(&mut self) -> Option<ProgressionSnapshot> {
        let snapshot = snapshot_of(self.session.borrow_and_update().profile.as_ref(), &self.table);
        self.seen = snapshot.clone();
        snapshot
    }

    /// # Errors
    ///
    /// Fails once the session store is gone.
    pub fn has_changed(&self) -> std::result::Result<bool, RecvError> {
        if !self.session.has_changed()? {
            return Ok(false);
        }
        Ok(self.latest() != self.seen)
    }

    /// Waits for the next snapshot that differs from the last one seen.
    ///
    /// # Errors
    ///
    /// Fails once the session store is gone.
    pub async fn changed(&mut self) -> std::result::Result<(), RecvError> {
        loop {
            self.session.changed().await?;
            let next = snapshot_of(self.session.borrow_and_update().profile.as_ref(), &self.table);
            if next != self.seen {
                self.seen = next;
                return Ok(());
            }
        }
    }
}

fn snapshot_of(
    profile: Option<&UserProfile>,
    table: &ProgressionTable,
) -> Option<ProgressionSnapshot> {
    profile.map(|profile| {
        let tier = table.tier_for(profile.progression_score);
        ProgressionSnapshot {
            user_id: profile.id.clone(),
            score: profile.progression_score,
            level: tier.level,
            title: tier.title.clone(),
            next_tier_at: table
                .next_tier(profile.progression_score)
                .map(|next| next.min_score),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory_store, YieldingRows};
    use serde_json::{Map, Value};
    use shifter_core::backend::AuthChange;
    use shifter_core::config::DEFAULT_PROFILE_TABLE;
    use shifter_core::StorageError;
    use shifter_infrastructure::InMemoryBackend;

    async fn signed_in() -> (InMemoryBackend, Arc<SessionStore>, ProgressionStore) {
        let (backend, session) = memory_store();
        session
            .sign_up("luna@moon.io", "secret-1", "Luna")
            .await
            .unwrap();
        let progression = ProgressionStore::new(session.clone());
        (backend, session, progression)
    }

    #[tokio::test]
    async fn test_rejects_non_positive_amounts_before_auth() {
        let (_backend, session) = memory_store();
        let progression = ProgressionStore::new(session);

        assert_eq!(
            progression.add_score(0).await.unwrap_err(),
            ShifterError::InvalidAmount(0)
        );
        assert_eq!(
            progression.add_score(10).await.unwrap_err(),
            ShifterError::NotAuthenticated
        );
        assert_eq!(progression.current_score(), None);
    }

    #[tokio::test]
    async fn test_award_updates_score_and_level() {
        let (backend, session, progression) = signed_in().await;

        let outcome = progression.add_score(150).await.unwrap();

        assert_eq!(outcome.previous_score, 0);
        assert_eq!(outcome.score, 150);
        assert_eq!(outcome.level, 1);
        assert_eq!(outcome.title, "Initiate");
        assert!(outcome.leveled_up);
        assert_eq!(progression.current_score(), Some(150));
        assert_eq!(progression.current_level(), Some(1));
        assert_eq!(session.profile().unwrap().progression_score, 150);

        let user_id = session.user_id().unwrap();
        let row = backend
            .rows()
            .get(DEFAULT_PROFILE_TABLE, &user_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["progression_score"], 150);
        assert_eq!(row["title"], "Initiate");
    }

    #[tokio::test]
    async fn test_award_within_tier_is_not_a_level_up() {
        let (_backend, _session, progression) = signed_in().await;
        progression.add_score(10).await.unwrap();

        let outcome = progression.add_score(20).await.unwrap();

        assert!(!outcome.leveled_up);
        assert_eq!(progression.current_title().as_deref(), Some("Seeker"));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_state_untouched() {
        let (backend, session, progression) = signed_in().await;
        progression.add_score(50).await.unwrap();
        let mut updates = progression.subscribe();
        let before = session.current();

        backend.set_offline(true);
        let err = progression.add_score(500).await.unwrap_err();

        assert!(matches!(err, ShifterError::Storage(StorageError::Network(_))));
        assert_eq!(progression.current_score(), Some(50));
        assert_eq!(progression.current_level(), Some(0));
        assert_eq!(session.current(), before);
        assert!(!updates.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_awards_are_not_lost() {
        let backend = InMemoryBackend::new();
        let session = Arc::new(SessionStore::new(
            backend.auth(),
            Arc::new(YieldingRows::new(backend.rows())),
        ));
        session
            .sign_up("luna@moon.io", "secret-1", "")
            .await
            .unwrap();
        let progression = ProgressionStore::new(session.clone());

        let (first, second) = tokio::join!(progression.add_score(30), progression.add_score(45));
        first.unwrap();
        second.unwrap();

        assert_eq!(progression.current_score(), Some(75));
        let row = backend
            .rows()
            .get(DEFAULT_PROFILE_TABLE, &session.user_id().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["progression_score"], 75);
    }

    #[tokio::test]
    async fn test_snapshot_published_after_award() {
        let (_backend, _session, progression) = signed_in().await;
        let mut updates = progression.subscribe();

        progression.add_score(320).await.unwrap();

        assert!(updates.has_changed().unwrap());
        let snapshot = updates.borrow_and_update().unwrap();
        assert_eq!(snapshot.score, 320);
        assert_eq!(snapshot.level, 2);
        assert_eq!(snapshot.title, "Apprentice");
        assert_eq!(snapshot.next_tier_at, Some(600));
        assert_eq!(progression.snapshot(), Some(snapshot));
    }

    #[tokio::test]
    async fn test_sign_out_clears_reads() {
        let (_backend, session, progression) = signed_in().await;
        progression.add_score(100).await.unwrap();

        session.sign_out().await;

        assert_eq!(progression.current_level(), None);
        assert_eq!(
            progression.add_score(5).await.unwrap_err(),
            ShifterError::NotAuthenticated
        );
    }

    #[tokio::test]
    async fn test_newer_remote_timestamp_does_not_lose_awards() {
        let (backend, session, progression) = signed_in().await;
        let user_id = session.user_id().unwrap();
        let mut patch = Map::new();
        patch.insert(
            "updated_at".into(),
            Value::from((Utc::now() + chrono::Duration::seconds(60)).to_rfc3339()),
        );
        backend
            .rows()
            .update(DEFAULT_PROFILE_TABLE, &user_id, patch)
            .await
            .unwrap();
        session.refresh_profile().await.unwrap();

        let first = progression.add_score(100).await.unwrap();
        assert_eq!(first.score, 100);
        assert_eq!(progression.current_score(), Some(100));
        progression.add_score(50).await.unwrap();

        assert_eq!(progression.current_score(), Some(150));
        let row = backend
            .rows()
            .get(DEFAULT_PROFILE_TABLE, &user_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["progression_score"], 150);
    }

    #[tokio::test]
    async fn test_subscribers_follow_session_changes() {
        let (_backend, session) = memory_store();
        let progression = ProgressionStore::new(session.clone());
        let mut updates = progression.subscribe();
        assert_eq!(updates.latest(), None);

        session
            .sign_up("luna@moon.io", "secret-1", "")
            .await
            .unwrap();
        assert!(updates.has_changed().unwrap());
        assert_eq!(updates.borrow_and_update().unwrap().score, 0);

        progression.add_score(100).await.unwrap();
        assert_eq!(updates.borrow_and_update().unwrap().score, 100);

        session.sign_out().await;
        assert!(updates.has_changed().unwrap());
        assert_eq!(updates.borrow_and_update(), None);
    }

    #[tokio::test]
    async fn test_token_refresh_is_not_a_progression_change() {
        let (_backend, session, progression) = signed_in().await;
        let mut updates = progression.subscribe();

        let mut token = session.current().token.unwrap();
        token.access_token = "rotated".into();
        session
            .handle_auth_change(AuthChange::TokenRefreshed { token })
            .await;
        assert!(!updates.has_changed().unwrap());

        progression.add_score(40).await.unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), updates.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updates.latest().unwrap().score, 40);
    }
}
