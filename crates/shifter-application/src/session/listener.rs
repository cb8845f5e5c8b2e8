use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use shifter_core::backend::{AuthChange, SessionToken};
use shifter_core::session::Session;
use shifter_core::user::ProfileSeed;
use shifter_core::AuthError;

use super::SessionStore;

impl SessionStore {
    /// Applies a session change reported by the identity provider.
    ///
    /// Sign-out and expiry notices are checked against the provider before
    /// acting, so a notice that arrives after a newer sign-in is ignored.
    pub async fn handle_auth_change(&self, change: AuthChange) {
        match change {
            AuthChange::TokenRefreshed { token } => {
                self.replace_token(token);
            }
            AuthChange::SignedIn { token } => {
                if !self.replace_token(token.clone()) {
                    self.adopt(token).await;
                }
            }
            AuthChange::SignedOut => self.end_session(None).await,
            AuthChange::Expired => self.end_session(Some(AuthError::SessionExpired)).await,
        }
    }

    /// Spawns a task that feeds provider notifications into
    /// [`handle_auth_change`](Self::handle_auth_change).
    ///
    /// The task holds only a weak reference and stops once the store is
    /// dropped or the provider closes its channel.
    pub fn spawn_auth_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut changes = self.auth.session_changes();
        let store = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => {
                        let Some(store) = store.upgrade() else {
                            break;
                        };
                        store.handle_auth_change(change).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Auth listener lagged behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("Auth listener stopped");
        })
    }

    /// Swaps in a new token for the signed-in user.
    fn replace_token(&self, token: SessionToken) -> bool {
        self.state.send_if_modified(|session| {
            if !session.is_authenticated() || session.user_id() != Some(token.user_id()) {
                return false;
            }
            session.token = Some(token);
            true
        })
    }

    async fn adopt(&self, token: SessionToken) {
        let _guard = self.gate.lock().await;
        match self
            .load_or_create(ProfileSeed::from_auth_user(&token.user))
            .await
        {
            Ok(profile) => {
                tracing::info!(user_id = %token.user_id(), "Adopted session signed in elsewhere");
                self.state
                    .send_replace(Session::authenticated(token, profile));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load profile for external sign-in");
                self.record_error(e);
            }
        }
    }

    async fn end_session(&self, reason: Option<AuthError>) {
        let _guard = self.gate.lock().await;
        if !self.is_authenticated() {
            return;
        }

        let still_valid = match self.auth.current_session().await {
            Ok(Some(remote)) => self.user_id().as_deref() == Some(remote.user_id()),
            Ok(None) => false,
            Err(e) => {
                tracing::debug!(error = %e, "Could not confirm session state; ending it");
                false
            }
        };
        if still_valid {
            tracing::debug!("Ignoring stale sign-out notice");
            return;
        }

        let mut next = Session::anonymous();
        if let Some(reason) = reason {
            tracing::info!(error = %reason, "Session ended by provider");
            next = next.with_error(reason.into());
        } else {
            tracing::info!("Signed out by provider");
        }
        self.state.send_replace(next);
    }
}
