use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

use shifter_core::backend::{AuthService, RowStorage, SessionToken, DISPLAY_NAME_KEY};
use shifter_core::config::DEFAULT_PROFILE_TABLE;
use shifter_core::progression::ProgressionTable;
use shifter_core::session::{Session, SessionStatus};
use shifter_core::user::{ProfileSeed, UserProfile};
use shifter_core::{Result, ShifterError};
use shifter_infrastructure::dto::{profile_from_record, profile_to_record};

/// Owns the current session and its profile.
///
/// `SessionStore` is responsible for:
/// - Restoring a persisted session on startup
/// - Signing in, signing up and signing out
/// - Loading the profile row, creating it on first contact
/// - Publishing every state change to subscribers
///
/// Mutating operations are serialized; reads never wait.
pub struct SessionStore {
    pub(super) auth: Arc<dyn AuthService>,
    rows: Arc<dyn RowStorage>,
    profile_table: String,
    progression: ProgressionTable,
    pub(super) state: watch::Sender<Session>,
    /// Held for the duration of every mutating operation.
    pub(super) gate: Mutex<()>,
}

impl SessionStore {
    /// Creates an anonymous store over the given backend ports.
    ///
    /// # Arguments
    ///
    /// * `auth` - Identity provider
    /// * `rows` - Storage holding the profile table
    pub fn new(auth: Arc<dyn AuthService>, rows: Arc<dyn RowStorage>) -> Self {
        let (state, _) = watch::channel(Session::anonymous());
        Self {
            auth,
            rows,
            profile_table: DEFAULT_PROFILE_TABLE.to_string(),
            progression: ProgressionTable::default(),
            state,
            gate: Mutex::new(()),
        }
    }

    pub fn with_profile_table(mut self, table: impl Into<String>) -> Self {
        self.profile_table = table.into();
        self
    }

    /// Tier table used for the derived columns of newly created profile rows.
    pub fn with_progression_table(mut self, table: ProgressionTable) -> Self {
        self.progression = table;
        self
    }

    pub fn profile_table(&self) -> &str {
        &self.profile_table
    }

    pub fn progression_table(&self) -> &ProgressionTable {
        &self.progression
    }

    pub(crate) fn rows(&self) -> &Arc<dyn RowStorage> {
        &self.rows
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn current(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.state.borrow().status
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.state.borrow().profile.clone()
    }

    pub fn user_id(&self) -> Option<String> {
        self.state.borrow().user_id().map(str::to_string)
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading()
    }

    pub fn last_error(&self) -> Option<ShifterError> {
        self.state.borrow().last_error.clone()
    }

    /// Receiver that observes every published session.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Restores the session persisted by the identity provider, if any.
    ///
    /// Safe to call again after a failure.
    ///
    /// # Returns
    ///
    /// `Authenticated` when a session was restored and its profile loaded,
    /// `Anonymous` when there was nothing to restore.
    ///
    /// # Errors
    ///
    /// Returns the restore failure; the store is left in `Error` with the
    /// same error recorded as `last_error`.
    pub async fn initialize(&self) -> Result<SessionStatus> {
        let _guard = self.gate.lock().await;
        self.state.send_replace(Session::authenticating());

        match self.restore().await {
            Ok(Some((token, profile))) => {
                tracing::info!(user_id = %token.user_id(), "Session restored");
                self.state
                    .send_replace(Session::authenticated(token, profile));
                Ok(SessionStatus::Authenticated)
            }
            Ok(None) => {
                tracing::debug!("No session to restore");
                self.state.send_replace(Session::anonymous());
                Ok(SessionStatus::Anonymous)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Session restore failed");
                self.state.send_replace(Session::failed(e.clone()));
                Err(e)
            }
        }
    }

    async fn restore(&self) -> Result<Option<(SessionToken, UserProfile)>> {
        let Some(token) = self.auth.current_session().await? else {
            return Ok(None);
        };
        let profile = self
            .load_or_create(ProfileSeed::from_auth_user(&token.user))
            .await?;
        Ok(Some((token, profile)))
    }

    /// Signs in with email and password and loads the profile.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if either credential is blank (nothing is sent)
    /// - `Auth` if the provider rejects the credentials
    /// - `Storage` if the profile cannot be loaded; the fresh remote session
    ///   is revoked again in that case
    ///
    /// When the provider rejects the call, the pre-call session is restored
    /// with the error recorded. Once a token was issued the previous remote
    /// session is gone, so a later profile failure ends in `Anonymous`.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserProfile> {
        require_credentials(email, password)?;

        let _guard = self.gate.lock().await;
        let previous = self.current();
        self.state.send_replace(Session::authenticating());

        let (fallback, result) = match self.auth.sign_in(email.trim(), password).await {
            Ok(token) => (Session::anonymous(), self.establish(token, None).await),
            Err(e) => (previous, Err(e.into())),
        };
        self.settle(fallback, result)
    }

    /// Registers a new account, signs it in and creates its profile.
    ///
    /// An empty `display_name` falls back to the email's local part.
    ///
    /// # Errors
    ///
    /// Same as [`sign_in`](Self::sign_in); an existing account yields
    /// `AuthError::AlreadyRegistered`.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<UserProfile> {
        require_credentials(email, password)?;

        let display_name = display_name.trim();
        let mut metadata = Map::new();
        if !display_name.is_empty() {
            metadata.insert(DISPLAY_NAME_KEY.to_string(), Value::from(display_name));
        }

        let _guard = self.gate.lock().await;
        let previous = self.current();
        self.state.send_replace(Session::authenticating());

        let (fallback, result) = match self.auth.sign_up(email.trim(), password, metadata).await {
            Ok(token) => {
                tracing::info!(user_id = %token.user_id(), "Account registered");
                (Session::anonymous(), self.establish(token, Some(display_name)).await)
            }
            Err(e) => (previous, Err(e.into())),
        };
        self.settle(fallback, result)
    }

    /// Ends the session locally. Remote revocation is best effort: a failure
    /// is logged and the store still ends up `Anonymous`.
    pub async fn sign_out(&self) {
        let _guard = self.gate.lock().await;
        if let Err(e) = self.auth.sign_out().await {
            tracing::warn!(error = %e, "Remote sign-out failed; clearing local session anyway");
        }
        self.state.send_replace(Session::anonymous());
        tracing::info!("Signed out");
    }

    /// Loads the profile for a freshly issued token, revoking the token if
    /// that fails so no half-signed-in state survives.
    async fn establish(
        &self,
        token: SessionToken,
        display_name: Option<&str>,
    ) -> Result<(SessionToken, UserProfile)> {
        let mut seed = ProfileSeed::from_auth_user(&token.user);
        if let Some(name) = display_name.filter(|name| !name.is_empty()) {
            seed = seed.with_display_name(name);
        }

        match self.load_or_create(seed).await {
            Ok(profile) => Ok((token, profile)),
            Err(e) => {
                if let Err(revoke) = self.auth.sign_out().await {
                    tracing::warn!(error = %revoke, "Failed to revoke session after profile load failure");
                }
                Err(e)
            }
        }
    }

    /// Publishes the outcome, falling back to `fallback` with the error
    /// recorded on failure.
    fn settle(
        &self,
        fallback: Session,
        result: Result<(SessionToken, UserProfile)>,
    ) -> Result<UserProfile> {
        match result {
            Ok((token, profile)) => {
                tracing::info!(user_id = %profile.id, "Signed in");
                self.state
                    .send_replace(Session::authenticated(token, profile.clone()));
                Ok(profile)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Authentication failed");
                self.state.send_replace(fallback.with_error(e.clone()));
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Profile
    // ------------------------------------------------------------------

    /// Returns the profile row for `user_id`, creating a default one if it
    /// does not exist yet. Does not change the session.
    ///
    /// # Errors
    ///
    /// Returns `Storage` errors as-is. A `Conflict` means another client
    /// created the row between the read and the insert; it is not retried.
    pub async fn fetch_or_create_profile(&self, user_id: &str) -> Result<UserProfile> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(ShifterError::invalid_input("user id must not be empty"));
        }

        let seed = {
            let session = self.state.borrow();
            match session.token.as_ref() {
                Some(token) if token.user_id() == user_id => {
                    ProfileSeed::from_auth_user(&token.user)
                }
                _ => ProfileSeed::for_user(user_id),
            }
        };
        self.load_or_create(seed).await
    }

    pub(super) async fn load_or_create(&self, seed: ProfileSeed) -> Result<UserProfile> {
        if let Some(record) = self.rows.get(&self.profile_table, &seed.user_id).await? {
            return Ok(profile_from_record(record)?);
        }

        let profile = UserProfile::new(seed);
        let record = profile_to_record(&profile, &self.progression)?;
        let stored = self.rows.insert(&self.profile_table, record).await?;
        tracing::info!(user_id = %profile.id, table = %self.profile_table, "Created profile");
        Ok(profile_from_record(stored)?)
    }

    /// Re-reads the signed-in user's profile row.
    ///
    /// # Returns
    ///
    /// `None` when nobody is signed in.
    ///
    /// # Errors
    ///
    /// A missing row is `StorageError::NotFound`. Failures are also recorded
    /// as `last_error`; the session itself is left unchanged.
    pub async fn refresh_profile(&self) -> Result<Option<UserProfile>> {
        let _guard = self.gate.lock().await;
        let Some(user_id) = self.user_id() else {
            return Ok(None);
        };

        let loaded = match self.rows.get(&self.profile_table, &user_id).await {
            Ok(Some(record)) => profile_from_record(record).map_err(ShifterError::from),
            Ok(None) => Err(shifter_core::StorageError::not_found(&self.profile_table, &user_id).into()),
            Err(e) => Err(e.into()),
        };

        match loaded {
            Ok(profile) => {
                self.apply_profile(profile.clone());
                Ok(Some(profile))
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Profile refresh failed");
                self.record_error(e.clone());
                Err(e)
            }
        }
    }

    /// Replaces the signed-in user's profile with a newer copy.
    ///
    /// Ignored when nobody is signed in, when the profile belongs to another
    /// user, or when it is older than the one already held.
    ///
    /// # Returns
    ///
    /// `true` if the profile was applied and subscribers were notified.
    pub fn apply_profile(&self, profile: UserProfile) -> bool {
        self.state.send_if_modified(|session| {
            if !session.is_authenticated() || session.user_id() != Some(profile.id.as_str()) {
                return false;
            }
            if let Some(current) = &session.profile {
                if current.updated_at > profile.updated_at || *current == profile {
                    return false;
                }
            }
            session.profile = Some(profile);
            true
        })
    }

    /// Installs a row just written for the signed-in user, whatever its
    /// `updated_at`. Returns `false` when the session now belongs to someone
    /// else or to nobody.
    pub(crate) fn replace_profile(&self, profile: UserProfile) -> bool {
        let mut accepted = false;
        self.state.send_if_modified(|session| {
            if !session.is_authenticated() || session.user_id() != Some(profile.id.as_str()) {
                return false;
            }
            accepted = true;
            if session.profile.as_ref() == Some(&profile) {
                return false;
            }
            session.profile = Some(profile);
            true
        });
        accepted
    }

    pub(super) fn record_error(&self, error: ShifterError) {
        self.state.send_modify(|session| session.last_error = Some(error));
    }
}

fn require_credentials(email: &str, password: &str) -> Result<()> {
    if email.trim().is_empty() {
        return Err(ShifterError::invalid_input("email must not be empty"));
    }
    if password.is_empty() {
        return Err(ShifterError::invalid_input("password must not be empty"));
    }
    Ok(())
}
