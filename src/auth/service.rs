//! Authentication use cases.
//!
//! [`AuthService`] ties the credential store, password hashing, token issuance,
//! the session cache and the reset flow into the operations exposed to callers.
//! Password hashing runs on the blocking pool and every store call is bounded by
//! the caller's [`Context`].

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::keys::SigningKeys;
use super::password::{PasswordError, PasswordPolicy};
use super::profile::ProfileUpdate;
use super::reset::{ResetToken, ResetTokenFlow};
use super::session::{SessionCache, SessionRecord};
use super::token::{session_key, SignedToken, TokenService};
use crate::cache::CacheError;
use crate::clock::SharedClock;
use crate::config::Config;
use crate::context::Context;
use crate::db::{CredentialStore, NewUser, StoreError, User, UserChange};
use crate::task::BackgroundTask;
use crate::{AuthError, WardenError};

fn require(field: &str, value: &str) -> Result<(), AuthError> {
    if value.trim().is_empty() {
        return Err(AuthError::InvalidArgument(format!("{field} is required")));
    }
    Ok(())
}

/// Background sweeps owned by a running [`AuthService`].
#[derive(Debug)]
pub struct Sweepers {
    sessions: BackgroundTask,
    reset_tokens: BackgroundTask,
}

impl Sweepers {
    /// Stop both sweeps and wait for them to exit.
    pub async fn shutdown(self) {
        self.sessions.shutdown().await;
        self.reset_tokens.shutdown().await;
        info!("Background sweeps stopped");
    }
}

/// The session and credential lifecycle engine.
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    passwords: Arc<PasswordPolicy>,
    decoy_hash: String,
    tokens: TokenService,
    sessions: Arc<SessionCache>,
    resets: Arc<ResetTokenFlow>,
    clock: SharedClock,
    revoke_on_password_change: bool,
    session_sweep_interval: std::time::Duration,
    reset_sweep_interval: std::time::Duration,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("tokens", &self.tokens)
            .field("resets", &self.resets)
            .field("revoke_on_password_change", &self.revoke_on_password_change)
            .finish_non_exhaustive()
    }
}

impl AuthService {
    /// Assemble the service from configuration and its collaborators.
    pub fn new(
        config: &Config,
        store: Arc<dyn CredentialStore>,
        keys: SigningKeys,
        clock: SharedClock,
    ) -> crate::Result<Self> {
        let passwords =
            PasswordPolicy::new(&config.password).map_err(|e| WardenError::Config(e.to_string()))?;
        let decoy_hash = passwords
            .decoy_hash()
            .map_err(|e| WardenError::Config(e.to_string()))?;

        Ok(Self {
            tokens: TokenService::new(keys, config.token.ttl(), clock.clone()),
            sessions: Arc::new(SessionCache::new(
                config.session.default_ttl(),
                clock.clone(),
            )),
            resets: Arc::new(ResetTokenFlow::new(
                store.clone(),
                config.reset.window(),
                clock.clone(),
            )),
            passwords: Arc::new(passwords),
            decoy_hash,
            store,
            clock,
            revoke_on_password_change: config.session.revoke_on_password_change,
            session_sweep_interval: config.session.cleanup_interval(),
            reset_sweep_interval: config.reset.cleanup_interval(),
        })
    }

    /// Start the session cache and reset token sweeps.
    pub fn start_sweepers(&self) -> Sweepers {
        info!(
            session_interval_secs = self.session_sweep_interval.as_secs(),
            reset_interval_secs = self.reset_sweep_interval.as_secs(),
            "Starting background sweeps"
        );
        Sweepers {
            sessions: self.sessions.start_sweeper(self.session_sweep_interval),
            reset_tokens: self.resets.start_sweeper(self.reset_sweep_interval),
        }
    }

    /// The session table.
    pub fn sessions(&self) -> &SessionCache {
        &self.sessions
    }

    /// The token service.
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// The reset token flow.
    pub fn resets(&self) -> &ResetTokenFlow {
        &self.resets
    }

    async fn hash_password(
        &self,
        ctx: &Context,
        password: &str,
    ) -> Result<String, AuthError> {
        let policy = Arc::clone(&self.passwords);
        let password = password.to_string();
        ctx.run(async move {
            tokio::task::spawn_blocking(move || policy.hash(&password))
                .await
                .map_err(|e| AuthError::unavailable("hash_password", e))?
                .map_err(AuthError::from)
        })
        .await
    }

    async fn verify_password(
        &self,
        ctx: &Context,
        password: &str,
        hash: &str,
    ) -> Result<(), AuthError> {
        let policy = Arc::clone(&self.passwords);
        let password = password.to_string();
        let hash = hash.to_string();
        ctx.run(async move {
            tokio::task::spawn_blocking(move || policy.verify(&password, &hash))
                .await
                .map_err(|e| AuthError::unavailable("verify_password", e))?
                .map_err(|e| match e {
                    PasswordError::InvalidHash => {
                        AuthError::unavailable("verify_password", "stored hash is invalid")
                    }
                    other => AuthError::from(other),
                })
        })
        .await
    }

    /// Look up `login` and verify `password` against it.
    ///
    /// An unknown login is verified against the decoy hash and then reported
    /// as `InvalidCredentials`, the same as a wrong password.
    async fn check_credentials(
        &self,
        ctx: &Context,
        login: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        let user = match self.store.find_user(ctx, login).await {
            Ok(user) => user,
            Err(StoreError::NotFound(_)) => {
                match self.verify_password(ctx, password, &self.decoy_hash).await {
                    Ok(()) | Err(AuthError::InvalidCredentials) => {}
                    Err(e) => return Err(e),
                }
                debug!(login = %login, "Unknown login");
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(AuthError::store("find_user")(e)),
        };

        if let Err(e) = self.verify_password(ctx, password, &user.password_hash).await {
            if e == AuthError::InvalidCredentials {
                info!(user_id = user.id, "Wrong password");
            }
            return Err(e);
        }
        Ok(user)
    }

    fn revoke_sessions(&self, user_id: i64) {
        if !self.revoke_on_password_change {
            return;
        }
        match self.sessions.remove_where(|s| s.user_id == user_id) {
            Ok(count) => info!(user_id, revoked = count, "Revoked sessions after password change"),
            Err(e) => warn!(user_id, error = %e, "Failed to revoke sessions"),
        }
    }

    /// Verify credentials and open a session. Returns the token string.
    pub async fn login(
        &self,
        ctx: &Context,
        login: &str,
        password: &str,
    ) -> Result<String, AuthError> {
        require("login", login)?;
        require("password", password)?;

        let user = self.check_credentials(ctx, login, password).await?;

        let signed = self.tokens.issue(&user)?;
        self.track_session(&signed);

        info!(user_id = user.id, "User logged in");
        Ok(signed.token)
    }

    /// Record a session for `signed`. Failures are logged; the token stays valid.
    fn track_session(&self, signed: &SignedToken) {
        let record = SessionRecord::for_token(signed);
        let Some(ttl) = record.remaining(self.clock.now()) else {
            warn!(user_id = signed.user_id, "Token expired before its session was stored");
            return;
        };

        let key = record.key.clone();
        if let Err(e) = self.sessions.set(&key, record, ttl) {
            warn!(user_id = signed.user_id, session_key = %key, error = %e, "Failed to store session");
        } else {
            debug!(user_id = signed.user_id, session_key = %key, "Session stored");
        }
    }

    /// Create a user. Returns the new user ID.
    pub async fn register(
        &self,
        ctx: &Context,
        email: &str,
        login: &str,
        phone: Option<&str>,
        password: &str,
    ) -> Result<i64, AuthError> {
        require("email", email)?;
        require("login", login)?;
        if let Some(phone) = phone {
            require("phone", phone)?;
        }
        self.passwords.validate(password)?;

        let hash = self.hash_password(ctx, password).await?;

        let mut new_user = NewUser::new(login, email, hash);
        if let Some(phone) = phone {
            new_user = new_user.with_phone(phone);
        }

        let id = self
            .store
            .save_user(ctx, &new_user)
            .await
            .map_err(AuthError::store("save_user"))?;

        info!(user_id = id, login = %login, "User registered");
        Ok(id)
    }

    /// End the session for `token`. `NotFound` if it is not tracked.
    pub async fn log_out(&self, ctx: &Context, token: &str) -> Result<(), AuthError> {
        ctx.check()?;
        require("token", token)?;

        let key = session_key(token);
        match self.sessions.delete(&key) {
            Ok(()) => {
                info!(session_key = %key, "User logged out");
                Ok(())
            }
            Err(CacheError::NotFound) => Err(AuthError::NotFound("session".to_string())),
            Err(e) => Err(AuthError::unavailable("log_out", e)),
        }
    }

    /// Replace the password of `login` after checking `old_password`.
    pub async fn change_password(
        &self,
        ctx: &Context,
        login: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        require("login", login)?;
        require("old password", old_password)?;

        let user = self.check_credentials(ctx, login, old_password).await?;

        self.passwords.validate(new_password)?;
        let hash = self.hash_password(ctx, new_password).await?;

        self.store
            .update_user(ctx, user.id, &[UserChange::PasswordHash(hash)])
            .await
            .map_err(AuthError::store("update_user"))?;

        info!(user_id = user.id, "Password changed");
        self.revoke_sessions(user.id);
        Ok(())
    }

    /// Start password recovery for `login`.
    ///
    /// The returned token must be delivered to the user out of band.
    pub async fn forgot_password(
        &self,
        ctx: &Context,
        login: &str,
    ) -> Result<ResetToken, AuthError> {
        require("login", login)?;
        let user = match self.store.find_user(ctx, login).await {
            Ok(user) => user,
            Err(StoreError::NotFound(_)) => {
                debug!(login = %login, "Password reset requested for unknown login");
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(AuthError::store("find_user")(e)),
        };
        self.resets.begin(ctx, &user).await
    }

    /// Finish password recovery with a reset token.
    pub async fn reset_password(
        &self,
        ctx: &Context,
        token: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        require("reset token", token)?;
        self.passwords.validate(new_password)?;

        let hash = self.hash_password(ctx, new_password).await?;
        let user_id = self.resets.redeem(ctx, token, hash).await?;

        self.revoke_sessions(user_id);
        Ok(())
    }

    /// Update the profile of the user owning the session for `token`.
    pub async fn update_user(
        &self,
        ctx: &Context,
        token: &str,
        update: ProfileUpdate,
    ) -> Result<(), AuthError> {
        ctx.check()?;
        let session = self.session_for(token)?;
        let changes = update.into_changes()?;

        self.store
            .update_user(ctx, session.user_id, &changes)
            .await
            .map_err(AuthError::store("update_user"))?;

        info!(user_id = session.user_id, fields = changes.len(), "Profile updated");
        Ok(())
    }

    /// Verify `token` and return its live session.
    ///
    /// Fails with the token error if the signature or time claims are bad, and
    /// with `Unauthenticated` if the session was logged out or evicted.
    pub fn authenticate(&self, token: &str) -> Result<SessionRecord, AuthError> {
        self.tokens.parse(token)?;
        self.session_for(token)
    }

    fn session_for(&self, token: &str) -> Result<SessionRecord, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Unauthenticated);
        }
        self.sessions
            .get(&session_key(token))
            .map_err(|e| AuthError::unavailable("session lookup", e))?
            .ok_or(AuthError::Unauthenticated)
    }
}
