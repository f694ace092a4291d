//! Password reset tokens.
//!
//! A reset token is 32 random bytes, hex encoded, handed to the user once.
//! Only its SHA-256 digest is stored. Redeeming a token updates the password
//! hash and then deletes the token; the two steps are not atomic, and if the
//! delete fails the token stays until it expires and the sweep removes it.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand_core::{OsRng, RngCore};
use tracing::{debug, info, warn};

use super::token::sha256_hex;
use crate::clock::SharedClock;
use crate::context::Context;
use crate::db::{CredentialStore, NewResetToken, User, UserChange};
use crate::task::{spawn_periodic, BackgroundTask};
use crate::AuthError;

/// Number of random bytes in a reset token.
pub const RESET_TOKEN_BYTES: usize = 32;

/// Upper bound on one sweep of the reset token table.
const SWEEP_TIMEOUT: Duration = Duration::from_secs(30);

/// A newly issued reset token, including the raw value to deliver.
#[derive(Clone, PartialEq, Eq)]
pub struct ResetToken {
    /// Row ID.
    pub id: i64,
    /// Owner of the token.
    pub user_id: i64,
    /// Raw token (hex). Not persisted.
    pub token: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Expiration timestamp.
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for ResetToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResetToken")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Generate a fresh random reset token.
fn generate_token() -> String {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Marks a digest as being redeemed until dropped.
struct Claim<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    digest: String,
}

impl<'a> Claim<'a> {
    fn acquire(in_flight: &'a Mutex<HashSet<String>>, digest: String) -> Option<Self> {
        let mut set = in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(digest.clone()) {
            return None;
        }
        Some(Self { in_flight, digest })
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.digest);
    }
}

/// Issues and redeems password reset tokens.
pub struct ResetTokenFlow {
    store: Arc<dyn CredentialStore>,
    clock: SharedClock,
    window: Duration,
    in_flight: Mutex<HashSet<String>>,
}

impl fmt::Debug for ResetTokenFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResetTokenFlow")
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

impl ResetTokenFlow {
    /// Create a flow whose tokens stay redeemable for `window`.
    pub fn new(store: Arc<dyn CredentialStore>, window: Duration, clock: SharedClock) -> Self {
        Self {
            store,
            clock,
            window,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Redemption window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Issue and persist a reset token for `user`.
    pub async fn begin(&self, ctx: &Context, user: &User) -> Result<ResetToken, AuthError> {
        let window = chrono::Duration::from_std(self.window)
            .map_err(|_| AuthError::InvalidArgument("reset window out of range".to_string()))?;

        // Stored at second precision; truncate so the returned value matches.
        let now = self.clock.now();
        let created_at = DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now);
        let expires_at = created_at + window;

        let token = generate_token();
        let record = NewResetToken {
            user_id: user.id,
            token_digest: sha256_hex(&token),
            created_at,
            expires_at,
        };

        let id = self
            .store
            .save_reset_token(ctx, &record)
            .await
            .map_err(AuthError::store("save_reset_token"))?;

        info!(user_id = user.id, reset_id = id, "Issued password reset token");
        Ok(ResetToken {
            id,
            user_id: user.id,
            token,
            created_at,
            expires_at,
        })
    }

    /// Redeem `token`, setting the owner's password hash to `new_password_hash`.
    ///
    /// Returns the ID of the user whose password changed.
    pub async fn redeem(
        &self,
        ctx: &Context,
        token: &str,
        new_password_hash: String,
    ) -> Result<i64, AuthError> {
        if token.is_empty() {
            return Err(AuthError::InvalidArgument("reset token is required".to_string()));
        }

        let digest = sha256_hex(token);
        let Some(_claim) = Claim::acquire(&self.in_flight, digest.clone()) else {
            debug!("Reset token is already being redeemed");
            return Err(AuthError::NotFound("reset token".to_string()));
        };

        let record = self
            .store
            .find_reset_token(ctx, &digest)
            .await
            .map_err(AuthError::store("find_reset_token"))?;

        if record.is_expired_at(self.clock.now()) {
            info!(user_id = record.user_id, reset_id = record.id, "Reset token expired");
            return Err(AuthError::Expired("reset token".to_string()));
        }

        self.store
            .update_user(
                ctx,
                record.user_id,
                &[UserChange::PasswordHash(new_password_hash)],
            )
            .await
            .map_err(AuthError::store("update_user"))?;

        if let Err(e) = self.store.delete_reset_token(ctx, record.id).await {
            warn!(
                user_id = record.user_id,
                reset_id = record.id,
                error = %e,
                "Password updated but reset token was not deleted"
            );
            return Err(AuthError::store("delete_reset_token")(e));
        }

        info!(user_id = record.user_id, "Password reset completed");
        Ok(record.user_id)
    }

    /// Delete every reset token that has expired. Returns the count.
    pub async fn sweep_expired(&self, ctx: &Context) -> Result<u64, AuthError> {
        self.store
            .delete_expired_reset_tokens(ctx, self.clock.now())
            .await
            .map_err(AuthError::store("delete_expired_reset_tokens"))
    }

    /// Start a background task that runs [`sweep_expired`](Self::sweep_expired)
    /// every `interval`.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) -> BackgroundTask {
        let flow = Arc::clone(self);
        spawn_periodic("reset-token-sweep", interval, move || {
            let flow = Arc::clone(&flow);
            async move {
                let ctx = Context::with_timeout(SWEEP_TIMEOUT);
                match flow.sweep_expired(&ctx).await {
                    Ok(0) => debug!("No expired reset tokens to clean up"),
                    Ok(count) => info!(deleted_count = count, "Cleaned up expired reset tokens"),
                    Err(e) => warn!(error = %e, "Failed to cleanup reset tokens"),
                }
            }
        })
    }
}
