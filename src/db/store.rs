//! Persistence contract consumed by the authentication core.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::reset_token::{NewResetToken, ResetTokenRecord};
use super::user::{NewUser, User, UserChange};
use crate::context::{Context, Interrupted};

/// Errors reported by a [`CredentialStore`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No matching row.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A unique column already holds the value. Carries the column name.
    #[error("{0} already exists")]
    Conflict(String),

    /// The backend failed.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The caller's deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The caller canceled.
    #[error("canceled")]
    Canceled,
}

impl From<Interrupted> for StoreError {
    fn from(e: Interrupted) -> Self {
        match e {
            Interrupted::DeadlineExceeded => StoreError::DeadlineExceeded,
            Interrupted::Canceled => StoreError::Canceled,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::Conflict(conflicting_column(db_err.message()))
            }
            _ => StoreError::Unavailable(e.to_string()),
        }
    }
}

/// Pull the column out of a message like `UNIQUE constraint failed: users.email`.
fn conflicting_column(message: &str) -> String {
    message
        .rsplit_once('.')
        .map(|(_, column)| column.trim().to_string())
        .filter(|column| !column.is_empty())
        .unwrap_or_else(|| "record".to_string())
}

/// Durable storage for users and password reset tokens.
///
/// Every call is bounded by the supplied [`Context`] and returns
/// `DeadlineExceeded` or `Canceled` when it is interrupted.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a user. `Conflict` if the login or email is taken.
    async fn save_user(&self, ctx: &Context, user: &NewUser) -> Result<i64, StoreError>;

    /// Find a user whose login or email equals `identifier`. A login match
    /// wins over an email match.
    async fn find_user(&self, ctx: &Context, identifier: &str) -> Result<User, StoreError>;

    /// Apply `changes` to user `id`. `NotFound` if no such user.
    async fn update_user(
        &self,
        ctx: &Context,
        id: i64,
        changes: &[UserChange],
    ) -> Result<(), StoreError>;

    /// Persist a reset token and return its row ID.
    async fn save_reset_token(&self, ctx: &Context, token: &NewResetToken)
        -> Result<i64, StoreError>;

    /// Look up a reset token by digest.
    async fn find_reset_token(
        &self,
        ctx: &Context,
        token_digest: &str,
    ) -> Result<ResetTokenRecord, StoreError>;

    /// Delete a reset token. `NotFound` if nothing was deleted.
    async fn delete_reset_token(&self, ctx: &Context, id: i64) -> Result<(), StoreError>;

    /// Delete reset tokens that expired before `now`. Returns the count.
    async fn delete_expired_reset_tokens(
        &self,
        ctx: &Context,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflicting_column() {
        assert_eq!(
            conflicting_column("UNIQUE constraint failed: users.email"),
            "email"
        );
        assert_eq!(
            conflicting_column("UNIQUE constraint failed: users.login"),
            "login"
        );
        assert_eq!(conflicting_column("constraint failed"), "record");
    }

    #[test]
    fn test_interrupted_conversion() {
        assert_eq!(
            StoreError::from(Interrupted::DeadlineExceeded),
            StoreError::DeadlineExceeded
        );
        assert_eq!(StoreError::from(Interrupted::Canceled), StoreError::Canceled);
    }

    #[test]
    fn test_row_not_found_is_unavailable() {
        assert!(matches!(
            StoreError::from(sqlx::Error::RowNotFound),
            StoreError::Unavailable(_)
        ));
    }
}
