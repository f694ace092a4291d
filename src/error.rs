//! Error types for warden.

use thiserror::Error;

use crate::auth::KeyError;
use crate::context::Interrupted;
use crate::db::StoreError;

/// Errors returned by the authentication use cases.
///
/// Every operation on [`AuthService`](crate::AuthService) reports failure through
/// one of these kinds so callers can map them onto their own transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// A required input was missing or empty.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown user or wrong password.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// A uniqueness constraint (login, email) was violated.
    #[error("{0} already exists")]
    Conflict(String),

    /// The referenced session or reset token does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// A token or reset token is past its expiry.
    #[error("{0} expired")]
    Expired(String),

    /// The token's not-before time is in the future.
    #[error("token not yet valid")]
    NotYetValid,

    /// No live session for the supplied token.
    #[error("unauthenticated")]
    Unauthenticated,

    /// The signing key could not produce a token.
    #[error("signing error: {0}")]
    SigningError(String),

    /// Signature verification failed or the token declares a foreign algorithm.
    #[error("invalid token signature")]
    SignatureInvalid,

    /// The token could not be decoded.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// A collaborator (store, cache, hasher) failed.
    #[error("{op} unavailable: {reason}")]
    Unavailable {
        /// Operation that failed.
        op: &'static str,
        /// Underlying cause.
        reason: String,
    },

    /// The caller's deadline passed before the operation finished.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The caller canceled the operation.
    #[error("operation canceled")]
    Canceled,
}

impl AuthError {
    /// Build an `Unavailable` error for the named operation.
    pub fn unavailable(op: &'static str, reason: impl ToString) -> Self {
        AuthError::Unavailable {
            op,
            reason: reason.to_string(),
        }
    }

    /// Returns a mapper from a store failure to an `AuthError` tagged with `op`.
    ///
    /// ```
    /// use warden::{AuthError, StoreError};
    ///
    /// let err = AuthError::store("find_user")(StoreError::Unavailable("disk full".into()));
    /// assert_eq!(err.to_string(), "find_user unavailable: disk full");
    /// ```
    pub fn store(op: &'static str) -> impl FnOnce(StoreError) -> AuthError {
        move |e| match e {
            StoreError::NotFound(what) => AuthError::NotFound(what.to_string()),
            StoreError::Conflict(what) => AuthError::Conflict(what),
            StoreError::Unavailable(reason) => AuthError::Unavailable { op, reason },
            StoreError::DeadlineExceeded => AuthError::DeadlineExceeded,
            StoreError::Canceled => AuthError::Canceled,
        }
    }
}

impl From<Interrupted> for AuthError {
    fn from(e: Interrupted) -> Self {
        match e {
            Interrupted::DeadlineExceeded => AuthError::DeadlineExceeded,
            Interrupted::Canceled => AuthError::Canceled,
        }
    }
}

/// Process-level error type used while bootstrapping the service.
#[derive(Error, Debug)]
pub enum WardenError {
    /// Database error (connection, migration).
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Signing key could not be loaded or created.
    #[error("signing key error: {0}")]
    Key(#[from] KeyError),

    /// Authentication use-case error.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl From<sqlx::Error> for WardenError {
    fn from(e: sqlx::Error) -> Self {
        WardenError::Database(e.to_string())
    }
}

/// Result type alias for warden bootstrap operations.
pub type Result<T> = std::result::Result<T, WardenError>;
