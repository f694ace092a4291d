//! Session records kept in the session cache.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::token::{session_key, SignedToken};
use crate::cache::TtlCache;
use crate::db::Role;

/// A live login, keyed by the digest of its token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// Hex SHA-256 of the token string.
    pub key: String,
    /// Owner of the session.
    pub user_id: i64,
    /// ID of the token that created the session.
    pub token_id: String,
    /// Role at login time.
    pub role: Role,
    /// When the token became valid.
    pub issued_at: DateTime<Utc>,
    /// When the token stops being valid.
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Build the record for a freshly issued token.
    pub fn for_token(token: &SignedToken) -> Self {
        Self {
            key: session_key(&token.token),
            user_id: token.user_id,
            token_id: token.token_id.clone(),
            role: token.role,
            issued_at: token.not_before,
            expires_at: token.expires_at,
        }
    }

    /// Time left before the token expires, or `None` if it already has.
    ///
    /// Used as the cache TTL so an entry never outlives its token.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        (self.expires_at - now)
            .to_std()
            .ok()
            .filter(|left| !left.is_zero())
    }
}

/// The in-memory session table.
pub type SessionCache = TtlCache<SessionRecord>;
