//! Password reset token records.
//!
//! Only the SHA-256 digest of a reset token is stored; the raw value is handed
//! to the user once and never persisted.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

/// A stored reset token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetTokenRecord {
    /// Row ID.
    pub id: i64,
    /// Owner of the token.
    pub user_id: i64,
    /// Hex SHA-256 digest of the raw token.
    pub token_digest: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Expiration timestamp.
    pub expires_at: DateTime<Utc>,
}

impl ResetTokenRecord {
    /// Whether the token can no longer be redeemed at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

fn timestamp_column(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    let secs: i64 = row.try_get(column)?;
    DateTime::from_timestamp(secs, 0).ok_or_else(|| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("timestamp out of range: {secs}").into(),
    })
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for ResetTokenRecord {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(ResetTokenRecord {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            token_digest: row.try_get("token_digest")?,
            created_at: timestamp_column(row, "created_at")?,
            expires_at: timestamp_column(row, "expires_at")?,
        })
    }
}

/// New reset token for creation.
#[derive(Debug, Clone)]
pub struct NewResetToken {
    /// Owner of the token.
    pub user_id: i64,
    /// Hex SHA-256 digest of the raw token.
    pub token_digest: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Expiration timestamp.
    pub expires_at: DateTime<Utc>,
}
