//! SQLite implementation of [`CredentialStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, SqlitePool};

use super::reset_token::{NewResetToken, ResetTokenRecord};
use super::store::{CredentialStore, StoreError};
use super::user::{NewUser, User, UserChange};
use crate::context::Context;

/// Credential store over a SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a store over `pool`. The pool must already be migrated.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn save_user(&self, ctx: &Context, user: &NewUser) -> Result<i64, StoreError> {
        ctx.run(async {
            let result = sqlx::query(
                "INSERT INTO users (login, email, phone, password_hash, role)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&user.login)
            .bind(&user.email)
            .bind(&user.phone)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .execute(&self.pool)
            .await?;

            Ok(result.last_insert_rowid())
        })
        .await
    }

    async fn find_user(&self, ctx: &Context, identifier: &str) -> Result<User, StoreError> {
        ctx.run(async {
            sqlx::query_as::<_, User>(
                "SELECT id, login, email, phone, password_hash, role
                 FROM users
                 WHERE login = ? OR email = ?
                 ORDER BY CASE WHEN login = ? THEN 0 ELSE 1 END
                 LIMIT 1",
            )
            .bind(identifier)
            .bind(identifier)
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound("user"))
        })
        .await
    }

    async fn update_user(
        &self,
        ctx: &Context,
        id: i64,
        changes: &[UserChange],
    ) -> Result<(), StoreError> {
        if changes.is_empty() {
            return Ok(());
        }

        ctx.run(async {
            let mut query: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new("UPDATE users SET ");
            let mut separated = query.separated(", ");

            for change in changes {
                separated.push(format!("{} = ", change.column()));
                match change {
                    UserChange::Email(email) => separated.push_bind_unseparated(email.clone()),
                    UserChange::Phone(phone) => separated.push_bind_unseparated(phone.clone()),
                    UserChange::PasswordHash(hash) => {
                        separated.push_bind_unseparated(hash.clone())
                    }
                };
            }

            query.push(" WHERE id = ");
            query.push_bind(id);

            let result = query.build().execute(&self.pool).await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound("user"));
            }
            Ok(())
        })
        .await
    }

    async fn save_reset_token(
        &self,
        ctx: &Context,
        token: &NewResetToken,
    ) -> Result<i64, StoreError> {
        ctx.run(async {
            let id: i64 = sqlx::query_scalar(
                "INSERT INTO reset_tokens (user_id, token_digest, created_at, expires_at)
                 VALUES (?, ?, ?, ?) RETURNING id",
            )
            .bind(token.user_id)
            .bind(&token.token_digest)
            .bind(token.created_at.timestamp())
            .bind(token.expires_at.timestamp())
            .fetch_one(&self.pool)
            .await?;

            Ok(id)
        })
        .await
    }

    async fn find_reset_token(
        &self,
        ctx: &Context,
        token_digest: &str,
    ) -> Result<ResetTokenRecord, StoreError> {
        ctx.run(async {
            sqlx::query_as::<_, ResetTokenRecord>(
                "SELECT id, user_id, token_digest, created_at, expires_at
                 FROM reset_tokens WHERE token_digest = ?",
            )
            .bind(token_digest)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound("reset token"))
        })
        .await
    }

    async fn delete_reset_token(&self, ctx: &Context, id: i64) -> Result<(), StoreError> {
        ctx.run(async {
            let result = sqlx::query("DELETE FROM reset_tokens WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await?;

            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound("reset token"));
            }
            Ok(())
        })
        .await
    }

    async fn delete_expired_reset_tokens(
        &self,
        ctx: &Context,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        ctx.run(async {
            let result = sqlx::query("DELETE FROM reset_tokens WHERE expires_at <= ?")
                .bind(now.timestamp())
                .execute(&self.pool)
                .await?;

            Ok(result.rows_affected())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, Role};
    use chrono::Duration;

    async fn setup() -> (Database, SqliteStore) {
        let db = Database::open_in_memory().await.unwrap();
        let store = db.store();
        (db, store)
    }

    fn ctx() -> Context {
        Context::background()
    }

    #[tokio::test]
    async fn test_save_and_find_user() {
        let (_db, store) = setup().await;
        let new_user = NewUser::new("alice", "a@x", "hash").with_phone("+100");

        let id = store.save_user(&ctx(), &new_user).await.unwrap();
        assert!(id > 0);

        let by_login = store.find_user(&ctx(), "alice").await.unwrap();
        assert_eq!(by_login.id, id);
        assert_eq!(by_login.email, "a@x");
        assert_eq!(by_login.phone.as_deref(), Some("+100"));
        assert_eq!(by_login.role, Role::User);

        let by_email = store.find_user(&ctx(), "a@x").await.unwrap();
        assert_eq!(by_email.id, id);
    }

    #[tokio::test]
    async fn test_find_user_not_found() {
        let (_db, store) = setup().await;
        assert_eq!(
            store.find_user(&ctx(), "ghost").await,
            Err(StoreError::NotFound("user"))
        );
    }

    #[tokio::test]
    async fn test_login_match_wins_over_email_match() {
        let (_db, store) = setup().await;
        let first = store
            .save_user(&ctx(), &NewUser::new("bob", "shared", "h1"))
            .await
            .unwrap();
        let second = store
            .save_user(&ctx(), &NewUser::new("shared", "s@x", "h2"))
            .await
            .unwrap();

        assert_eq!(store.find_user(&ctx(), "shared").await.unwrap().id, second);
        assert_eq!(store.find_user(&ctx(), "bob").await.unwrap().id, first);
    }

    #[tokio::test]
    async fn test_duplicate_email_conflict() {
        let (_db, store) = setup().await;
        store
            .save_user(&ctx(), &NewUser::new("bob", "b@x", "h"))
            .await
            .unwrap();

        let err = store
            .save_user(&ctx(), &NewUser::new("bob2", "b@x", "h"))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Conflict("email".to_string()));
    }

    #[tokio::test]
    async fn test_duplicate_login_conflict() {
        let (_db, store) = setup().await;
        store
            .save_user(&ctx(), &NewUser::new("bob", "b@x", "h"))
            .await
            .unwrap();

        let err = store
            .save_user(&ctx(), &NewUser::new("bob", "other@x", "h"))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Conflict("login".to_string()));
    }

    #[tokio::test]
    async fn test_update_user_fields() {
        let (_db, store) = setup().await;
        let id = store
            .save_user(&ctx(), &NewUser::new("carol", "c@x", "old").with_phone("+1"))
            .await
            .unwrap();

        store
            .update_user(
                &ctx(),
                id,
                &[
                    UserChange::Email("carol@x".to_string()),
                    UserChange::Phone(None),
                    UserChange::PasswordHash("new".to_string()),
                ],
            )
            .await
            .unwrap();

        let user = store.find_user(&ctx(), "carol").await.unwrap();
        assert_eq!(user.email, "carol@x");
        assert_eq!(user.phone, None);
        assert_eq!(user.password_hash, "new");
    }

    #[tokio::test]
    async fn test_update_missing_user() {
        let (_db, store) = setup().await;
        let err = store
            .update_user(&ctx(), 999, &[UserChange::Phone(Some("+1".to_string()))])
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound("user"));
    }

    #[tokio::test]
    async fn test_reset_token_lifecycle() {
        let (_db, store) = setup().await;
        let user_id = store
            .save_user(&ctx(), &NewUser::new("dave", "d@x", "h"))
            .await
            .unwrap();

        let now = DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap();
        let id = store
            .save_reset_token(
                &ctx(),
                &NewResetToken {
                    user_id,
                    token_digest: "digest".to_string(),
                    created_at: now,
                    expires_at: now + Duration::hours(24),
                },
            )
            .await
            .unwrap();

        let record = store.find_reset_token(&ctx(), "digest").await.unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.user_id, user_id);
        assert_eq!(record.created_at, now);
        assert_eq!(record.expires_at, now + Duration::hours(24));

        store.delete_reset_token(&ctx(), id).await.unwrap();
        assert_eq!(
            store.delete_reset_token(&ctx(), id).await,
            Err(StoreError::NotFound("reset token"))
        );
        assert_eq!(
            store.find_reset_token(&ctx(), "digest").await,
            Err(StoreError::NotFound("reset token"))
        );
    }

    #[tokio::test]
    async fn test_delete_expired_reset_tokens() {
        let (_db, store) = setup().await;
        let user_id = store
            .save_user(&ctx(), &NewUser::new("erin", "e@x", "h"))
            .await
            .unwrap();
        let now = Utc::now();

        for (digest, expires_at) in [
            ("old", now - Duration::hours(1)),
            ("live", now + Duration::hours(1)),
        ] {
            store
                .save_reset_token(
                    &ctx(),
                    &NewResetToken {
                        user_id,
                        token_digest: digest.to_string(),
                        created_at: now - Duration::hours(25),
                        expires_at,
                    },
                )
                .await
                .unwrap();
        }

        assert_eq!(store.delete_expired_reset_tokens(&ctx(), now).await.unwrap(), 1);
        assert!(store.find_reset_token(&ctx(), "live").await.is_ok());
        assert!(store.find_reset_token(&ctx(), "old").await.is_err());
    }

    #[tokio::test]
    async fn test_expired_context_rejected() {
        let (_db, store) = setup().await;
        let ctx = Context::with_deadline(tokio::time::Instant::now() - std::time::Duration::from_millis(1));

        assert_eq!(
            store.find_user(&ctx, "alice").await,
            Err(StoreError::DeadlineExceeded)
        );
    }
}
