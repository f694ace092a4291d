//! Database schema and migrations for warden.
//!
//! Migrations are applied in order when the database is opened; the
//! `schema_version` table records which ones have run.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: users
    r#"
CREATE TABLE users (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    login         TEXT NOT NULL UNIQUE,
    email         TEXT NOT NULL UNIQUE,
    phone         TEXT,
    password_hash TEXT NOT NULL,           -- Argon2 PHC string
    role          TEXT NOT NULL DEFAULT 'user',
    created_at    TEXT NOT NULL DEFAULT (datetime('now'))
);
"#,
    // v2: password reset tokens
    r#"
CREATE TABLE reset_tokens (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id       INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    token_digest  TEXT NOT NULL UNIQUE,    -- hex SHA-256 of the raw token
    created_at    INTEGER NOT NULL,        -- unix seconds
    expires_at    INTEGER NOT NULL         -- unix seconds
);

CREATE INDEX idx_reset_tokens_expires_at ON reset_tokens(expires_at);
CREATE INDEX idx_reset_tokens_user_id ON reset_tokens(user_id);
"#,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_not_empty() {
        assert!(!MIGRATIONS.is_empty());
        for migration in MIGRATIONS {
            assert!(migration.contains("CREATE TABLE"));
        }
    }

    #[test]
    fn test_users_table_enforces_unique_login_and_email() {
        let users = MIGRATIONS[0];
        assert!(users.contains("login         TEXT NOT NULL UNIQUE"));
        assert!(users.contains("email         TEXT NOT NULL UNIQUE"));
    }

    #[test]
    fn test_reset_tokens_store_digest_only() {
        let tokens = MIGRATIONS[1];
        assert!(tokens.contains("token_digest"));
        assert!(!tokens.contains(" token "));
    }
}
