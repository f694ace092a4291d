//! User model for warden.
//!
//! This module defines the User struct and Role enum for the user directory.

use std::fmt;
use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

/// User role carried in issued tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Role {
    /// Regular user.
    #[default]
    User = 0,
    /// Administrator.
    Admin = 1,
}

impl Role {
    /// Convert role to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

/// A registered user.
#[derive(Clone, PartialEq, Eq)]
pub struct User {
    /// Unique user ID.
    pub id: i64,
    /// Login name (unique).
    pub login: String,
    /// Email address (unique).
    pub email: String,
    /// Phone number (optional).
    pub phone: Option<String>,
    /// Password hash (Argon2 PHC string).
    pub password_hash: String,
    /// Role embedded in issued tokens.
    pub role: Role,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("login", &self.login)
            .field("email", &self.email)
            .field("phone", &self.phone)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for User {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let role: String = row.try_get("role")?;
        let role = role.parse().map_err(|e: String| sqlx::Error::ColumnDecode {
            index: "role".to_string(),
            source: e.into(),
        })?;

        Ok(User {
            id: row.try_get("id")?,
            login: row.try_get("login")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            password_hash: row.try_get("password_hash")?,
            role,
        })
    }
}

/// Data for creating a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Login name.
    pub login: String,
    /// Email address.
    pub email: String,
    /// Phone number (optional).
    pub phone: Option<String>,
    /// Password hash (should be pre-hashed with Argon2).
    pub password_hash: String,
    /// Role (defaults to User).
    pub role: Role,
}

impl NewUser {
    /// Create a new user with the required fields.
    pub fn new(
        login: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        Self {
            login: login.into(),
            email: email.into(),
            phone: None,
            password_hash: password_hash.into(),
            role: Role::User,
        }
    }

    /// Set the phone number.
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// Set the role.
    #[cfg(test)]
    pub(crate) fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }
}

/// A single field change applied by `CredentialStore::update_user`.
#[derive(Clone, PartialEq, Eq)]
pub enum UserChange {
    /// Replace the email address.
    Email(String),
    /// Replace (`Some`) or clear (`None`) the phone number.
    Phone(Option<String>),
    /// Replace the password hash.
    PasswordHash(String),
}

impl UserChange {
    /// Column written by this change.
    pub fn column(&self) -> &'static str {
        match self {
            UserChange::Email(_) => "email",
            UserChange::Phone(_) => "phone",
            UserChange::PasswordHash(_) => "password_hash",
        }
    }
}

impl fmt::Debug for UserChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserChange::Email(email) => f.debug_tuple("Email").field(email).finish(),
            UserChange::Phone(phone) => f.debug_tuple("Phone").field(phone).finish(),
            UserChange::PasswordHash(_) => f.write_str("PasswordHash(..)"),
        }
    }
}
