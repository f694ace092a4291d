//! Profile updates requested by an authenticated user.

use crate::db::UserChange;
use crate::AuthError;

/// Fields a user may change about themselves.
///
/// Each field has three states: left alone (`None`), replaced, and for the
/// phone number, cleared (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    /// New email address.
    pub email: Option<String>,
    /// New phone number, or `Some(None)` to remove it.
    pub phone: Option<Option<String>>,
}

impl ProfileUpdate {
    /// Create an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set new email.
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Set new phone number.
    pub fn phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(Some(phone.into()));
        self
    }

    /// Remove the phone number.
    pub fn clear_phone(mut self) -> Self {
        self.phone = Some(None);
        self
    }

    /// Check if any fields are set.
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.phone.is_none()
    }

    /// Convert into store changes, rejecting empty updates and blank values.
    pub fn into_changes(self) -> Result<Vec<UserChange>, AuthError> {
        if self.is_empty() {
            return Err(AuthError::InvalidArgument(
                "update must set at least one field".to_string(),
            ));
        }

        let mut changes = Vec::with_capacity(2);
        if let Some(email) = self.email {
            if email.trim().is_empty() {
                return Err(AuthError::InvalidArgument("email must not be empty".to_string()));
            }
            changes.push(UserChange::Email(email));
        }
        if let Some(phone) = self.phone {
            if phone.as_deref().is_some_and(|p| p.trim().is_empty()) {
                return Err(AuthError::InvalidArgument(
                    "phone must not be empty; use clear_phone to remove it".to_string(),
                ));
            }
            changes.push(UserChange::Phone(phone));
        }
        Ok(changes)
    }
}
