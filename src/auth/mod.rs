//! Authentication module for warden.
//!
//! This module provides password hashing, token signing, session records,
//! password reset tokens and the use-case orchestrator built on them.

mod keys;
mod password;
mod profile;
mod reset;
mod service;
mod session;
mod token;

pub use keys::{KeyError, SigningKeys};
pub use password::{PasswordError, PasswordPolicy};
pub use profile::ProfileUpdate;
pub use reset::{ResetToken, ResetTokenFlow, RESET_TOKEN_BYTES};
pub use service::{AuthService, Sweepers};
pub use session::{SessionCache, SessionRecord};
pub use token::{session_key, sha256_hex, SignedToken, TokenService};
