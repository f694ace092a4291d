//! warden - session and credential lifecycle engine
//!
//! Issues and verifies signed session tokens, tracks live sessions in a TTL
//! cache, and runs a single-use password reset flow over a SQLite user
//! directory.

pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod logging;
pub mod task;

pub use auth::{
    session_key, AuthService, KeyError, PasswordError, PasswordPolicy, ProfileUpdate,
    ResetToken, ResetTokenFlow, SessionCache, SessionRecord, SignedToken, SigningKeys,
    Sweepers, TokenService,
};
pub use cache::{CacheError, TtlCache};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::Config;
pub use context::{CancelHandle, Context, Interrupted};
pub use db::{
    CredentialStore, Database, NewResetToken, NewUser, ResetTokenRecord, Role, SqliteStore,
    StoreError, User, UserChange,
};
pub use error::{AuthError, Result, WardenError};
pub use task::BackgroundTask;
