//! Test helpers for integration tests.
//!
//! Builds an [`AuthService`] over an in-memory database with a manual clock
//! and cheap Argon2 parameters.

#![allow(dead_code)]

use std::sync::Arc;

use warden::config::PasswordConfig;
use warden::{
    AuthService, Config, Context, CredentialStore, Database, ManualClock, SigningKeys,
    SqliteStore,
};

/// A service plus the pieces tests reach into.
pub struct Harness {
    pub auth: Arc<AuthService>,
    pub clock: Arc<ManualClock>,
    pub db: Database,
}

/// Default configuration with Argon2 cost turned down for tests.
pub fn fast_config() -> Config {
    Config {
        password: PasswordConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
            ..PasswordConfig::default()
        },
        ..Config::default()
    }
}

/// Service over a fresh in-memory database.
pub async fn harness() -> Harness {
    harness_with(fast_config(), |store| Arc::new(store)).await
}

/// Service over a fresh in-memory database, with the store wrapped by `wrap`.
pub async fn harness_with<F>(config: Config, wrap: F) -> Harness
where
    F: FnOnce(SqliteStore) -> Arc<dyn CredentialStore>,
{
    let db = Database::open_in_memory().await.unwrap();
    let clock = Arc::new(ManualClock::starting_now());
    let auth = AuthService::new(
        &config,
        wrap(db.store()),
        SigningKeys::generate().unwrap(),
        clock.clone(),
    )
    .unwrap();

    Harness {
        auth: Arc::new(auth),
        clock,
        db,
    }
}

/// Register a user and return the ID.
pub async fn create_test_user(
    auth: &AuthService,
    login: &str,
    email: &str,
    password: &str,
) -> i64 {
    auth.register(&Context::background(), email, login, None, password)
        .await
        .unwrap()
}
