//! Configuration module for warden.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::{Result, WardenError};

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/warden.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log file path.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/warden.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Session cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// TTL applied to cache entries set without one, in seconds.
    #[serde(default = "default_session_ttl")]
    pub default_ttl_secs: u64,
    /// Interval between expired-entry sweeps, in seconds.
    #[serde(default = "default_session_cleanup_interval")]
    pub cleanup_interval_secs: u64,
    /// Drop every live session of a user once their password changes.
    #[serde(default)]
    pub revoke_on_password_change: bool,
}

fn default_session_ttl() -> u64 {
    4 * 60 * 60
}

fn default_session_cleanup_interval() -> u64 {
    4 * 60 * 60
}

impl SessionConfig {
    /// Default entry TTL as a `Duration`.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    /// Sweep interval as a `Duration`.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_session_ttl(),
            cleanup_interval_secs: default_session_cleanup_interval(),
            revoke_on_password_change: false,
        }
    }
}

/// Access token configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    /// Access token lifetime in seconds.
    #[serde(default = "default_token_ttl")]
    pub ttl_secs: u64,
    /// Path to the PKCS#8 PEM Ed25519 signing key. Generated if missing.
    #[serde(default = "default_signing_key_path")]
    pub signing_key_path: String,
}

fn default_token_ttl() -> u64 {
    60 * 60
}

fn default_signing_key_path() -> String {
    "data/signing_key.pem".to_string()
}

impl TokenConfig {
    /// Token lifetime as a `Duration`.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_token_ttl(),
            signing_key_path: default_signing_key_path(),
        }
    }
}

/// Password reset configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ResetConfig {
    /// How long a reset token stays redeemable, in seconds.
    #[serde(default = "default_reset_window")]
    pub window_secs: u64,
    /// Interval between expired reset-token sweeps, in seconds.
    #[serde(default = "default_reset_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

fn default_reset_window() -> u64 {
    24 * 60 * 60
}

fn default_reset_cleanup_interval() -> u64 {
    60 * 60
}

impl ResetConfig {
    /// Redemption window as a `Duration`.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Sweep interval as a `Duration`.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            window_secs: default_reset_window(),
            cleanup_interval_secs: default_reset_cleanup_interval(),
        }
    }
}

/// Password hashing and policy configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordConfig {
    /// Argon2 memory cost in KiB.
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u32,
    /// Argon2 time cost (iterations).
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    /// Argon2 parallelism (lanes).
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
    /// Minimum password length.
    #[serde(default = "default_min_length")]
    pub min_length: usize,
    /// Maximum password length.
    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

fn default_memory_kib() -> u32 {
    65536
}

fn default_iterations() -> u32 {
    3
}

fn default_parallelism() -> u32 {
    4
}

fn default_min_length() -> usize {
    6
}

fn default_max_length() -> usize {
    128
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            iterations: default_iterations(),
            parallelism: default_parallelism(),
            min_length: default_min_length(),
            max_length: default_max_length(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Session cache configuration.
    #[serde(default)]
    pub session: SessionConfig,
    /// Access token configuration.
    #[serde(default)]
    pub token: TokenConfig,
    /// Password reset configuration.
    #[serde(default)]
    pub reset: ResetConfig,
    /// Password hashing configuration.
    #[serde(default)]
    pub password: PasswordConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(WardenError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| WardenError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `WARDEN_SIGNING_KEY_PATH`: Override the signing key location
    /// - `WARDEN_DATABASE_PATH`: Override the database file
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("WARDEN_SIGNING_KEY_PATH") {
            if !path.is_empty() {
                self.token.signing_key_path = path;
            }
        }
        if let Ok(path) = std::env::var("WARDEN_DATABASE_PATH") {
            if !path.is_empty() {
                self.database.path = path;
            }
        }
    }

    /// Validate the configuration.
    ///
    /// Every TTL, window and sweep interval must be non-zero, the password
    /// length bounds must be ordered, and the Argon2 parameters must be accepted
    /// by the hasher.
    pub fn validate(&self) -> Result<()> {
        let non_zero = [
            ("session.default_ttl_secs", self.session.default_ttl_secs),
            (
                "session.cleanup_interval_secs",
                self.session.cleanup_interval_secs,
            ),
            ("token.ttl_secs", self.token.ttl_secs),
            ("reset.window_secs", self.reset.window_secs),
            ("reset.cleanup_interval_secs", self.reset.cleanup_interval_secs),
        ];
        for (name, value) in non_zero {
            if value == 0 {
                return Err(WardenError::Config(format!("{name} must be greater than 0")));
            }
        }

        if self.token.signing_key_path.is_empty() {
            return Err(WardenError::Config(
                "token.signing_key_path is not set. \
                 Set it in config.toml or via WARDEN_SIGNING_KEY_PATH environment variable."
                    .to_string(),
            ));
        }

        if self.password.min_length == 0 || self.password.min_length > self.password.max_length {
            return Err(WardenError::Config(format!(
                "password length bounds are invalid (min {}, max {})",
                self.password.min_length, self.password.max_length
            )));
        }

        argon2::Params::new(
            self.password.memory_kib,
            self.password.iterations,
            self.password.parallelism,
            None,
        )
        .map_err(|e| WardenError::Config(format!("invalid argon2 parameters: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.database.path, "data/warden.db");

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.file, "logs/warden.log");

        assert_eq!(config.session.default_ttl_secs, 14400);
        assert_eq!(config.session.cleanup_interval_secs, 14400);
        assert!(!config.session.revoke_on_password_change);

        assert_eq!(config.token.ttl_secs, 3600);
        assert_eq!(config.token.signing_key_path, "data/signing_key.pem");

        assert_eq!(config.reset.window_secs, 86400);
        assert_eq!(config.reset.cleanup_interval_secs, 3600);

        assert_eq!(config.password.memory_kib, 65536);
        assert_eq!(config.password.iterations, 3);
        assert_eq!(config.password.parallelism, 4);
        assert_eq!(config.password.min_length, 6);
        assert_eq!(config.password.max_length, 128);

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[database]
path = "/var/lib/warden/auth.db"

[logging]
level = "debug"
file = "/var/log/warden.log"

[session]
default_ttl_secs = 600
cleanup_interval_secs = 300
revoke_on_password_change = true

[token]
ttl_secs = 900
signing_key_path = "/etc/warden/key.pem"

[reset]
window_secs = 7200
cleanup_interval_secs = 120

[password]
memory_kib = 19456
iterations = 2
parallelism = 1
min_length = 10
max_length = 64
"#;

        let config = Config::parse(toml).unwrap();

        assert_eq!(config.database.path, "/var/lib/warden/auth.db");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.session.default_ttl(), Duration::from_secs(600));
        assert_eq!(config.session.cleanup_interval(), Duration::from_secs(300));
        assert!(config.session.revoke_on_password_change);
        assert_eq!(config.token.ttl(), Duration::from_secs(900));
        assert_eq!(config.token.signing_key_path, "/etc/warden/key.pem");
        assert_eq!(config.reset.window(), Duration::from_secs(7200));
        assert_eq!(config.reset.cleanup_interval(), Duration::from_secs(120));
        assert_eq!(config.password.memory_kib, 19456);
        assert_eq!(config.password.min_length, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_config_uses_defaults() {
        let config = Config::parse("[token]\nttl_secs = 120\n").unwrap();

        assert_eq!(config.token.ttl_secs, 120);
        assert_eq!(config.token.signing_key_path, "data/signing_key.pem");
        assert_eq!(config.session.default_ttl_secs, 14400);
        assert_eq!(config.reset.window_secs, 86400);
    }

    #[test]
    fn test_parse_invalid_toml() {
        let result = Config::parse("this is not valid toml [[[");
        assert!(matches!(result, Err(WardenError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let mut config = Config::default();
        config.token.ttl_secs = 0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("token.ttl_secs"));
    }

    #[test]
    fn test_validate_rejects_zero_sweep_interval() {
        let mut config = Config::default();
        config.reset.cleanup_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_password_bounds() {
        let mut config = Config::default();
        config.password.min_length = 200;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_argon2_params() {
        let mut config = Config::default();
        config.password.parallelism = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_key_path() {
        let mut config = Config::default();
        config.token.signing_key_path = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("WARDEN_SIGNING_KEY_PATH"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[database]\npath = \"auth.db\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.database.path, "auth.db");
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/warden/config.toml");
        assert!(matches!(result, Err(WardenError::Io(_))));
    }
}
