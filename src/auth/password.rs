//! Password hashing and validation for warden.
//!
//! Uses Argon2id for password hashing. Verification reads the parameters from
//! the stored PHC string, so hashes survive cost changes.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};
use rand_core::{OsRng, RngCore};
use thiserror::Error;

use crate::config::PasswordConfig;
use crate::AuthError;

/// Password-related errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PasswordError {
    /// Password is too short.
    #[error("password must be at least {0} characters")]
    TooShort(usize),

    /// Password is too long.
    #[error("password must be at most {0} characters")]
    TooLong(usize),

    /// Argon2 parameters were rejected.
    #[error("invalid argon2 parameters: {0}")]
    InvalidParams(String),

    /// Password hashing failed.
    #[error("password hashing failed: {0}")]
    HashError(String),

    /// Stored password hash is not a valid PHC string.
    #[error("invalid password hash format")]
    InvalidHash,

    /// Password verification failed (wrong password).
    #[error("password verification failed")]
    VerificationFailed,
}

impl From<PasswordError> for AuthError {
    fn from(e: PasswordError) -> Self {
        match e {
            PasswordError::TooShort(_) | PasswordError::TooLong(_) => {
                AuthError::InvalidArgument(e.to_string())
            }
            PasswordError::VerificationFailed => AuthError::InvalidCredentials,
            PasswordError::InvalidParams(_)
            | PasswordError::HashError(_)
            | PasswordError::InvalidHash => AuthError::unavailable("password", e),
        }
    }
}

/// Argon2id hasher plus the length policy applied to new passwords.
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    params: Params,
    min_length: usize,
    max_length: usize,
    #[cfg(test)]
    verifications: std::sync::Arc<std::sync::atomic::AtomicUsize>,
}

impl PasswordPolicy {
    /// Build a policy from configuration.
    pub fn new(config: &PasswordConfig) -> Result<Self, PasswordError> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            None,
        )
        .map_err(|e| PasswordError::InvalidParams(e.to_string()))?;

        Ok(Self {
            params,
            min_length: config.min_length,
            max_length: config.max_length,
            #[cfg(test)]
            verifications: Default::default(),
        })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            self.params.clone(),
        )
    }

    /// Check the length bounds. Length is counted in characters.
    pub fn validate(&self, password: &str) -> Result<(), PasswordError> {
        let len = password.chars().count();
        if len < self.min_length {
            return Err(PasswordError::TooShort(self.min_length));
        }
        if len > self.max_length {
            return Err(PasswordError::TooLong(self.max_length));
        }
        Ok(())
    }

    /// Validate and hash a password.
    ///
    /// Returns a PHC-formatted hash string that includes the salt and parameters.
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        self.validate(password)?;
        self.hash_unchecked(password.as_bytes())
    }

    /// Hash a random secret with the configured cost.
    ///
    /// Unknown logins are verified against this hash so they cost the same
    /// as a wrong password for a real account.
    pub fn decoy_hash(&self) -> Result<String, PasswordError> {
        let mut secret = [0u8; 32];
        OsRng.fill_bytes(&mut secret);
        self.hash_unchecked(&secret)
    }

    fn hash_unchecked(&self, password: &[u8]) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password, &salt)
            .map_err(|e| PasswordError::HashError(e.to_string()))?;

        Ok(hash.to_string())
    }

    /// Verify a password against a stored hash in constant time.
    pub fn verify(&self, password: &str, hash: &str) -> Result<(), PasswordError> {
        #[cfg(test)]
        self.verifications
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        let parsed_hash = PasswordHash::new(hash).map_err(|_| PasswordError::InvalidHash)?;

        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| PasswordError::VerificationFailed)
    }
}

#[cfg(test)]
impl PasswordPolicy {
    /// Number of `verify` calls made through this policy and its clones.
    pub(crate) fn verification_count(&self) -> usize {
        self.verifications.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy() -> PasswordPolicy {
        PasswordPolicy::new(&PasswordConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
            ..PasswordConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_hash_password_success() {
        let hash = fast_policy().hash("test_password_123").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hash.contains("$v=19$"));
    }

    #[test]
    fn test_hash_password_unique_salt() {
        let policy = fast_policy();
        let a = policy.hash("same_password").unwrap();
        let b = policy.hash("same_password").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_password() {
        let policy = fast_policy();
        let hash = policy.hash("oldpass").unwrap();

        assert!(policy.verify("oldpass", &hash).is_ok());
        assert_eq!(
            policy.verify("newpass", &hash),
            Err(PasswordError::VerificationFailed)
        );
    }

    #[test]
    fn test_decoy_hash_uses_configured_cost() {
        let policy = PasswordPolicy::new(&PasswordConfig {
            memory_kib: 2048,
            iterations: 2,
            parallelism: 1,
            max_length: 8,
            ..PasswordConfig::default()
        })
        .unwrap();

        let decoy = policy.decoy_hash().unwrap();
        assert!(decoy.starts_with("$argon2id$v=19$m=2048,t=2,p=1$"));
        assert_ne!(decoy, policy.decoy_hash().unwrap());
        assert_eq!(
            policy.verify("password", &decoy),
            Err(PasswordError::VerificationFailed)
        );
    }

    #[test]
    fn test_verify_counts_calls() {
        let policy = fast_policy();
        let clone = policy.clone();
        let hash = policy.hash("oldpass").unwrap();

        let _ = policy.verify("oldpass", &hash);
        let _ = clone.verify("nope", &hash);
        assert_eq!(policy.verification_count(), 2);
    }

    #[test]
    fn test_verify_invalid_hash() {
        assert_eq!(
            fast_policy().verify("whatever", "not-a-phc-string"),
            Err(PasswordError::InvalidHash)
        );
    }

    #[test]
    fn test_length_bounds() {
        let policy = fast_policy();
        assert_eq!(policy.validate("short"), Err(PasswordError::TooShort(6)));
        assert!(policy.validate("sixsix").is_ok());
        assert_eq!(
            policy.validate(&"a".repeat(129)),
            Err(PasswordError::TooLong(128))
        );
        assert!(policy.hash("12345").is_err());
    }

    #[test]
    fn test_length_counts_characters() {
        let policy = fast_policy();
        // Six characters, more than six bytes.
        assert!(policy.validate("pässwö").is_ok());
    }

    #[test]
    fn test_invalid_params() {
        let result = PasswordPolicy::new(&PasswordConfig {
            parallelism: 0,
            ..PasswordConfig::default()
        });
        assert!(matches!(result, Err(PasswordError::InvalidParams(_))));
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(
            AuthError::from(PasswordError::VerificationFailed),
            AuthError::InvalidCredentials
        );
        assert!(matches!(
            AuthError::from(PasswordError::TooShort(6)),
            AuthError::InvalidArgument(_)
        ));
        assert!(matches!(
            AuthError::from(PasswordError::InvalidHash),
            AuthError::Unavailable { op: "password", .. }
        ));
    }
}
