//! Signed session tokens.
//!
//! Tokens are JWTs signed with Ed25519 (`EdDSA`). Verification accepts only
//! that algorithm and checks the time claims against the shared [`Clock`],
//! not the system time.
//!
//! [`Clock`]: crate::clock::Clock

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::keys::SigningKeys;
use crate::clock::SharedClock;
use crate::db::{Role, User};
use crate::AuthError;

/// Claims carried inside a session token.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// Subject (user ID).
    sub: String,
    /// Token ID.
    jti: String,
    /// User role.
    role: String,
    /// Issued at (unix seconds).
    iat: i64,
    /// Not before (unix seconds).
    nbf: i64,
    /// Expiration (unix seconds).
    exp: i64,
}

/// A minted or verified session token.
#[derive(Clone, PartialEq, Eq)]
pub struct SignedToken {
    /// The encoded token handed to the client.
    pub token: String,
    /// User the token was issued to.
    pub user_id: i64,
    /// Unique token ID.
    pub token_id: String,
    /// Role at issue time.
    pub role: Role,
    /// Earliest instant the token is valid.
    pub not_before: DateTime<Utc>,
    /// Instant the token stops being valid.
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for SignedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedToken")
            .field("user_id", &self.user_id)
            .field("token_id", &self.token_id)
            .field("role", &self.role)
            .field("not_before", &self.not_before)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Hex-encoded SHA-256 of `input`.
pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Session cache key for a token: the hex SHA-256 of the token string.
pub fn session_key(token: &str) -> String {
    sha256_hex(token)
}

fn from_unix(secs: i64) -> Result<DateTime<Utc>, AuthError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| AuthError::Malformed(format!("timestamp out of range: {secs}")))
}

fn map_decode_error(e: jsonwebtoken::errors::Error) -> AuthError {
    match e.kind() {
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName
        | ErrorKind::InvalidKeyFormat => AuthError::SignatureInvalid,
        ErrorKind::ExpiredSignature => AuthError::Expired("token".to_string()),
        ErrorKind::ImmatureSignature => AuthError::NotYetValid,
        _ => AuthError::Malformed(e.to_string()),
    }
}

/// Issues and verifies session tokens.
#[derive(Debug)]
pub struct TokenService {
    keys: SigningKeys,
    validation: Validation,
    ttl: Duration,
    clock: SharedClock,
}

impl TokenService {
    /// Create a service that issues tokens valid for `ttl`.
    pub fn new(keys: SigningKeys, ttl: Duration, clock: SharedClock) -> Self {
        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "nbf", "sub"]);

        Self {
            keys,
            validation,
            ttl,
            clock,
        }
    }

    /// Default token lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `user` with the default lifetime.
    pub fn issue(&self, user: &User) -> Result<SignedToken, AuthError> {
        self.issue_with_ttl(user, self.ttl)
    }

    /// Issue a token for `user` valid from now for `ttl` (whole seconds).
    pub fn issue_with_ttl(&self, user: &User, ttl: Duration) -> Result<SignedToken, AuthError> {
        let ttl_secs = i64::try_from(ttl.as_secs())
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or_else(|| AuthError::InvalidArgument("token ttl must be at least 1s".into()))?;

        let now = self.clock.now().timestamp();
        let exp = now
            .checked_add(ttl_secs)
            .ok_or_else(|| AuthError::InvalidArgument("token ttl out of range".into()))?;

        let claims = Claims {
            sub: user.id.to_string(),
            jti: Uuid::new_v4().to_string(),
            role: user.role.as_str().to_string(),
            iat: now,
            nbf: now,
            exp,
        };

        let token = encode(&Header::new(Algorithm::EdDSA), &claims, &self.keys.encoding)
            .map_err(|e| AuthError::SigningError(e.to_string()))?;

        Ok(SignedToken {
            token,
            user_id: user.id,
            token_id: claims.jti,
            role: user.role,
            not_before: from_unix(now)?,
            expires_at: from_unix(exp)?,
        })
    }

    /// Verify `token` and decode its claims.
    pub fn parse(&self, token: &str) -> Result<SignedToken, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Malformed("empty token".to_string()));
        }

        let claims = decode::<Claims>(token, &self.keys.decoding, &self.validation)
            .map_err(map_decode_error)?
            .claims;

        let not_before = from_unix(claims.nbf)?;
        let expires_at = from_unix(claims.exp)?;
        let now = self.clock.now();
        if now >= expires_at {
            return Err(AuthError::Expired("token".to_string()));
        }
        if now < not_before {
            return Err(AuthError::NotYetValid);
        }

        let user_id = claims
            .sub
            .parse::<i64>()
            .map_err(|_| AuthError::Malformed("subject is not a user id".to_string()))?;
        let role = claims.role.parse::<Role>().map_err(AuthError::Malformed)?;

        Ok(SignedToken {
            token: token.to_string(),
            user_id,
            token_id: claims.jti,
            role,
            not_before,
            expires_at,
        })
    }
}
