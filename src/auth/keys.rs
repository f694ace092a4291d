//! Ed25519 signing key provisioning.
//!
//! The key lives on disk as a PKCS#8 PEM file. If the file does not exist a
//! fresh key is generated and written there on first start.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use ed25519_dalek::SigningKey;
use jsonwebtoken::{DecodingKey, EncodingKey};
use rand_core::OsRng;
use thiserror::Error;
use tracing::info;

/// Signing key errors.
#[derive(Error, Debug)]
pub enum KeyError {
    /// Reading or writing the key file failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The key could not be encoded or decoded as PKCS#8.
    #[error("invalid PKCS#8 key: {0}")]
    Pkcs8(String),
}

/// The token signing key pair, in the forms the JWT codec needs.
#[derive(Clone)]
pub struct SigningKeys {
    pub(crate) encoding: EncodingKey,
    pub(crate) decoding: DecodingKey,
    public_key: [u8; 32],
}

impl fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeys")
            .field("public_key", &hex::encode(self.public_key))
            .finish_non_exhaustive()
    }
}

impl SigningKeys {
    /// Derive the JWT keys from an Ed25519 signing key.
    pub fn from_signing_key(key: &SigningKey) -> Result<Self, KeyError> {
        let der = key
            .to_pkcs8_der()
            .map_err(|e| KeyError::Pkcs8(e.to_string()))?;
        let public_key = key.verifying_key().to_bytes();

        Ok(Self {
            encoding: EncodingKey::from_ed_der(der.as_bytes()),
            decoding: DecodingKey::from_ed_der(&public_key),
            public_key,
        })
    }

    /// Generate a fresh in-memory key.
    pub fn generate() -> Result<Self, KeyError> {
        Self::from_signing_key(&SigningKey::generate(&mut OsRng))
    }

    /// Parse a PKCS#8 PEM private key.
    pub fn from_pem(pem: &str) -> Result<Self, KeyError> {
        let key = SigningKey::from_pkcs8_pem(pem).map_err(|e| KeyError::Pkcs8(e.to_string()))?;
        Self::from_signing_key(&key)
    }

    /// Load the key at `path`, generating and saving one if the file is absent.
    pub fn load_or_generate(path: impl AsRef<Path>) -> Result<Self, KeyError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(pem) => {
                let keys = Self::from_pem(&pem)?;
                info!(path = ?path, "Loaded signing key");
                Ok(keys)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let key = SigningKey::generate(&mut OsRng);
                let pem = key
                    .to_pkcs8_pem(LineEnding::LF)
                    .map_err(|e| KeyError::Pkcs8(e.to_string()))?;
                write_private(path, pem.as_bytes())?;
                info!(path = ?path, "Generated new signing key");
                Self::from_signing_key(&key)
            }
            Err(e) => Err(KeyError::Io(e)),
        }
    }

    /// Raw 32-byte Ed25519 public key.
    pub fn public_key(&self) -> &[u8; 32] {
        &self.public_key
    }
}

/// Write `contents` to a new file readable only by the owner.
fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}
