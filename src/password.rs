use std::{fmt, sync::LazyLock};

use argon2::{
    Argon2,
    password_hash::{self, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

/// Failures of the hashing primitive itself. A wrong password is not an error.
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("failed to hash password: {0}")]
    Hash(String),
    #[error("stored password hash is malformed: {0}")]
    InvalidHash(String),
}

// Verified against on logins for unknown emails, so both failure paths do the same
// Argon2 work.
static UNKNOWN_ACCOUNT_HASH: LazyLock<Option<PasswordHash>> =
    LazyLock::new(|| PasswordHash::new("roster-portal-unknown-account").ok());

/// PasswordHash
///
/// An Argon2id PHC string (`$argon2id$v=19$...`) with a random per-account salt.
///
/// Account writes only accept this type, so the only way to put a secret into the
/// credential store is to hash it first: the plaintext never reaches persistence, and
/// the hash is recomputed exactly when a new plaintext is supplied.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Hashes a plaintext secret with a fresh salt.
    pub fn new(plaintext: &str) -> Result<Self, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| PasswordError::Hash(e.to_string()))?;
        Ok(Self(hash.to_string()))
    }

    /// Wraps a PHC string read back from the credential store.
    pub fn from_stored(phc: String) -> Self {
        Self(phc)
    }

    /// Constant-time comparison of `plaintext` against this hash.
    pub fn verify(&self, plaintext: &str) -> Result<bool, PasswordError> {
        let parsed = password_hash::PasswordHash::new(&self.0)
            .map_err(|e| PasswordError::InvalidHash(e.to_string()))?;

        match Argon2::default().verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(PasswordError::InvalidHash(e.to_string())),
        }
    }

    /// Runs one verification against a fixed hash and reports a mismatch. Used when no
    /// account matches the submitted email.
    pub fn verify_unknown(plaintext: &str) -> bool {
        if let Some(hash) = UNKNOWN_ACCOUNT_HASH.as_ref() {
            let _ = hash.verify(plaintext);
        }
        false
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash(<redacted>)")
    }
}
