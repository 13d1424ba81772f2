//! Credential hashing.
//!
//! [`Argon2Hasher`] produces Argon2id PHC strings with a random salt drawn from
//! [`OsRng`]; parameters and salt travel inside the stored hash. Verification
//! goes through Argon2's own constant-time comparison, so the time taken does
//! not depend on where a mismatch occurs.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::error::CoreError;

/// One-way password hashing capability.
pub trait CredentialHasher: Send + Sync {
    /// Hash a plaintext password. Failure is reported, never retried.
    fn hash(&self, plaintext: &str) -> Result<String, CoreError>;

    /// `Ok(false)` on mismatch; `Err` only when the stored hash is unusable.
    fn verify(&self, plaintext: &str, hash: &str) -> Result<bool, CoreError>;
}

/// Argon2id hasher. `Default` uses the crate's recommended parameters.
#[derive(Debug, Clone)]
pub struct Argon2Hasher {
    params: Params,
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

impl Argon2Hasher {
    /// Use explicit cost parameters (cheap ones keep test suites fast).
    pub fn with_params(params: Params) -> Self {
        Self { params }
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String, CoreError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| CoreError::Internal(format!("failed to hash password: {e}")))
    }

    fn verify(&self, plaintext: &str, hash: &str) -> Result<bool, CoreError> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| CoreError::Internal(format!("stored password hash is malformed: {e}")))?;
        // Parameters embedded in the PHC string win over `self.params`.
        match self.argon2().verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(CoreError::Internal(format!(
                "password verification failed: {e}"
            ))),
        }
    }
}
