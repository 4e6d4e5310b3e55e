//! Web credential checks.
//!
//! The session registry authenticates web connections through a
//! [`CredentialVerifier`]; the default verifier is backed by the document
//! store, and hashing lives here so every verifier shares the same Argon2id
//! parameters.

use std::fmt;
use std::future::Future;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use serde::Deserialize;

use crate::error::KinshipResult;
use crate::models::Identity;

/// Username/password pair supplied by a web client.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Resolves credentials to an identity. `Ok(None)` means the credentials were
/// checked and rejected; `Err` means the check itself could not run.
pub trait CredentialVerifier: Send + Sync {
    fn verify(
        &self,
        credentials: &Credentials,
    ) -> impl Future<Output = KinshipResult<Option<Identity>>> + Send;
}

/// Hash a password with Argon2id.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against an Argon2id hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed_hash = PasswordHash::new(hash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("hunter22").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("hunter22", &hash).unwrap());
        assert!(!verify_password("hunter23", &hash).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify_password("x", "not-a-hash").is_err());
    }

    #[test]
    fn debug_hides_password() {
        let creds = Credentials {
            username: "alex".into(),
            password: "secret".into(),
        };
        assert!(!format!("{creds:?}").contains("secret"));
    }
}
