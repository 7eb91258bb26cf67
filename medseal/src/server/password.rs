//! Argon2id password hashing and verification.

use argon2::password_hash::SaltString;
use argon2::{password_hash, Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use rand::rngs::OsRng;

use crate::error::{Result, ServerError};

const MEMORY_COST_KIB: u32 = 19 * 1024;
const TIME_COST: u32 = 3;
const PARALLELISM: u32 = 1;

fn argon2_config() -> std::result::Result<Argon2<'static>, password_hash::Error> {
    let params = Params::new(MEMORY_COST_KIB, TIME_COST, PARALLELISM, None)?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a password into a PHC string (salt and parameters included).
pub fn hash_password(plaintext: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = argon2_config().map_err(|_| ServerError::HashFormat)?;
    argon2
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| ServerError::HashFormat)
}

/// Compare a presented password against a stored PHC hash.
///
/// A wrong password is `Ok(false)`; only an unparseable hash is an error.
/// Parameters come from the hash itself, so older cost settings still verify.
pub fn verify(provided_password: &str, stored_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash).map_err(|_| ServerError::HashFormat)?;

    match Argon2::default().verify_password(provided_password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => {
            tracing::error!("Password hash could not be evaluated: {}", e);
            Err(ServerError::HashFormat)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_and_verifies_passwords() {
        let hash = hash_password("Doctor123!").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert_eq!(verify("Doctor123!", &hash), Ok(true));
        assert_eq!(verify("doctor123!", &hash), Ok(false));
    }

    #[test]
    fn malformed_hash_is_an_error_not_a_mismatch() {
        assert_eq!(verify("anything", "plaintext-password"), Err(ServerError::HashFormat));
        assert_eq!(verify("anything", ""), Err(ServerError::HashFormat));
    }
}
