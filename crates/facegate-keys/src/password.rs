//! bcrypt password hashes.
//!
//! Hashes are the standard modular-crypt strings (`$2b$<cost>$...`), so the
//! cost of an existing hash is read from the hash itself when verifying.

use facegate_core::CredentialVerifier;
use thiserror::Error;

/// Cost used for new hashes unless configured otherwise.
pub const DEFAULT_COST: u32 = bcrypt::DEFAULT_COST;
pub const MIN_COST: u32 = 4;
pub const MAX_COST: u32 = 31;

#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("password must not be empty")]
    Empty,
    #[error("bcrypt cost must be in {min}..={max}, got {0}", min = MIN_COST, max = MAX_COST)]
    Cost(u32),
    #[error("bcrypt: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),
}

#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self { cost: DEFAULT_COST }
    }
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Result<Self, PasswordError> {
        if !(MIN_COST..=MAX_COST).contains(&cost) {
            return Err(PasswordError::Cost(cost));
        }
        Ok(Self { cost })
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash `password` with a fresh random salt.
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        if password.is_empty() {
            return Err(PasswordError::Empty);
        }
        Ok(bcrypt::hash(password, self.cost)?)
    }

    /// Check `password` against a stored hash. Fails only when the hash
    /// itself cannot be parsed.
    pub fn check(&self, password: &str, stored_hash: &str) -> Result<bool, PasswordError> {
        Ok(bcrypt::verify(password, stored_hash)?)
    }
}

impl CredentialVerifier for PasswordHasher {
    fn verify(&self, plaintext: &str, stored_hash: &str) -> bool {
        match self.check(plaintext, stored_hash) {
            Ok(ok) => ok,
            Err(err) => {
                tracing::warn!(error = %err, "stored password hash could not be parsed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(MIN_COST).unwrap()
    }

    #[test]
    fn test_hash_then_verify() {
        let h = hasher();
        let encoded = h.hash("correct horse").unwrap();
        assert!(encoded.starts_with("$2b$04$"));
        assert!(h.verify("correct horse", &encoded));
        assert!(!h.verify("correct horse!", &encoded));
    }

    #[test]
    fn test_salts_differ() {
        let h = hasher();
        assert_ne!(h.hash("pw").unwrap(), h.hash("pw").unwrap());
    }

    #[test]
    fn test_cost_read_from_hash() {
        let encoded = PasswordHasher::new(5).unwrap().hash("pw").unwrap();
        assert!(hasher().verify("pw", &encoded));
    }

    #[test]
    fn test_empty_password_and_bad_cost_rejected() {
        assert!(matches!(hasher().hash(""), Err(PasswordError::Empty)));
        assert!(matches!(PasswordHasher::new(3), Err(PasswordError::Cost(3))));
        assert!(matches!(PasswordHasher::new(32), Err(PasswordError::Cost(32))));
        assert_eq!(PasswordHasher::default().cost(), 12);
    }

    #[test]
    fn test_malformed_hash_never_verifies() {
        let h = hasher();
        for bad in ["", "plaintext", "$2b$04$tooshort", "$fg-sha256$16$AAAA$AAAA"] {
            assert!(!h.verify("pw", bad), "{bad} should not verify");
            assert!(h.check("pw", bad).is_err());
        }
    }
}
