//! Sealed session tokens.
//!
//! A token is `base64url(nonce || AES-256-GCM(claims))` where the claims are
//! the JSON `{sub, iat, exp}` and the key is SHA-256 of the configured secret.
//! Anything that fails to open or has expired is simply invalid.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use facegate_core::SessionIssuer;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

const NONCE_LEN: usize = 12;

/// Seven days.
pub const DEFAULT_TTL_SECS: i64 = 7 * 24 * 60 * 60;
/// One year.
pub const MAX_TTL_SECS: i64 = 365 * 24 * 60 * 60;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session secret must not be empty")]
    EmptySecret,
    #[error("session lifetime must be in 1..={max} seconds, got {0}", max = MAX_TTL_SECS)]
    Ttl(i64),
    #[error("session expiry is out of range")]
    Expiry,
    #[error("failed to encode session claims: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to seal session token")]
    Seal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and validates session tokens with one symmetric key.
#[derive(Clone)]
pub struct SessionKeys {
    cipher: Aes256Gcm,
    ttl: Duration,
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl SessionKeys {
    /// Derive the sealing key from a shared secret.
    pub fn from_secret(secret: &[u8], ttl_secs: i64) -> Result<Self, SessionError> {
        if secret.is_empty() {
            return Err(SessionError::EmptySecret);
        }
        let key = Sha256::digest(secret);
        Ok(Self {
            cipher: Aes256Gcm::new(&key),
            ttl: checked_ttl(ttl_secs)?,
        })
    }

    /// Random key, valid for this process only.
    pub fn ephemeral(ttl_secs: i64) -> Result<Self, SessionError> {
        let key = Aes256Gcm::generate_key(OsRng);
        Ok(Self {
            cipher: Aes256Gcm::new(&key),
            ttl: checked_ttl(ttl_secs)?,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Seal a token for `identity` issued at `now`.
    pub fn issue_at(&self, identity: &str, now: DateTime<Utc>) -> Result<String, SessionError> {
        let exp = now
            .checked_add_signed(self.ttl)
            .ok_or(SessionError::Expiry)?;
        let claims = Claims {
            sub: identity.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };
        let plaintext = serde_json::to_vec(&claims)?;

        let nonce_bytes: [u8; NONCE_LEN] = rand::random();
        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
            .map_err(|_| SessionError::Seal)?;

        let mut token = Vec::with_capacity(NONCE_LEN + sealed.len());
        token.extend_from_slice(&nonce_bytes);
        token.extend_from_slice(&sealed);
        Ok(URL_SAFE_NO_PAD.encode(token))
    }

    /// Open `token` and return its claims if it is authentic and unexpired at `now`.
    pub fn open_at(&self, token: &str, now: DateTime<Utc>) -> Option<Claims> {
        let raw = URL_SAFE_NO_PAD.decode(token).ok()?;
        if raw.len() <= NONCE_LEN {
            return None;
        }
        let (nonce, sealed) = raw.split_at(NONCE_LEN);
        let plaintext = self.cipher.decrypt(Nonce::from_slice(nonce), sealed).ok()?;
        let claims: Claims = serde_json::from_slice(&plaintext).ok()?;
        (claims.exp > now.timestamp()).then_some(claims)
    }
}

fn checked_ttl(secs: i64) -> Result<Duration, SessionError> {
    if !(1..=MAX_TTL_SECS).contains(&secs) {
        return Err(SessionError::Ttl(secs));
    }
    Duration::try_seconds(secs).ok_or(SessionError::Ttl(secs))
}

impl SessionIssuer for SessionKeys {
    type Error = SessionError;

    fn issue(&self, identity: &str) -> Result<String, SessionError> {
        self.issue_at(identity, Utc::now())
    }

    fn validate(&self, token: &str) -> Option<String> {
        self.open_at(token, Utc::now()).map(|c| c.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> SessionKeys {
        SessionKeys::from_secret(b"test-secret", DEFAULT_TTL_SECS).unwrap()
    }

    #[test]
    fn test_issue_then_validate() {
        let keys = keys();
        let token = keys.issue("user-1").unwrap();
        assert_eq!(keys.validate(&token).as_deref(), Some("user-1"));
    }

    #[test]
    fn test_claims_carry_expiry() {
        let keys = keys();
        let now = Utc::now();
        let token = keys.issue_at("user-1", now).unwrap();
        let claims = keys.open_at(&token, now).unwrap();
        assert_eq!(claims.iat, now.timestamp());
        assert_eq!(claims.exp - claims.iat, DEFAULT_TTL_SECS);
    }

    #[test]
    fn test_expired_token_invalid() {
        let keys = keys();
        let issued = Utc::now() - Duration::days(8);
        let token = keys.issue_at("user-1", issued).unwrap();
        assert!(keys.validate(&token).is_none());
        assert!(keys.open_at(&token, issued + Duration::days(6)).is_some());
    }

    #[test]
    fn test_other_key_rejects() {
        let token = keys().issue("user-1").unwrap();
        let other = SessionKeys::from_secret(b"other-secret", DEFAULT_TTL_SECS).unwrap();
        assert!(other.validate(&token).is_none());
        let ephemeral = SessionKeys::ephemeral(DEFAULT_TTL_SECS).unwrap();
        assert!(ephemeral.validate(&token).is_none());
    }

    #[test]
    fn test_tampered_token_invalid() {
        let keys = keys();
        let token = keys.issue("user-1").unwrap();
        let mut raw = URL_SAFE_NO_PAD.decode(&token).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = URL_SAFE_NO_PAD.encode(raw);
        assert!(keys.validate(&tampered).is_none());
    }

    #[test]
    fn test_garbage_token_invalid() {
        let keys = keys();
        assert!(keys.validate("").is_none());
        assert!(keys.validate("not a token").is_none());
        assert!(keys.validate("AAAA").is_none());
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(matches!(
            SessionKeys::from_secret(b"", DEFAULT_TTL_SECS),
            Err(SessionError::EmptySecret)
        ));
    }

    #[test]
    fn test_ttl_out_of_range_rejected() {
        for secs in [0, -1, MAX_TTL_SECS + 1, 1_000_000_000_000_000, i64::MAX] {
            assert!(matches!(
                SessionKeys::from_secret(b"test-secret", secs),
                Err(SessionError::Ttl(s)) if s == secs
            ));
            assert!(matches!(SessionKeys::ephemeral(secs), Err(SessionError::Ttl(_))));
        }
        assert!(SessionKeys::from_secret(b"test-secret", MAX_TTL_SECS).is_ok());
    }

    #[test]
    fn test_expiry_overflow_is_an_error() {
        let keys = keys();
        assert!(matches!(
            keys.issue_at("user-1", DateTime::<Utc>::MAX_UTC),
            Err(SessionError::Expiry)
        ));
    }
}
