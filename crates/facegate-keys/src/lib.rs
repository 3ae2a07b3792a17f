//! facegate-keys: credential and session collaborators.
//!
//! Password hashes are bcrypt. Session tokens are AES-256-GCM sealed
//! claims, so they can be validated without a lookup.

pub mod password;
pub mod session;

pub use password::{PasswordError, PasswordHasher};
pub use session::{Claims, SessionError, SessionKeys};
