//! facegate-core: face descriptor matching and authentication decisions.
//!
//! Descriptors come from an external face-embedding model; this crate only
//! compares them, selects the best enrolled identity above a threshold, and
//! decides which identity a login request proves.

pub mod auth;
pub mod matcher;
pub mod store;
pub mod types;

pub use auth::{
    AuthError, AuthMethod, AuthRequest, Authenticated, Authenticator, CredentialVerifier,
    LoginAttempt, SessionIssuer,
};
pub use matcher::{similarity, EuclideanMatcher, MatchError, Matcher, DEFAULT_THRESHOLD};
pub use store::{CredentialStore, Credentials, DescriptorStore, MemoryStore, StoreError};
pub use types::{Descriptor, EnrollmentRecord, MatchDecision};
