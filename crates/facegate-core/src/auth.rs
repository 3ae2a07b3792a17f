//! Authentication decisions for password and face logins.
//!
//! The authenticator only decides *which identity* a request proves.
//! Minting a session for that identity is left to a [`SessionIssuer`].

use crate::matcher::{EuclideanMatcher, MatchError, Matcher, DEFAULT_THRESHOLD};
use crate::store::{CredentialStore, Credentials, DescriptorStore, StoreError};
use crate::types::Descriptor;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("missing required input: {0}")]
    MissingInput(&'static str),
    #[error("unsupported authentication method")]
    UnsupportedMethod,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("face not recognized")]
    FaceNotRecognized,
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Whether this is a plain rejection of the caller, as opposed to a
    /// fault an operator should look at.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AuthError::MissingInput(_)
                | AuthError::UnsupportedMethod
                | AuthError::InvalidCredentials
                | AuthError::FaceNotRecognized
        )
    }
}

/// Login request, tagged by method.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum AuthRequest {
    Password {
        #[serde(default)]
        email: Option<String>,
        #[serde(default)]
        password: Option<String>,
    },
    Face {
        #[serde(default, alias = "faceDescriptor")]
        descriptor: Option<Vec<f32>>,
    },
}

impl AuthRequest {
    /// Parse a JSON request body. Unknown methods are rejected as
    /// [`AuthError::UnsupportedMethod`]; other malformed bodies as missing input.
    pub fn from_json(body: &str) -> Result<Self, AuthError> {
        let value: serde_json::Value =
            serde_json::from_str(body).map_err(|_| AuthError::MissingInput("request body"))?;
        match value.get("method").and_then(|m| m.as_str()) {
            Some("password") | Some("face") => {}
            Some(_) => return Err(AuthError::UnsupportedMethod),
            None => return Err(AuthError::MissingInput("method")),
        }
        serde_json::from_value(value).map_err(|_| AuthError::MissingInput("request body"))
    }

    pub fn method(&self) -> AuthMethod {
        match self {
            AuthRequest::Password { .. } => AuthMethod::Password,
            AuthRequest::Face { .. } => AuthMethod::Face,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Password,
    Face,
}

/// Outcome of a successful authentication.
#[derive(Debug, Clone, PartialEq)]
pub struct Authenticated {
    pub identity: String,
    pub method: AuthMethod,
    /// Match similarity for face logins.
    pub similarity: Option<f32>,
}

/// Checks a plaintext password against a stored hash.
pub trait CredentialVerifier {
    fn verify(&self, plaintext: &str, stored_hash: &str) -> bool;
}

/// Mints and checks session tokens for authenticated identities.
pub trait SessionIssuer {
    type Error;

    fn issue(&self, identity: &str) -> Result<String, Self::Error>;

    /// Identity the token was issued to, or `None` if it is invalid or expired.
    fn validate(&self, token: &str) -> Option<String>;
}

/// A login request with its required fields checked.
#[derive(Debug, Clone)]
pub enum LoginAttempt {
    Password { email: String, password: String },
    Face(Descriptor),
}

impl TryFrom<AuthRequest> for LoginAttempt {
    type Error = AuthError;

    fn try_from(request: AuthRequest) -> Result<Self, AuthError> {
        match request {
            AuthRequest::Password { email, password } => Ok(LoginAttempt::Password {
                email: non_empty(email).ok_or(AuthError::MissingInput("email"))?,
                password: non_empty(password).ok_or(AuthError::MissingInput("password"))?,
            }),
            AuthRequest::Face { descriptor } => {
                let values = descriptor
                    .filter(|v| !v.is_empty())
                    .ok_or(AuthError::MissingInput("descriptor"))?;
                Ok(LoginAttempt::Face(Descriptor::new(values)))
            }
        }
    }
}

/// Decides which identity a login request proves.
#[derive(Debug, Clone)]
pub struct Authenticator<V, M = EuclideanMatcher> {
    verifier: V,
    matcher: M,
    threshold: f32,
}

impl<V: CredentialVerifier> Authenticator<V, EuclideanMatcher> {
    pub fn new(verifier: V) -> Self {
        Self::with_matcher(verifier, EuclideanMatcher)
    }
}

impl<V: CredentialVerifier, M: Matcher> Authenticator<V, M> {
    pub fn with_matcher(verifier: V, matcher: M) -> Self {
        Self {
            verifier,
            matcher,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn verifier(&self) -> &V {
        &self.verifier
    }

    /// Authenticate `request` against a store.
    ///
    /// Face logins read the whole gallery once at the start of the call and
    /// match against that snapshot.
    pub fn authenticate<S>(
        &self,
        store: &S,
        request: &AuthRequest,
    ) -> Result<Authenticated, AuthError>
    where
        S: DescriptorStore + CredentialStore,
    {
        match LoginAttempt::try_from(request.clone())? {
            LoginAttempt::Password { email, password } => {
                self.check_password(store.credentials(&email)?, &password)
            }
            LoginAttempt::Face(probe) => self.identify_face(store, &probe),
        }
    }

    /// Decide a password login from the credentials stored for its email.
    ///
    /// Needs no store access, so callers can run the (slow) verifier away
    /// from whatever owns the store.
    pub fn check_password(
        &self,
        credentials: Option<Credentials>,
        password: &str,
    ) -> Result<Authenticated, AuthError> {
        let Some(creds) = credentials else {
            tracing::debug!("password login: unknown email");
            return Err(AuthError::InvalidCredentials);
        };
        if !self.verifier.verify(password, &creds.password_hash) {
            tracing::debug!(identity = %creds.identity, "password login: wrong password");
            return Err(AuthError::InvalidCredentials);
        }
        Ok(Authenticated {
            identity: creds.identity,
            method: AuthMethod::Password,
            similarity: None,
        })
    }

    /// Match `probe` against a snapshot of the store's gallery.
    pub fn identify_face<S: DescriptorStore>(
        &self,
        store: &S,
        probe: &Descriptor,
    ) -> Result<Authenticated, AuthError> {
        let gallery = store.enumerate()?;
        let decision = self.matcher.identify(probe, &gallery, self.threshold)?;
        tracing::debug!(
            gallery = gallery.len(),
            similarity = decision.similarity,
            matched = decision.matched(),
            "face login: gallery scanned"
        );

        let identity = decision.identity.ok_or(AuthError::FaceNotRecognized)?;
        Ok(Authenticated {
            identity,
            method: AuthMethod::Face,
            similarity: Some(decision.similarity),
        })
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.is_empty())
}
