//! Request orchestration between the D-Bus surface, the store thread and
//! the credential/session collaborators.

use crate::engine::{EngineError, EngineHandle};
use crate::store::{NewAccount, Profile, SqliteStoreError};
use facegate_core::{
    AuthError, AuthRequest, Authenticated, Authenticator, Descriptor, LoginAttempt, MatchError,
    SessionIssuer,
};
use facegate_keys::{PasswordError, PasswordHasher, SessionError, SessionKeys};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),
    #[error("account already exists")]
    AccountExists,
    #[error("invalid or expired session")]
    InvalidSession,
    #[error(transparent)]
    Engine(EngineError),
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<EngineError> for ServiceError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Auth(e) => ServiceError::Auth(e),
            EngineError::Store(SqliteStoreError::AccountExists) => ServiceError::AccountExists,
            other => ServiceError::Engine(other),
        }
    }
}

/// Registration input. Every field is required.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub descriptor: Vec<f32>,
}

/// A successful login.
#[derive(Debug, Clone, Serialize)]
pub struct Login {
    pub identity: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub version: &'static str,
    pub accounts: u64,
    pub faces_enrolled: u64,
    pub threshold: f32,
    pub descriptor_dim: usize,
}

pub struct AuthService {
    engine: EngineHandle,
    authenticator: Authenticator<PasswordHasher>,
    sessions: SessionKeys,
    descriptor_dim: usize,
}

impl AuthService {
    pub fn new(
        engine: EngineHandle,
        authenticator: Authenticator<PasswordHasher>,
        sessions: SessionKeys,
        descriptor_dim: usize,
    ) -> Self {
        Self {
            engine,
            authenticator,
            sessions,
            descriptor_dim,
        }
    }

    #[cfg(test)]
    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    /// Create an account with a password and an enrolled face. Returns the new id.
    pub async fn register(&self, reg: Registration) -> Result<String, ServiceError> {
        require(&reg.name, "name")?;
        require(&reg.email, "email")?;
        require(&reg.password, "password")?;
        let descriptor = self.check_descriptor(reg.descriptor)?;

        let hasher = *self.authenticator.verifier();
        let password = reg.password;
        let password_hash =
            tokio::task::spawn_blocking(move || hasher.hash(&password)).await??;

        let id = self
            .engine
            .register(NewAccount {
                name: reg.name,
                email: reg.email,
                password_hash,
                descriptor,
            })
            .await?;
        tracing::info!(identity = %id, "account registered");
        Ok(id)
    }

    /// Authenticate a request and mint a session token for the proven identity.
    pub async fn login(&self, request: AuthRequest) -> Result<Login, ServiceError> {
        let method = request.method();
        let authenticated = match self.authenticate(request).await {
            Ok(a) => a,
            Err(err) => {
                if let ServiceError::Auth(AuthError::Match(MatchError::DimensionMismatch {
                    probe,
                    enrolled,
                })) = &err
                {
                    tracing::error!(
                        probe = *probe,
                        enrolled = *enrolled,
                        "descriptor dimension mismatch between probe and gallery; check embedding model versions"
                    );
                } else {
                    tracing::info!(?method, error = %err, "login rejected");
                }
                return Err(err);
            }
        };

        let token = self.sessions.issue(&authenticated.identity)?;
        tracing::info!(
            identity = %authenticated.identity,
            ?method,
            similarity = ?authenticated.similarity,
            "login succeeded"
        );
        Ok(Login {
            identity: authenticated.identity,
            token,
        })
    }

    /// Password logins fetch the stored hash from the store thread and
    /// verify it on the blocking pool; face logins match on the store thread.
    async fn authenticate(&self, request: AuthRequest) -> Result<Authenticated, ServiceError> {
        match LoginAttempt::try_from(request)? {
            LoginAttempt::Password { email, password } => {
                let credentials = self.engine.credentials(email).await?;
                let authenticator = self.authenticator.clone();
                let authenticated = tokio::task::spawn_blocking(move || {
                    authenticator.check_password(credentials, &password)
                })
                .await??;
                Ok(authenticated)
            }
            LoginAttempt::Face(probe) => Ok(self.engine.identify_face(probe).await?),
        }
    }

    /// Profile of the account a session token belongs to.
    pub async fn profile(&self, token: &str) -> Result<Profile, ServiceError> {
        let identity = self.session_identity(token)?;
        self.engine
            .profile(identity)
            .await?
            .ok_or(ServiceError::InvalidSession)
    }

    /// Delete the account the session belongs to.
    pub async fn remove_account(&self, token: &str) -> Result<bool, ServiceError> {
        let identity = self.session_identity(token)?;
        let removed = self.engine.remove(identity.clone()).await?;
        if removed {
            tracing::info!(identity = %identity, "account removed");
        }
        Ok(removed)
    }

    /// Replace the face descriptor of the session's account.
    pub async fn enroll_face(
        &self,
        token: &str,
        descriptor: Vec<f32>,
    ) -> Result<bool, ServiceError> {
        let identity = self.session_identity(token)?;
        let descriptor = self.check_descriptor(descriptor)?;
        let enrolled = self.engine.enroll_face(identity.clone(), descriptor).await?;
        if enrolled {
            tracing::info!(identity = %identity, "face re-enrolled");
        }
        Ok(enrolled)
    }

    /// Clear the session account's face descriptor.
    pub async fn forget_face(&self, token: &str) -> Result<bool, ServiceError> {
        let identity = self.session_identity(token)?;
        let cleared = self.engine.forget_face(identity.clone()).await?;
        if cleared {
            tracing::info!(identity = %identity, "face descriptor cleared");
        }
        Ok(cleared)
    }

    pub async fn status(&self) -> Result<Status, ServiceError> {
        let (accounts, faces_enrolled) = self.engine.counts().await?;
        Ok(Status {
            version: env!("CARGO_PKG_VERSION"),
            accounts,
            faces_enrolled,
            threshold: self.authenticator.threshold(),
            descriptor_dim: self.descriptor_dim,
        })
    }

    fn session_identity(&self, token: &str) -> Result<String, ServiceError> {
        self.sessions
            .validate(token)
            .ok_or(ServiceError::InvalidSession)
    }

    fn check_descriptor(&self, values: Vec<f32>) -> Result<Descriptor, ServiceError> {
        if values.is_empty() {
            return Err(AuthError::MissingInput("descriptor").into());
        }
        let descriptor = Descriptor::new(values);
        if descriptor.dim() != self.descriptor_dim {
            return Err(AuthError::Match(MatchError::DimensionMismatch {
                probe: descriptor.dim(),
                enrolled: self.descriptor_dim,
            })
            .into());
        }
        if !descriptor.is_finite() {
            return Err(ServiceError::InvalidDescriptor(
                "descriptor contains non-finite values".into(),
            ));
        }
        Ok(descriptor)
    }
}

fn require(value: &str, field: &'static str) -> Result<(), ServiceError> {
    if value.is_empty() {
        return Err(AuthError::MissingInput(field).into());
    }
    Ok(())
}
