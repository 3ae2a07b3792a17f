use crate::service::{AuthService, Registration, ServiceError};
use facegate_core::{AuthError, AuthRequest};
use zbus::interface;

pub const BUS_NAME: &str = "org.facegate.Auth1";
pub const OBJECT_PATH: &str = "/org/facegate/Auth1";

/// What the caller learns about a failed request. Rejections never say
/// which check failed.
fn to_fdo(err: ServiceError) -> zbus::fdo::Error {
    match err {
        ServiceError::Auth(AuthError::MissingInput(field)) => {
            zbus::fdo::Error::InvalidArgs(format!("missing required input: {field}"))
        }
        ServiceError::Auth(AuthError::UnsupportedMethod) => {
            zbus::fdo::Error::InvalidArgs("unsupported authentication method".into())
        }
        ServiceError::InvalidDescriptor(msg) => zbus::fdo::Error::InvalidArgs(msg),
        ServiceError::Auth(
            AuthError::InvalidCredentials | AuthError::FaceNotRecognized | AuthError::Match(_),
        )
        | ServiceError::InvalidSession => {
            zbus::fdo::Error::AccessDenied("authentication failed".into())
        }
        ServiceError::AccountExists => zbus::fdo::Error::Failed("account already exists".into()),
        other => {
            tracing::error!(error = %other, "request failed");
            zbus::fdo::Error::Failed("internal error".into())
        }
    }
}

fn parse_descriptor(json: &str) -> zbus::fdo::Result<Vec<f32>> {
    serde_json::from_str(json).map_err(|e| {
        zbus::fdo::Error::InvalidArgs(format!("descriptor must be a JSON array of numbers: {e}"))
    })
}

fn to_json<T: serde::Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

/// D-Bus interface for the facegate daemon.
///
/// Bus name: org.facegate.Auth1
/// Object path: /org/facegate/Auth1
pub struct FacegateService {
    service: AuthService,
}

impl FacegateService {
    pub fn new(service: AuthService) -> Self {
        Self { service }
    }
}

#[interface(name = "org.facegate.Auth1")]
impl FacegateService {
    /// Create an account. `descriptor` is a JSON array of numbers.
    async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        descriptor: &str,
    ) -> zbus::fdo::Result<String> {
        tracing::info!("register requested");
        let descriptor = parse_descriptor(descriptor)?;
        self.service
            .register(Registration {
                name: name.to_string(),
                email: email.to_string(),
                password: password.to_string(),
                descriptor,
            })
            .await
            .map_err(to_fdo)
    }

    /// Authenticate a JSON login request and return a session token.
    async fn login(&self, request: &str) -> zbus::fdo::Result<String> {
        let request = AuthRequest::from_json(request)
            .map_err(|e| to_fdo(ServiceError::Auth(e)))?;
        tracing::info!(method = ?request.method(), "login requested");
        let login = self.service.login(request).await.map_err(to_fdo)?;
        Ok(login.token)
    }

    /// Profile JSON of the account a session token belongs to.
    async fn profile(&self, token: &str) -> zbus::fdo::Result<String> {
        let profile = self.service.profile(token).await.map_err(to_fdo)?;
        to_json(&profile)
    }

    /// Delete the account the session token belongs to.
    async fn remove_account(&self, token: &str) -> zbus::fdo::Result<bool> {
        tracing::info!("remove_account requested");
        self.service.remove_account(token).await.map_err(to_fdo)
    }

    /// Replace the face descriptor of the session token's account.
    async fn enroll_face(&self, token: &str, descriptor: &str) -> zbus::fdo::Result<bool> {
        tracing::info!("enroll_face requested");
        let descriptor = parse_descriptor(descriptor)?;
        self.service
            .enroll_face(token, descriptor)
            .await
            .map_err(to_fdo)
    }

    /// Clear the session account's face descriptor; password login keeps working.
    async fn forget_face(&self, token: &str) -> zbus::fdo::Result<bool> {
        tracing::info!("forget_face requested");
        self.service.forget_face(token).await.map_err(to_fdo)
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let status = self.service.status().await.map_err(to_fdo)?;
        to_json(&status)
    }
}
