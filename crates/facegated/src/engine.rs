use crate::store::{NewAccount, Profile, SqliteStore, SqliteStoreError};
use facegate_core::{
    AuthError, Authenticated, Authenticator, CredentialStore, Credentials, Descriptor,
    DescriptorStore, StoreError,
};
use facegate_keys::PasswordHasher;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] SqliteStoreError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Gallery(#[from] StoreError),
    #[error("failed to spawn store thread: {0}")]
    Spawn(std::io::Error),
    #[error("store thread exited")]
    ChannelClosed,
}

type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

/// Messages sent from D-Bus handlers to the store thread.
enum EngineRequest {
    Register {
        account: NewAccount,
        reply: Reply<String>,
    },
    IdentifyFace {
        probe: Descriptor,
        reply: Reply<Authenticated>,
    },
    Credentials {
        email: String,
        reply: Reply<Option<Credentials>>,
    },
    Profile {
        id: String,
        reply: Reply<Option<Profile>>,
    },
    EnrollFace {
        id: String,
        descriptor: Descriptor,
        reply: Reply<bool>,
    },
    ForgetFace {
        id: String,
        reply: Reply<bool>,
    },
    Remove {
        id: String,
        reply: Reply<bool>,
    },
    Counts {
        reply: Reply<(u64, u64)>,
    },
    Close {
        reply: Reply<()>,
    },
}

/// Clone-safe handle to the store thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Insert a new account; the password must already be hashed.
    pub async fn register(&self, account: NewAccount) -> Result<String, EngineError> {
        self.request(|reply| EngineRequest::Register { account, reply })
            .await
    }

    /// Match `probe` against the current gallery.
    pub async fn identify_face(&self, probe: Descriptor) -> Result<Authenticated, EngineError> {
        self.request(|reply| EngineRequest::IdentifyFace { probe, reply })
            .await
    }

    /// Stored password material for `email`. Verification is left to the
    /// caller so the store thread never runs the password hash.
    pub async fn credentials(&self, email: String) -> Result<Option<Credentials>, EngineError> {
        self.request(|reply| EngineRequest::Credentials { email, reply })
            .await
    }

    pub async fn profile(&self, id: String) -> Result<Option<Profile>, EngineError> {
        self.request(|reply| EngineRequest::Profile { id, reply }).await
    }

    /// Replace the account's descriptor. False if the account does not exist.
    pub async fn enroll_face(
        &self,
        id: String,
        descriptor: Descriptor,
    ) -> Result<bool, EngineError> {
        self.request(|reply| EngineRequest::EnrollFace {
            id,
            descriptor,
            reply,
        })
        .await
    }

    pub async fn forget_face(&self, id: String) -> Result<bool, EngineError> {
        self.request(|reply| EngineRequest::ForgetFace { id, reply })
            .await
    }

    pub async fn remove(&self, id: String) -> Result<bool, EngineError> {
        self.request(|reply| EngineRequest::Remove { id, reply }).await
    }

    /// (accounts, faces enrolled)
    pub async fn counts(&self) -> Result<(u64, u64), EngineError> {
        self.request(|reply| EngineRequest::Counts { reply }).await
    }

    /// Close the database and stop the store thread. Later requests fail
    /// with [`EngineError::ChannelClosed`].
    pub async fn close(&self) -> Result<(), EngineError> {
        self.request(|reply| EngineRequest::Close { reply }).await
    }
}

/// Spawn the store thread.
///
/// The thread owns the SQLite connection and the authenticator; every
/// request runs to completion against one consistent database state.
pub fn spawn_engine(
    store: SqliteStore,
    authenticator: Authenticator<PasswordHasher>,
) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    std::thread::Builder::new()
        .name("facegate-store".into())
        .spawn(move || {
            tracing::info!("store thread started");
            let mut store = store;
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Close { reply } => {
                        let result = store.close().map_err(EngineError::from);
                        let _ = reply.send(result);
                        tracing::info!("store closed");
                        return;
                    }
                    req => handle(&mut store, &authenticator, req),
                }
            }
            tracing::info!("store thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

fn handle(
    store: &mut SqliteStore,
    authenticator: &Authenticator<PasswordHasher>,
    req: EngineRequest,
) {
    match req {
        EngineRequest::Register { account, reply } => {
            let _ = reply.send(store.create_account(&account).map_err(Into::into));
        }
        EngineRequest::IdentifyFace { probe, reply } => {
            let _ = reply.send(
                authenticator
                    .identify_face(&*store, &probe)
                    .map_err(Into::into),
            );
        }
        EngineRequest::Credentials { email, reply } => {
            let _ = reply.send(store.credentials(&email).map_err(Into::into));
        }
        EngineRequest::Profile { id, reply } => {
            let _ = reply.send(store.profile(&id).map_err(Into::into));
        }
        EngineRequest::EnrollFace {
            id,
            descriptor,
            reply,
        } => {
            let result = match store.enroll(&id, descriptor) {
                Ok(()) => Ok(true),
                Err(StoreError::UnknownIdentity(_)) => Ok(false),
                Err(e) => Err(e.into()),
            };
            let _ = reply.send(result);
        }
        EngineRequest::ForgetFace { id, reply } => {
            let _ = reply.send(store.clear_descriptor(&id).map_err(Into::into));
        }
        EngineRequest::Remove { id, reply } => {
            let _ = reply.send(store.remove(&id).map_err(Into::into));
        }
        EngineRequest::Counts { reply } => {
            let _ = reply.send(store.counts().map_err(Into::into));
        }
        // Handled by the thread loop.
        EngineRequest::Close { reply } => {
            let _ = reply.send(Ok(()));
        }
    }
}
