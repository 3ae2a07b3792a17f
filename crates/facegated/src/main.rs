use anyhow::{Context, Result};
use facegate_core::Authenticator;
use facegate_keys::{PasswordHasher, SessionKeys};
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod service;
mod store;

use config::{BusKind, Config};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facegated starting");

    let config = Config::load().context("failed to load configuration")?;

    let store = store::SqliteStore::open(&config.db_path)
        .with_context(|| format!("failed to open database {}", config.db_path.display()))?;
    tracing::info!(path = %config.db_path.display(), "database opened");

    let hasher = PasswordHasher::new(config.password_cost)?;
    let authenticator = Authenticator::new(hasher).with_threshold(config.similarity_threshold);
    let engine = engine::spawn_engine(store, authenticator.clone())?;

    let sessions = match &config.session_secret {
        Some(secret) => SessionKeys::from_secret(secret.as_bytes(), config.session_ttl_secs)?,
        None => {
            tracing::warn!(
                "FACEGATE_SESSION_SECRET not set; using a random key, sessions end when the daemon restarts"
            );
            SessionKeys::ephemeral(config.session_ttl_secs)?
        }
    };

    let service = service::AuthService::new(
        engine.clone(),
        authenticator,
        sessions,
        config.descriptor_dim,
    );

    let builder = match config.bus {
        BusKind::Session => zbus::connection::Builder::session()?,
        BusKind::System => zbus::connection::Builder::system()?,
    };
    let _conn = builder
        .name(dbus_interface::BUS_NAME)?
        .serve_at(
            dbus_interface::OBJECT_PATH,
            dbus_interface::FacegateService::new(service),
        )?
        .build()
        .await
        .context("failed to register on D-Bus")?;

    tracing::info!(
        bus = ?config.bus,
        name = dbus_interface::BUS_NAME,
        threshold = config.similarity_threshold,
        descriptor_dim = config.descriptor_dim,
        "facegated ready"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("facegated shutting down");

    engine.close().await?;

    Ok(())
}
