//! Process lifecycle: build state, activate, deactivate, shut down.
//!
//! Activation is idempotent: migrations only run once, defaults only fill
//! keys that are absent, so it can run on every start. Deactivation drops
//! ephemeral state only; configured endpoints, keys and logs stay.

use chrono::{SecondsFormat, Utc};
use serde_json::json;

use crate::app::AppState;
use crate::config::Config;
use crate::db;
use crate::error::AppError;
use crate::repositories::Repositories;

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Failed to connect to database: {0}")]
    Connect(#[from] sqlx::Error),

    #[error("Failed to run migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Failed to update settings: {0}")]
    Settings(#[from] AppError),
}

/// Connect to PostgreSQL and build the shared state.
pub async fn init(config: &Config) -> Result<AppState, LifecycleError> {
    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Database pool created");

    let state = AppState::new(
        Repositories::postgres(pool.clone()),
        config.clone(),
        Some(pool),
    );
    Ok(state)
}

/// Run migrations, seed default settings and record the activation time.
///
/// Returns the setting keys that were seeded.
pub async fn on_activate(state: &AppState) -> Result<Vec<&'static str>, LifecycleError> {
    if let Some(pool) = &state.pool {
        db::run_migrations(pool).await?;
        tracing::info!("Database migrations complete");
    }

    let seeded = state.settings.seed_defaults().await?;
    state
        .settings
        .set(
            "activated_at",
            json!(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
        )
        .await?;

    tracing::info!(seeded = seeded.len(), "Activated");
    Ok(seeded)
}

/// Drop transient settings and rate limiter counters.
pub async fn on_deactivate(state: &AppState) -> Result<(), LifecycleError> {
    let removed = state.settings.clear_transient().await?;
    state.limiter.clear().await;

    tracing::info!(transient_removed = removed, "Deactivated");
    Ok(())
}

/// Release process resources. Stored data is untouched.
pub async fn shutdown(state: AppState) {
    state.limiter.clear().await;
    if let Some(pool) = state.pool {
        pool.close().await;
    }
    tracing::info!("Shutdown complete");
}
