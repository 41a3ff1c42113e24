//! Health check endpoint for service monitoring.

use crate::{app::AppState, error::AppError};
use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Health check response.
///
/// Returns service status and storage connectivity.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall service status
    pub status: String,

    /// Storage status: `connected` for PostgreSQL, `in-memory` otherwise
    pub database: String,

    /// Whether dynamic endpoints are currently served (the `enabled` setting)
    pub enabled: bool,

    /// Current server timestamp
    pub timestamp: DateTime<Utc>,
}

/// Health check handler.
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "status": "healthy",
///   "database": "connected",
///   "enabled": true,
///   "timestamp": "2025-12-21T19:00:00Z"
/// }
/// ```
///
/// `database` is `connected` once `SELECT 1` succeeds on the pool, and
/// `in-memory` when the state carries no pool (test builds only).
///
/// # Response (500 Internal Server Error)
///
/// The ping failed; the body is the usual `{"error": ...}` envelope with
/// the driver message hidden.
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let database = match &state.pool {
        Some(pool) => {
            sqlx::query("SELECT 1").execute(pool).await?;
            "connected"
        }
        None => "in-memory",
    };

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        database: database.to_string(),
        enabled: state.settings.get_bool("enabled", true).await,
        timestamp: Utc::now(),
    }))
}
