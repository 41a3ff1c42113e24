//! Admin HTTP handlers for the request log and runtime settings.

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    app::AppState,
    error::AppError,
    models::{request_log::RequestLog, setting::UpdateSettingRequest},
};

const MAX_LOG_PAGE: u32 = 500;

#[derive(Debug, Deserialize)]
pub struct RecentLogsQuery {
    #[serde(default = "default_log_limit")]
    pub limit: u32,
}

fn default_log_limit() -> u32 {
    50
}

/// Newest request log rows first: `GET /admin/v1/logs?limit=50` (at most 500).
pub async fn recent_logs(
    State(state): State<AppState>,
    Query(query): Query<RecentLogsQuery>,
) -> Result<Json<Vec<RequestLog>>, AppError> {
    if query.limit == 0 || query.limit > MAX_LOG_PAGE {
        return Err(AppError::validation(
            "limit",
            format!("must be between 1 and {MAX_LOG_PAGE}"),
        ));
    }

    Ok(Json(state.repos.logs.recent(query.limit).await?))
}

pub async fn get_settings(State(state): State<AppState>) -> Json<HashMap<String, Value>> {
    Json(state.settings.all().await)
}

/// Write one setting: `PUT /admin/v1/settings/{key}` with `{"value": ...}`.
pub async fn put_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(request): Json<UpdateSettingRequest>,
) -> Result<Json<Value>, AppError> {
    state.settings.set(&key, request.value.clone()).await?;
    tracing::info!(key = %key, "Setting updated");

    Ok(Json(serde_json::json!({ "key": key, "value": request.value })))
}
