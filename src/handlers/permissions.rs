//! Admin HTTP handlers for the permission matrix.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{
    app::AppState,
    error::AppError,
    models::permission::{GrantPermissionRequest, Permission},
    services::authorization_service,
};

/// Grant a permission.
///
/// # Request Body
///
/// ```json
/// { "api_key_id": 3, "endpoint_id": 1, "method": "GET", "can_read": true }
/// ```
///
/// # Response
///
/// - **201 Created**: the stored row
/// - **400**: method outside GET/POST/PUT/PATCH/DELETE
/// - **404**: unknown key or endpoint
/// - **409**: the (key, endpoint, method) triple is already granted
pub async fn grant_permission(
    State(state): State<AppState>,
    Json(request): Json<GrantPermissionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let permission = authorization_service::grant_permission(&state.repos, request).await?;

    Ok((StatusCode::CREATED, Json(permission)))
}

#[derive(Debug, Deserialize)]
pub struct RevokePermissionQuery {
    pub api_key_id: i64,
    pub endpoint_id: i64,
    pub method: String,
}

/// Revoke a permission: `DELETE /admin/v1/permissions?api_key_id=3&endpoint_id=1&method=GET`.
///
/// Idempotent: 204 whether or not a row existed.
pub async fn revoke_permission(
    State(state): State<AppState>,
    Query(query): Query<RevokePermissionQuery>,
) -> Result<StatusCode, AppError> {
    authorization_service::revoke_permission(
        &state.repos,
        query.api_key_id,
        query.endpoint_id,
        &query.method,
    )
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_permissions(
    State(state): State<AppState>,
    Path(api_key_id): Path<i64>,
) -> Result<Json<Vec<Permission>>, AppError> {
    Ok(Json(
        authorization_service::list_permissions(&state.repos, api_key_id).await?,
    ))
}
