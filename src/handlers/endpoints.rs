//! Admin HTTP handlers for endpoints and their fields.
//!
//! This module implements:
//! - POST   /admin/v1/endpoints                          - Create endpoint (with fields)
//! - GET    /admin/v1/endpoints                          - List endpoints
//! - GET    /admin/v1/endpoints/{id}                     - Get endpoint with fields
//! - PATCH  /admin/v1/endpoints/{id}                     - Partial update
//! - DELETE /admin/v1/endpoints/{id}                     - Delete (cascades)
//! - POST   /admin/v1/endpoints/{id}/enable|disable      - Toggle
//! - POST   /admin/v1/endpoints/{id}/fields              - Add field
//! - GET    /admin/v1/endpoints/{id}/fields              - List fields
//! - DELETE /admin/v1/endpoints/{id}/fields/{field_id}   - Remove field

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    app::AppState,
    error::AppError,
    models::{
        endpoint::{CreateEndpointRequest, Endpoint, EndpointWithFields, UpdateEndpointRequest},
        field::{CreateFieldRequest, Field},
    },
    services::endpoint_service,
};

/// Create a new endpoint.
///
/// # Request Body
///
/// ```json
/// {
///   "name": "articles",
///   "post_type": "post",
///   "require_api_key": true,
///   "rate_limit_per_minute": 60,
///   "fields": [{ "field_name": "title", "field_type": "string" }]
/// }
/// ```
///
/// # Response
///
/// - **201 Created**: the endpoint with its fields
/// - **400**: invalid name, post type or field definition
/// - **409**: name already taken
pub async fn create_endpoint(
    State(state): State<AppState>,
    Json(request): Json<CreateEndpointRequest>,
) -> Result<impl IntoResponse, AppError> {
    let created = endpoint_service::create_endpoint(&state.repos, &state.settings, request).await?;

    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_endpoints(
    State(state): State<AppState>,
) -> Result<Json<Vec<Endpoint>>, AppError> {
    Ok(Json(endpoint_service::list_endpoints(&state.repos).await?))
}

pub async fn get_endpoint(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<EndpointWithFields>, AppError> {
    Ok(Json(endpoint_service::get_endpoint(&state.repos, id).await?))
}

/// Partially update an endpoint. Absent keys stay unchanged.
pub async fn update_endpoint(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(changes): Json<UpdateEndpointRequest>,
) -> Result<Json<Endpoint>, AppError> {
    Ok(Json(
        endpoint_service::update_endpoint(&state.repos, id, changes).await?,
    ))
}

pub async fn enable_endpoint(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Endpoint>, AppError> {
    Ok(Json(endpoint_service::set_enabled(&state.repos, id, true).await?))
}

pub async fn disable_endpoint(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Endpoint>, AppError> {
    Ok(Json(endpoint_service::set_enabled(&state.repos, id, false).await?))
}

/// Delete an endpoint together with its fields and permissions.
///
/// Returns 204 No Content on success.
pub async fn delete_endpoint(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    endpoint_service::delete_endpoint(&state.repos, id).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_field(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<CreateFieldRequest>,
) -> Result<impl IntoResponse, AppError> {
    let field = endpoint_service::add_field(&state.repos, id, request).await?;

    Ok((StatusCode::CREATED, Json(field)))
}

pub async fn list_fields(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Field>>, AppError> {
    Ok(Json(endpoint_service::list_fields(&state.repos, id).await?))
}

pub async fn delete_field(
    State(state): State<AppState>,
    Path((id, field_id)): Path<(i64, i64)>,
) -> Result<StatusCode, AppError> {
    endpoint_service::delete_field(&state.repos, id, field_id).await?;

    Ok(StatusCode::NO_CONTENT)
}
