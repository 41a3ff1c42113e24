//! Authorization engine over the permission matrix.
//!
//! Deny by default: a request is allowed only when the unique permission row
//! for `(api_key, endpoint, METHOD)` exists and carries the capability the
//! method requires. Lookup failures deny.

use axum::http::Method;

use crate::error::AppError;
use crate::models::{
    endpoint::Endpoint,
    permission::{
        Capability, GrantPermissionRequest, NewPermission, Permission, normalize_method,
        permission_method,
    },
};
use crate::repositories::Repositories;

/// Whether `api_key_id` may exercise `capability` on `endpoint` via `method`.
///
/// Never errors: disabled endpoints, missing rows and store failures all deny.
pub async fn check(
    repos: &Repositories,
    api_key_id: i64,
    endpoint: &Endpoint,
    method: &Method,
    capability: Capability,
) -> bool {
    if !endpoint.enabled {
        return false;
    }

    match repos
        .permissions
        .find(api_key_id, endpoint.id, permission_method(method))
        .await
    {
        Ok(Some(permission)) => permission.allows(capability),
        Ok(None) => false,
        Err(e) => {
            tracing::error!(
                api_key_id,
                endpoint_id = endpoint.id,
                error = %e,
                "Permission lookup failed, denying"
            );
            false
        }
    }
}

/// Authorize a request method against an endpoint.
///
/// Public endpoints (`require_api_key = false`) are not checked here; the
/// pipeline skips authorization for them.
///
/// # Errors
///
/// `AuthorizationDenied` for every denial, including methods outside CRUD.
pub async fn authorize(
    repos: &Repositories,
    api_key_id: i64,
    endpoint: &Endpoint,
    method: &Method,
) -> Result<Capability, AppError> {
    let capability = Capability::for_method(method).ok_or(AppError::AuthorizationDenied)?;

    if check(repos, api_key_id, endpoint, method, capability).await {
        Ok(capability)
    } else {
        tracing::debug!(
            api_key_id,
            endpoint = %endpoint.name,
            method = %method,
            capability = capability.as_str(),
            "Authorization denied"
        );
        Err(AppError::AuthorizationDenied)
    }
}

/// Grant a permission row.
///
/// # Errors
///
/// - `Validation("method")`: method outside GET/POST/PUT/PATCH/DELETE
/// - `NotFound`: API key or endpoint does not exist
/// - `Conflict`: the triple is already granted
pub async fn grant_permission(
    repos: &Repositories,
    request: GrantPermissionRequest,
) -> Result<Permission, AppError> {
    let method = normalize_method(&request.method)?;

    if repos.api_keys.find(request.api_key_id).await?.is_none() {
        return Err(AppError::NotFound("API key".to_string()));
    }
    if repos.endpoints.find(request.endpoint_id).await?.is_none() {
        return Err(AppError::NotFound("Endpoint".to_string()));
    }

    let permission = repos
        .permissions
        .insert(NewPermission {
            api_key_id: request.api_key_id,
            endpoint_id: request.endpoint_id,
            method,
            can_read: request.can_read,
            can_create: request.can_create,
            can_update: request.can_update,
            can_delete: request.can_delete,
        })
        .await?;

    tracing::info!(
        api_key_id = permission.api_key_id,
        endpoint_id = permission.endpoint_id,
        method = %permission.method,
        "Permission granted"
    );

    Ok(permission)
}

/// Remove a permission row. Returns whether one existed.
pub async fn revoke_permission(
    repos: &Repositories,
    api_key_id: i64,
    endpoint_id: i64,
    method: &str,
) -> Result<bool, AppError> {
    let method = normalize_method(method)?;
    let removed = repos
        .permissions
        .delete(api_key_id, endpoint_id, &method)
        .await?;

    if removed {
        tracing::info!(api_key_id, endpoint_id, method = %method, "Permission revoked");
    }
    Ok(removed)
}

pub async fn list_permissions(
    repos: &Repositories,
    api_key_id: i64,
) -> Result<Vec<Permission>, AppError> {
    repos.permissions.list_for_key(api_key_id).await
}
