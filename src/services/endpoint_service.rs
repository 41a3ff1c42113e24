//! Endpoint service - admin management of endpoints and their fields.
//!
//! This service handles:
//! - Name and post type validation
//! - The `max_endpoints` quota
//! - Creating an endpoint together with its initial fields
//! - Enabling, disabling and deleting (with cascade)

use crate::error::AppError;
use crate::models::{
    endpoint::{CreateEndpointRequest, Endpoint, EndpointWithFields, NewEndpoint, UpdateEndpointRequest},
    field::{CreateFieldRequest, Field, FieldType, NewField},
};
use crate::repositories::Repositories;
use crate::services::{endpoint_resolver::RESERVED_PARAMS, settings_service::SettingsService};

const MAX_NAME_LEN: usize = 100;
/// Column widths in the `endpoints` / `endpoint_fields` tables.
const MAX_POST_TYPE_LEN: usize = 20;
const MAX_LABEL_LEN: usize = 120;
const MAX_META_KEY_LEN: usize = 120;

/// Names become URL segments: ASCII letters, digits, `_` and `-` only.
fn is_slug(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Lowercase and strip everything outside `[a-z0-9_-]`.
pub fn sanitize_post_type(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

fn validated_post_type(raw: &str) -> Result<String, AppError> {
    let post_type = sanitize_post_type(raw);
    if post_type.is_empty() {
        return Err(AppError::validation("post_type", "must not be empty"));
    }
    if post_type.len() > MAX_POST_TYPE_LEN {
        return Err(AppError::validation(
            "post_type",
            format!("must be at most {MAX_POST_TYPE_LEN} characters"),
        ));
    }
    Ok(post_type)
}

/// Trimmed, `None` when blank, rejected past `max` characters.
fn bounded_text(field: &str, raw: Option<String>, max: usize) -> Result<Option<String>, AppError> {
    let value = raw.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    match value {
        Some(v) if v.chars().count() > max => Err(AppError::validation(
            field,
            format!("must be at most {max} characters"),
        )),
        other => Ok(other),
    }
}

/// Negative limits are rejected; 0 stores "unlimited".
fn validated_rate_limit(limit: Option<i32>) -> Result<Option<i32>, AppError> {
    match limit {
        Some(n) if n < 0 => Err(AppError::validation(
            "rate_limit_per_minute",
            "must not be negative",
        )),
        Some(0) | None => Ok(None),
        Some(n) => Ok(Some(n.max(1))),
    }
}

fn new_field(endpoint_id: i64, request: CreateFieldRequest) -> Result<NewField, AppError> {
    let field_name = request.field_name.trim().to_string();
    if !is_slug(&field_name) {
        return Err(AppError::validation(
            "field_name",
            "must contain only letters, digits, '_' or '-'",
        ));
    }
    // These names are read as paging/sorting parameters, never as filters
    if RESERVED_PARAMS.contains(&field_name.as_str()) {
        return Err(AppError::validation(
            "field_name",
            format!("'{field_name}' is a reserved query parameter"),
        ));
    }

    let field_type = FieldType::parse(request.field_type.trim()).ok_or_else(|| {
        let allowed: Vec<&str> = FieldType::ALL.iter().map(FieldType::as_str).collect();
        AppError::validation(
            "field_type",
            format!("must be one of {}", allowed.join(", ")),
        )
    })?;

    let field_label = bounded_text("field_label", request.field_label, MAX_LABEL_LEN)?;
    let meta_key = bounded_text("meta_key", request.meta_key, MAX_META_KEY_LEN)?;

    Ok(NewField {
        endpoint_id,
        field_name,
        field_type,
        field_label,
        is_required: request.is_required,
        is_searchable: request.is_searchable,
        is_sortable: request.is_sortable,
        is_filterable: request.is_filterable,
        show_in_response: request.show_in_response,
        meta_key,
    })
}

/// Create an endpoint and its initial fields.
///
/// Every field is validated before anything is written. If a field insert
/// still fails (e.g. duplicate field names) the endpoint is removed again.
///
/// # Errors
///
/// - `Validation`: bad name, post type, rate limit, field definition, or the
///   `max_endpoints` quota is reached
/// - `Conflict`: an endpoint with this name already exists
pub async fn create_endpoint(
    repos: &Repositories,
    settings: &SettingsService,
    request: CreateEndpointRequest,
) -> Result<EndpointWithFields, AppError> {
    let name = request.name.trim().to_string();
    if !is_slug(&name) {
        return Err(AppError::validation(
            "name",
            "must contain only letters, digits, '_' or '-'",
        ));
    }
    let post_type = validated_post_type(&request.post_type)?;
    let rate_limit_per_minute = validated_rate_limit(request.rate_limit_per_minute)?;

    // Validate field definitions up front; endpoint_id is filled in after insert
    let mut fields = Vec::with_capacity(request.fields.len());
    for field in request.fields {
        fields.push(new_field(0, field)?);
    }

    let max_endpoints = settings.get_int("max_endpoints", 100).await;
    if max_endpoints > 0 && repos.endpoints.count().await? >= max_endpoints as u64 {
        return Err(AppError::validation(
            "name",
            format!("endpoint limit of {max_endpoints} reached"),
        ));
    }

    let endpoint = repos
        .endpoints
        .insert(NewEndpoint {
            name,
            description: request.description,
            post_type,
            enabled: request.enabled,
            require_api_key: request.require_api_key,
            rate_limit_per_minute,
            documentation: request.documentation,
        })
        .await?;

    let mut created = Vec::with_capacity(fields.len());
    for mut field in fields {
        field.endpoint_id = endpoint.id;
        match repos.fields.insert(field).await {
            Ok(f) => created.push(f),
            Err(e) => {
                if let Err(cleanup) = repos.endpoints.delete(endpoint.id).await {
                    tracing::error!(
                        endpoint_id = endpoint.id,
                        error = %cleanup,
                        "Failed to remove partially created endpoint"
                    );
                }
                return Err(e);
            }
        }
    }

    tracing::info!(
        endpoint_id = endpoint.id,
        name = %endpoint.name,
        fields = created.len(),
        "Endpoint created"
    );

    Ok(EndpointWithFields {
        endpoint,
        fields: created,
    })
}

pub async fn list_endpoints(repos: &Repositories) -> Result<Vec<Endpoint>, AppError> {
    repos.endpoints.list().await
}

/// Fetch an endpoint (enabled or not) with its fields.
pub async fn get_endpoint(repos: &Repositories, id: i64) -> Result<EndpointWithFields, AppError> {
    let endpoint = repos
        .endpoints
        .find(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Endpoint".to_string()))?;
    let fields = repos.fields.list_for_endpoint(id).await?;
    Ok(EndpointWithFields { endpoint, fields })
}

/// Apply a partial update. `post_type` is sanitized, a rate limit of 0 clears it.
pub async fn update_endpoint(
    repos: &Repositories,
    id: i64,
    mut changes: UpdateEndpointRequest,
) -> Result<Endpoint, AppError> {
    if let Some(raw) = changes.post_type.take() {
        changes.post_type = Some(validated_post_type(&raw)?);
    }
    if let Some(limit) = changes.rate_limit_per_minute {
        // The store treats 0 as "no limit"
        changes.rate_limit_per_minute = Some(validated_rate_limit(Some(limit))?.unwrap_or(0));
    }

    let endpoint = repos
        .endpoints
        .update(id, changes)
        .await?
        .ok_or_else(|| AppError::NotFound("Endpoint".to_string()))?;

    tracing::info!(endpoint_id = id, "Endpoint updated");
    Ok(endpoint)
}

pub async fn set_enabled(repos: &Repositories, id: i64, enabled: bool) -> Result<Endpoint, AppError> {
    let endpoint = update_endpoint(
        repos,
        id,
        UpdateEndpointRequest {
            enabled: Some(enabled),
            ..Default::default()
        },
    )
    .await?;
    tracing::info!(endpoint_id = id, enabled, "Endpoint toggled");
    Ok(endpoint)
}

/// Delete an endpoint with its fields and permissions.
pub async fn delete_endpoint(repos: &Repositories, id: i64) -> Result<(), AppError> {
    if !repos.endpoints.delete(id).await? {
        return Err(AppError::NotFound("Endpoint".to_string()));
    }
    tracing::info!(endpoint_id = id, "Endpoint deleted");
    Ok(())
}

/// Add a field to an existing endpoint.
///
/// # Errors
///
/// - `Validation("field_type")`: unknown type, rejected before storage
/// - `NotFound`: no such endpoint
/// - `Conflict`: the endpoint already has a field with this name
pub async fn add_field(
    repos: &Repositories,
    endpoint_id: i64,
    request: CreateFieldRequest,
) -> Result<Field, AppError> {
    let field = new_field(endpoint_id, request)?;
    if repos.endpoints.find(endpoint_id).await?.is_none() {
        return Err(AppError::NotFound("Endpoint".to_string()));
    }

    let field = repos.fields.insert(field).await?;
    tracing::info!(endpoint_id, field = %field.field_name, "Field added");
    Ok(field)
}

pub async fn list_fields(repos: &Repositories, endpoint_id: i64) -> Result<Vec<Field>, AppError> {
    if repos.endpoints.find(endpoint_id).await?.is_none() {
        return Err(AppError::NotFound("Endpoint".to_string()));
    }
    repos.fields.list_for_endpoint(endpoint_id).await
}

pub async fn delete_field(
    repos: &Repositories,
    endpoint_id: i64,
    field_id: i64,
) -> Result<(), AppError> {
    if !repos.fields.delete(endpoint_id, field_id).await? {
        return Err(AppError::NotFound("Field".to_string()));
    }
    Ok(())
}
