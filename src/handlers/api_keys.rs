//! Admin HTTP handlers for API keys and the tokens derived from them.
//!
//! The plaintext secret of a key or token is returned exactly once, in the
//! issuance response. Every other response carries metadata only.

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
        api_key::{ApiKeyResponse, IssueApiKeyRequest},
        token::{IssueTokenRequest, TokenResponse},
    },
    services::credential_service,
};

/// Issue a new API key.
///
/// # Request Body
///
/// ```json
/// { "name": "Mobile app", "ttl_days": 30 }
/// ```
///
/// # Response (201 Created)
///
/// ```json
/// {
///   "id": 3,
///   "name": "Mobile app",
///   "is_active": true,
///   "expires_at": "2026-01-30T10:00:00Z",
///   "key": "olk_5f0c..."
/// }
/// ```
pub async fn issue_api_key(
    State(state): State<AppState>,
    Json(request): Json<IssueApiKeyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (secret, key) =
        credential_service::issue_api_key(&state.repos, &state.settings, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiKeyResponse::from(key).with_secret(secret)),
    ))
}

pub async fn list_api_keys(
    State(state): State<AppState>,
) -> Result<Json<Vec<ApiKeyResponse>>, AppError> {
    let keys = credential_service::list_api_keys(&state.repos).await?;

    Ok(Json(keys.into_iter().map(ApiKeyResponse::from).collect()))
}

/// Deactivate a key; its tokens stop working with it.
pub async fn revoke_api_key(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    credential_service::revoke_api_key(&state.repos, id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Hard delete; tokens and permissions go with the key.
pub async fn delete_api_key(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    credential_service::delete_api_key(&state.repos, id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Issue a bearer token under an API key. An empty body uses the default lifetime.
pub async fn issue_token(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    request: Option<Json<IssueTokenRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let ttl_minutes = request.and_then(|Json(r)| r.ttl_minutes);
    let (secret, token) =
        credential_service::issue_token(&state.repos, &state.settings, id, ttl_minutes).await?;

    Ok((
        StatusCode::CREATED,
        Json(TokenResponse::from(token).with_secret(secret)),
    ))
}

pub async fn list_tokens(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<TokenResponse>>, AppError> {
    let tokens = credential_service::list_tokens(&state.repos, id).await?;

    Ok(Json(tokens.into_iter().map(TokenResponse::from).collect()))
}

pub async fn revoke_token(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    credential_service::revoke_token(&state.repos, id).await?;

    Ok(StatusCode::NO_CONTENT)
}
