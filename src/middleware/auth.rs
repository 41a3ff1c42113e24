//! Admin token authentication middleware.
//!
//! Guards every `/admin/v1` route. Dynamic endpoints authenticate inside the
//! request pipeline instead, because whether a credential is needed at all
//! depends on the endpoint being addressed.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::{
    app::AppState,
    error::{AppError, AuthFailure},
};

/// Extract the secret from an `Authorization: Bearer <secret>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Admin authentication middleware function.
///
/// # Flow
///
/// 1. Extract `Authorization: Bearer <token>` header from request
/// 2. Compare it with the configured `ADMIN_TOKEN` in constant time
/// 3. If equal: call next handler
/// 4. Otherwise: return 401 Unauthorized
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let presented =
        bearer_token(request.headers()).ok_or(AppError::Authentication(AuthFailure::Missing))?;

    let expected = state.config.admin_token.as_bytes();
    if expected.is_empty() || !bool::from(presented.as_bytes().ct_eq(expected)) {
        tracing::warn!(path = %request.uri().path(), "Rejected admin request");
        return Err(AppError::Authentication(AuthFailure::NotFound));
    }

    Ok(next.run(request).await)
}
