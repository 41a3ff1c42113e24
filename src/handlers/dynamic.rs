//! HTTP entry points for dynamic endpoints.
//!
//! - ANY /api/v1/{endpoint}       - list (GET) or create (POST)
//! - ANY /api/v1/{endpoint}/{id}  - get, replace, merge or delete one item
//!
//! These handlers only lift the request off the wire; everything else
//! happens in `services::pipeline`.

use std::net::SocketAddr;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, Path, Request, State},
    http::{HeaderMap, header, request::Parts},
    response::{IntoResponse, Response},
};

use crate::{
    app::AppState,
    middleware::auth::bearer_token,
    services::{
        credential_service::Credential,
        pipeline::{self, ApiRequest, MAX_BODY_BYTES},
    },
};

const API_KEY_HEADER: &str = "x-api-key";

/// Collection route: `/api/v1/{endpoint}`.
pub async fn collection(
    State(state): State<AppState>,
    Path(endpoint): Path<String>,
    request: Request,
) -> Response {
    dispatch(state, endpoint, None, request).await
}

/// Item route: `/api/v1/{endpoint}/{id}`.
pub async fn item(
    State(state): State<AppState>,
    Path((endpoint, id)): Path<(String, String)>,
    request: Request,
) -> Response {
    dispatch(state, endpoint, Some(id), request).await
}

async fn dispatch(
    state: AppState,
    endpoint_name: String,
    item_id: Option<String>,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();
    // An unreadable body still goes through the pipeline so it is logged
    let (body, body_too_large) = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => (bytes, false),
        Err(e) => {
            tracing::debug!(error = %e, limit = MAX_BODY_BYTES, "Request body rejected");
            (Bytes::new(), true)
        }
    };

    let api_request = ApiRequest {
        credential: credential(&parts.headers),
        user_agent: parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        ip_address: client_ip(&parts),
        query: parts.uri.query().map(str::to_string),
        url_path: parts.uri.path().to_string(),
        method: parts.method,
        endpoint_name,
        item_id,
        body,
        body_too_large,
    };

    pipeline::handle(&state, api_request).await.into_response()
}

/// `Authorization: Bearer <secret>` wins over `X-API-Key: <secret>`.
fn credential(headers: &HeaderMap) -> Option<Credential> {
    bearer_token(headers)
        .or_else(|| {
            headers
                .get(API_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        })
        .map(Credential::parse)
}

/// First `X-Forwarded-For` hop, else the peer address when the server
/// was started with connect info.
fn client_ip(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
}
