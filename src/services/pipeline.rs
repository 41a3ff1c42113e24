//! Request pipeline for dynamic endpoints.
//!
//! Every request walks the same stages in order:
//!
//! ```text
//! Received -> Authenticated -> Authorized -> ShapeValidated -> RateChecked -> Executed -> Logged
//! ```
//!
//! The first failing stage decides the response. Whatever the outcome, the
//! request is written to the request log exactly once before the response
//! leaves the pipeline.

use std::time::Instant;

use axum::{
    Json,
    body::Bytes,
    http::{HeaderName, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use tracing::Instrument;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::{AppError, AuthFailure};
use crate::models::{content::project, request_log::NewRequestLog};
use crate::services::{
    authorization_service,
    credential_service::{self, Credential, Principal},
    endpoint_resolver::{self, RequestShape, ResolvedEndpoint},
    rate_limiter::RateDecision,
};

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
const RATE_LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const RATE_REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

// Column widths in `request_logs`
const MAX_METHOD_LEN: usize = 10;
const MAX_URL_PATH_LEN: usize = 255;
const MAX_USER_AGENT_LEN: usize = 500;
const MAX_IP_ADDRESS_LEN: usize = 45;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Authenticated,
    Authorized,
    ShapeValidated,
    RateChecked,
    Executed,
    Logged,
}

/// A request addressed to a dynamic endpoint, already lifted off the wire.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub endpoint_name: String,
    /// Raw `{id}` path segment, if any
    pub item_id: Option<String>,
    pub credential: Option<Credential>,
    /// Raw query string, still percent-encoded
    pub query: Option<String>,
    pub body: Bytes,
    /// The body exceeded `MAX_BODY_BYTES` and was dropped unread
    pub body_too_large: bool,
    pub url_path: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Final pipeline output.
#[derive(Debug)]
pub struct ApiResponse {
    pub request_id: Uuid,
    pub status: StatusCode,
    pub body: Option<Value>,
    pub rate: Option<RateDecision>,
    pub retry_after_secs: Option<u64>,
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let mut response = match self.body {
            Some(body) => (self.status, Json(body)).into_response(),
            None => self.status.into_response(),
        };

        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&self.request_id.to_string()) {
            headers.insert(REQUEST_ID_HEADER, value);
        }
        if let Some(RateDecision {
            limit: Some(limit),
            remaining: Some(remaining),
            ..
        }) = self.rate
        {
            headers.insert(RATE_LIMIT_HEADER, HeaderValue::from(limit));
            headers.insert(RATE_REMAINING_HEADER, HeaderValue::from(remaining));
        }
        if let Some(secs) = self.retry_after_secs {
            headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }

        response
    }
}

/// The data operation a request maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    List,
    Get(i64),
    Create,
    Replace(i64),
    Merge(i64),
    Delete(i64),
}

impl Operation {
    fn from_request(method: &Method, item_id: Option<&str>) -> Result<Operation, AppError> {
        let id = item_id
            .map(|raw| {
                raw.parse::<i64>()
                    .ok()
                    .filter(|id| *id > 0)
                    .ok_or_else(|| AppError::validation("id", "must be a positive integer"))
            })
            .transpose()?;

        let id_required = || AppError::validation("id", "is required for this method");

        match *method {
            Method::GET | Method::HEAD => Ok(id.map_or(Operation::List, Operation::Get)),
            Method::POST if id.is_none() => Ok(Operation::Create),
            Method::POST => Err(AppError::validation("id", "must not be set when creating")),
            Method::PUT => id.map(Operation::Replace).ok_or_else(id_required),
            Method::PATCH => id.map(Operation::Merge).ok_or_else(id_required),
            Method::DELETE => id.map(Operation::Delete).ok_or_else(id_required),
            _ => Err(AppError::validation("method", "is not supported")),
        }
    }
}

/// Per-request bookkeeping carried through the stages.
struct Context {
    stage: Stage,
    endpoint_id: Option<i64>,
    api_key_id: Option<i64>,
    rate: Option<RateDecision>,
}

impl Context {
    fn advance(&mut self, stage: Stage) {
        tracing::trace!(from = ?self.stage, to = ?stage, "Pipeline stage");
        self.stage = stage;
    }
}

struct Success {
    status: StatusCode,
    body: Option<Value>,
}

/// Run one request through the pipeline.
pub async fn handle(state: &AppState, request: ApiRequest) -> ApiResponse {
    let request_id = Uuid::new_v4();
    let started = Instant::now();
    let span = tracing::info_span!(
        "api_request",
        %request_id,
        method = %request.method,
        endpoint = %request.endpoint_name
    );

    async move {
        let mut ctx = Context {
            stage: Stage::Received,
            endpoint_id: None,
            api_key_id: None,
            rate: None,
        };

        let outcome = process(state, &request, &mut ctx).await;

        let (status, body, retry_after_secs, error_message) = match outcome {
            Ok(success) => (success.status, success.body, None, None),
            Err(e) => {
                if e.is_internal() {
                    tracing::error!(stage = ?ctx.stage, error = %e, "Request failed");
                } else {
                    tracing::info!(stage = ?ctx.stage, error = %e, "Request rejected");
                }
                (e.status(), Some(e.body()), e.retry_after(), Some(e.to_string()))
            }
        };

        let response_size = body
            .as_ref()
            .and_then(|b| serde_json::to_vec(b).ok())
            .map_or(0, |bytes| bytes.len());

        record(
            state,
            NewRequestLog {
                request_id,
                api_key_id: ctx.api_key_id,
                endpoint_id: ctx.endpoint_id,
                method: truncate(request.method.as_str(), MAX_METHOD_LEN),
                url_path: truncate(&request.url_path, MAX_URL_PATH_LEN),
                http_status: i32::from(status.as_u16()),
                response_time_ms: started.elapsed().as_millis() as i64,
                request_size: request.body.len() as i64,
                response_size: response_size as i64,
                error_message,
                user_agent: request
                    .user_agent
                    .as_deref()
                    .map(|ua| truncate(ua, MAX_USER_AGENT_LEN)),
                ip_address: request
                    .ip_address
                    .as_deref()
                    .map(|ip| truncate(ip, MAX_IP_ADDRESS_LEN)),
            },
        )
        .await;
        ctx.advance(Stage::Logged);

        ApiResponse {
            request_id,
            status,
            body,
            rate: ctx.rate,
            retry_after_secs,
        }
    }
    .instrument(span)
    .await
}

async fn process(
    state: &AppState,
    request: &ApiRequest,
    ctx: &mut Context,
) -> Result<Success, AppError> {
    if !state.settings.get_bool("enabled", true).await {
        return Err(AppError::NotFound("Endpoint".to_string()));
    }
    let resolved = endpoint_resolver::resolve(&state.repos, &request.endpoint_name).await?;
    ctx.endpoint_id = Some(resolved.endpoint.id);

    let principal = authenticate(state, request, &resolved).await?;
    if let Some(principal) = &principal {
        tracing::debug!(
            api_key_id = principal.api_key.id,
            token_id = ?principal.token_id,
            "Caller authenticated"
        );
    }
    ctx.api_key_id = principal.as_ref().map(|p| p.api_key.id);
    ctx.advance(Stage::Authenticated);

    if resolved.endpoint.require_api_key {
        let api_key_id = ctx
            .api_key_id
            .ok_or(AppError::Authentication(AuthFailure::Missing))?;
        authorization_service::authorize(
            &state.repos,
            api_key_id,
            &resolved.endpoint,
            &request.method,
        )
        .await?;
    }
    ctx.advance(Stage::Authorized);

    if request.body_too_large {
        return Err(AppError::validation(
            "body",
            format!("must not exceed {MAX_BODY_BYTES} bytes"),
        ));
    }
    let operation = Operation::from_request(&request.method, request.item_id.as_deref())?;
    let shape = RequestShape::from_query(request.query.as_deref());
    let prepared = prepare(state, &resolved, operation, &shape, &request.body)?;
    ctx.advance(Stage::ShapeValidated);

    let decision = state
        .limiter
        .admit(ctx.api_key_id, &resolved.endpoint)
        .await;
    ctx.rate = Some(decision);
    if !decision.allowed {
        return Err(AppError::RateLimitExceeded {
            retry_after_secs: decision.retry_after_secs.unwrap_or(1),
        });
    }
    ctx.advance(Stage::RateChecked);

    let success = execute(state, &resolved, prepared).await?;
    ctx.advance(Stage::Executed);
    Ok(success)
}

/// Authenticate the caller.
///
/// Anonymous callers are only let through to public endpoints. A credential
/// sent to a public endpoint is still checked so the call is attributed.
async fn authenticate(
    state: &AppState,
    request: &ApiRequest,
    resolved: &ResolvedEndpoint,
) -> Result<Option<Principal>, AppError> {
    match &request.credential {
        Some(credential) => credential_service::authenticate(&state.repos, credential)
            .await
            .map(Some),
        None if resolved.endpoint.require_api_key => {
            Err(AppError::Authentication(AuthFailure::Missing))
        }
        None => Ok(None),
    }
}

/// A fully validated operation, ready to run against the content store.
enum Prepared {
    List(endpoint_resolver::ValidatedQuery),
    Get {
        id: i64,
        projection: Vec<(String, String)>,
    },
    Create(Value),
    Update {
        id: i64,
        data: Value,
        merge: bool,
    },
    Delete(i64),
}

fn prepare(
    state: &AppState,
    resolved: &ResolvedEndpoint,
    operation: Operation,
    shape: &RequestShape,
    body: &Bytes,
) -> Result<Prepared, AppError> {
    let prepared = match operation {
        Operation::List => {
            let pagination = endpoint_resolver::paginate(
                shape.page.as_deref(),
                shape.per_page.as_deref(),
                state.config.default_per_page,
                state.config.max_per_page,
            )?;
            Prepared::List(endpoint_resolver::validate_request_shape(
                resolved, shape, pagination,
            )?)
        }
        Operation::Get(id) => Prepared::Get {
            id,
            projection: endpoint_resolver::project_fields(resolved, shape.fields.as_deref())?,
        },
        Operation::Create => {
            Prepared::Create(endpoint_resolver::validate_write(resolved, &parse_body(body)?, false)?)
        }
        Operation::Replace(id) => Prepared::Update {
            id,
            data: endpoint_resolver::validate_write(resolved, &parse_body(body)?, false)?,
            merge: false,
        },
        Operation::Merge(id) => Prepared::Update {
            id,
            data: endpoint_resolver::validate_write(resolved, &parse_body(body)?, true)?,
            merge: true,
        },
        Operation::Delete(id) => Prepared::Delete(id),
    };
    Ok(prepared)
}

fn parse_body(body: &Bytes) -> Result<Value, AppError> {
    if body.is_empty() {
        return Err(AppError::validation("body", "a JSON object is required"));
    }
    serde_json::from_slice(body).map_err(|e| AppError::validation("body", e.to_string()))
}

async fn execute(
    state: &AppState,
    resolved: &ResolvedEndpoint,
    prepared: Prepared,
) -> Result<Success, AppError> {
    let post_type = resolved.endpoint.post_type.as_str();
    let content = &state.repos.content;
    let item_not_found = || AppError::NotFound("Item".to_string());

    match prepared {
        Prepared::List(validated) => {
            let page = content.query(&validated.query).await?;
            let data: Vec<Value> = page
                .items
                .iter()
                .map(|item| project(item, &validated.projection))
                .collect();

            Ok(Success {
                status: StatusCode::OK,
                body: Some(json!({
                    "data": data,
                    "meta": {
                        "page": validated.pagination.page,
                        "per_page": validated.pagination.per_page,
                        "total": page.total,
                        "total_pages": validated.pagination.total_pages(page.total),
                    }
                })),
            })
        }
        Prepared::Get { id, projection } => {
            let item = content
                .get(post_type, id)
                .await?
                .ok_or_else(item_not_found)?;
            Ok(Success {
                status: StatusCode::OK,
                body: Some(json!({ "data": project(&item, &projection) })),
            })
        }
        Prepared::Create(data) => {
            let item = content.insert(post_type, data).await?;
            tracing::info!(item_id = item.id, "Item created");
            Ok(Success {
                status: StatusCode::CREATED,
                body: Some(json!({ "data": project(&item, &resolved.visible_projection()) })),
            })
        }
        Prepared::Update { id, data, merge } => {
            let item = content
                .update(post_type, id, data, merge)
                .await?
                .ok_or_else(item_not_found)?;
            Ok(Success {
                status: StatusCode::OK,
                body: Some(json!({ "data": project(&item, &resolved.visible_projection()) })),
            })
        }
        Prepared::Delete(id) => {
            if !content.delete(post_type, id).await? {
                return Err(item_not_found());
            }
            tracing::info!(item_id = id, "Item deleted");
            Ok(Success {
                status: StatusCode::NO_CONTENT,
                body: None,
            })
        }
    }
}

/// Write the request log row. Failures are logged and swallowed.
async fn record(state: &AppState, entry: NewRequestLog) {
    if !state.settings.get_bool("log_requests", true).await {
        return;
    }
    if let Err(e) = state.repos.logs.insert(entry).await {
        tracing::warn!(error = %e, "Failed to write request log");
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}
