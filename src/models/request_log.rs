//! Append-only request audit rows.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Maps to the `request_logs` table. Rows are never updated after insert.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct RequestLog {
    pub id: i64,

    /// Correlation id, also returned to the caller as `X-Request-Id`
    pub request_id: Uuid,

    pub api_key_id: Option<i64>,
    pub endpoint_id: Option<i64>,
    pub method: String,
    pub url_path: String,
    pub http_status: i32,
    pub response_time_ms: i64,
    pub request_size: i64,
    pub response_size: i64,
    pub error_message: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRequestLog {
    pub request_id: Uuid,
    pub api_key_id: Option<i64>,
    pub endpoint_id: Option<i64>,
    pub method: String,
    pub url_path: String,
    pub http_status: i32,
    pub response_time_ms: i64,
    pub request_size: i64,
    pub response_size: i64,
    pub error_message: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}
