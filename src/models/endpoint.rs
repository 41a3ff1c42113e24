//! Endpoint data models and admin request/response types.
//!
//! This module defines:
//! - `Endpoint`: Database entity describing one configurable REST resource
//! - `CreateEndpointRequest` / `UpdateEndpointRequest`: admin request bodies
//! - `EndpointWithFields`: response body bundling an endpoint with its fields

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::field::{CreateFieldRequest, Field};

/// Represents an endpoint record from the database.
///
/// # Database Table
///
/// Maps to the `endpoints` table. Each endpoint:
/// - Has a globally unique, slug-safe `name` that becomes its URL segment
/// - Serves content items of one `post_type`
/// - Owns its fields and permissions (cascade delete)
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Endpoint {
    pub id: i64,

    /// URL segment, matches `[A-Za-z0-9_-]+`
    pub name: String,

    pub description: Option<String>,

    /// Content type served by this endpoint
    pub post_type: String,

    /// Disabled endpoints behave as if they did not exist
    pub enabled: bool,

    /// When false the endpoint is public: no authentication or authorization
    pub require_api_key: bool,

    /// Requests per minute per caller; `None` or 0 means unlimited
    pub rate_limit_per_minute: Option<i32>,

    pub documentation: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Endpoint {
    /// Effective per-minute limit, if any.
    pub fn rate_limit(&self) -> Option<u32> {
        self.rate_limit_per_minute
            .filter(|limit| *limit > 0)
            .map(|limit| limit as u32)
    }
}

/// Request body for creating an endpoint.
///
/// # JSON Example
///
/// ```json
/// {
///   "name": "articles",
///   "post_type": "post",
///   "rate_limit_per_minute": 60,
///   "fields": [
///     { "field_name": "title", "field_type": "string", "is_sortable": true }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CreateEndpointRequest {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default = "default_post_type")]
    pub post_type: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub require_api_key: bool,

    #[serde(default)]
    pub rate_limit_per_minute: Option<i32>,

    #[serde(default)]
    pub documentation: Option<String>,

    /// Fields created together with the endpoint
    #[serde(default)]
    pub fields: Vec<CreateFieldRequest>,
}

fn default_post_type() -> String {
    "post".to_string()
}

fn default_true() -> bool {
    true
}

/// Partial update of an endpoint. Absent keys are left unchanged.
///
/// `rate_limit_per_minute: 0` removes the limit.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateEndpointRequest {
    pub description: Option<String>,
    pub post_type: Option<String>,
    pub enabled: Option<bool>,
    pub require_api_key: Option<bool>,
    pub rate_limit_per_minute: Option<i32>,
    pub documentation: Option<String>,
}

/// Validated endpoint ready for insertion.
#[derive(Debug, Clone)]
pub struct NewEndpoint {
    pub name: String,
    pub description: Option<String>,
    pub post_type: String,
    pub enabled: bool,
    pub require_api_key: bool,
    pub rate_limit_per_minute: Option<i32>,
    pub documentation: Option<String>,
}

/// Endpoint together with its ordered fields.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointWithFields {
    #[serde(flatten)]
    pub endpoint: Endpoint,
    pub fields: Vec<Field>,
}
