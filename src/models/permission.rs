//! Permission matrix rows and the capability vocabulary.

use axum::http::Method;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// HTTP methods a permission row may be keyed by.
pub const GRANTABLE_METHODS: [&str; 5] = ["GET", "POST", "PUT", "PATCH", "DELETE"];

/// One of the four CRUD capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Read,
    Create,
    Update,
    Delete,
}

impl Capability {
    /// Capability a request method requires.
    ///
    /// Methods outside the CRUD vocabulary return `None` and are never authorized.
    pub fn for_method(method: &Method) -> Option<Capability> {
        match *method {
            Method::GET | Method::HEAD => Some(Capability::Read),
            Method::POST => Some(Capability::Create),
            Method::PUT | Method::PATCH => Some(Capability::Update),
            Method::DELETE => Some(Capability::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Read => "read",
            Capability::Create => "create",
            Capability::Update => "update",
            Capability::Delete => "delete",
        }
    }
}

/// Represents a permission record from the database.
///
/// # Database Table
///
/// Maps to the `permissions` table, unique on `(api_key_id, endpoint_id, method)`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Permission {
    pub id: i64,
    pub api_key_id: i64,
    pub endpoint_id: i64,

    /// Upper-case HTTP method this grant applies to
    pub method: String,

    pub can_read: bool,
    pub can_create: bool,
    pub can_update: bool,
    pub can_delete: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Permission {
    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::Read => self.can_read,
            Capability::Create => self.can_create,
            Capability::Update => self.can_update,
            Capability::Delete => self.can_delete,
        }
    }
}

/// Request body for granting a permission.
///
/// # JSON Example
///
/// ```json
/// {
///   "api_key_id": 3,
///   "endpoint_id": 1,
///   "method": "GET",
///   "can_read": true
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct GrantPermissionRequest {
    pub api_key_id: i64,
    pub endpoint_id: i64,

    #[serde(default = "default_method")]
    pub method: String,

    #[serde(default)]
    pub can_read: bool,
    #[serde(default)]
    pub can_create: bool,
    #[serde(default)]
    pub can_update: bool,
    #[serde(default)]
    pub can_delete: bool,
}

fn default_method() -> String {
    "GET".to_string()
}

/// Validated permission ready for insertion.
#[derive(Debug, Clone)]
pub struct NewPermission {
    pub api_key_id: i64,
    pub endpoint_id: i64,
    pub method: String,
    pub can_read: bool,
    pub can_create: bool,
    pub can_update: bool,
    pub can_delete: bool,
}

/// Method a request is looked up under in the matrix. HEAD shares the GET row.
pub fn permission_method(method: &Method) -> &str {
    if *method == Method::HEAD {
        Method::GET.as_str()
    } else {
        method.as_str()
    }
}

/// Upper-case and validate a method name for use as a permission key.
pub fn normalize_method(raw: &str) -> Result<String, AppError> {
    let method = raw.trim().to_ascii_uppercase();
    if GRANTABLE_METHODS.contains(&method.as_str()) {
        Ok(method)
    } else {
        Err(AppError::validation(
            "method",
            format!("must be one of {}", GRANTABLE_METHODS.join(", ")),
        ))
    }
}
