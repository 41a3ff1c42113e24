//! API Key model for authentication.
//!
//! API keys identify callers of dynamic endpoints. They are stored in the database as SHA-256 hashes;
//! the plaintext secret is shown exactly once, when the key is issued.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Represents an API key record from the database.
///
/// # Database Table
///
/// Maps to the `api_keys` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKey {
    /// Unique identifier for this API key
    pub id: i64,

    /// SHA-256 hash of the actual API key (64 hex characters)
    ///
    /// When a request comes in with "Bearer olk_abc123", we:
    /// 1. Hash "olk_abc123" with SHA-256
    /// 2. Look up this hash in the database
    /// 3. If found, active and unexpired, authenticate the request
    pub key_hash: String,

    /// Human-readable name of the caller using this key
    pub name: String,

    pub description: Option<String>,

    /// Optional owning user in the host system
    pub user_id: Option<i64>,

    /// Whether this API key is currently active
    ///
    /// Inactive keys are rejected during authentication, and so are all tokens derived from them.
    pub is_active: bool,

    pub last_used_at: Option<DateTime<Utc>>,

    /// Keys without an expiry never expire
    pub expires_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApiKey {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| now >= expires)
    }
}

/// Request body for issuing a new API key.
///
/// # JSON Example
///
/// ```json
/// {
///   "name": "Mobile app",
///   "user_id": 12,
///   "ttl_days": 30
/// }
/// ```
///
/// `ttl_days` falls back to the `api_key_expiry_days` setting; 0 means the key never expires.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueApiKeyRequest {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub user_id: Option<i64>,

    #[serde(default)]
    pub ttl_days: Option<u32>,
}

/// Validated API key ready for insertion.
#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub key_hash: String,
    pub name: String,
    pub description: Option<String>,
    pub user_id: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Response body for API key endpoints.
///
/// The `key` field is ONLY included in the issuance response.
#[derive(Debug, Serialize)]
pub struct ApiKeyResponse {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub user_id: Option<i64>,
    pub is_active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Convert database ApiKey to API ApiKeyResponse.
///
/// Drops the `key_hash`; it never leaves the service.
impl From<ApiKey> for ApiKeyResponse {
    fn from(key: ApiKey) -> Self {
        Self {
            id: key.id,
            name: key.name,
            description: key.description,
            user_id: key.user_id,
            is_active: key.is_active,
            last_used_at: key.last_used_at,
            expires_at: key.expires_at,
            created_at: key.created_at,
            key: None,
        }
    }
}

impl ApiKeyResponse {
    /// Attach the plaintext secret (only for issuance).
    pub fn with_secret(mut self, secret: String) -> Self {
        self.key = Some(secret);
        self
    }
}
