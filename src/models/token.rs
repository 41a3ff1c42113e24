//! Short-lived bearer tokens derived from an API key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maps to the `tokens` table.
///
/// A token is valid iff `revoked_at` is unset, `expires_at` is in the future
/// and its parent API key is itself usable.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Token {
    pub id: i64,
    pub token_hash: String,
    pub api_key_id: i64,
    pub token_type: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Token {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone)]
pub struct NewToken {
    pub token_hash: String,
    pub api_key_id: i64,
    pub token_type: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Request body for issuing a token; `ttl_minutes` defaults to the `token_ttl_minutes` setting.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueTokenRequest {
    #[serde(default)]
    pub ttl_minutes: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub id: i64,
    pub api_key_id: i64,
    pub token_type: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl From<Token> for TokenResponse {
    fn from(token: Token) -> Self {
        Self {
            id: token.id,
            api_key_id: token.api_key_id,
            token_type: token.token_type,
            issued_at: token.issued_at,
            expires_at: token.expires_at,
            revoked_at: token.revoked_at,
            token: None,
        }
    }
}

impl TokenResponse {
    pub fn with_secret(mut self, secret: String) -> Self {
        self.token = Some(secret);
        self
    }
}
