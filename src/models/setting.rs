//! Key/value settings rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maps to the `settings` table.
///
/// Transient rows hold ephemeral state and are dropped on deactivation.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Setting {
    pub key: String,
    pub value: Value,
    pub is_transient: bool,
    pub updated_at: DateTime<Utc>,
}

/// Request body for writing one setting through the admin surface.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateSettingRequest {
    pub value: Value,
}
