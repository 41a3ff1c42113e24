//! Runtime settings backed by the `settings` table.
//!
//! Values are JSON, cached in memory and read through typed accessors.
//! Keys may address nested objects with dots: `limits.max_per_page` reads
//! `{"max_per_page": ..}` stored under `limits`.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::RwLock;

use crate::error::AppError;
use crate::repositories::SettingsRepository;

/// Width of `settings.key`.
const MAX_KEY_LEN: usize = 191;

/// Upper bound for `api_key_expiry_days` (about a century).
pub const MAX_API_KEY_TTL_DAYS: i64 = 36_500;
/// Upper bound for `token_ttl_minutes` (one year).
pub const MAX_TOKEN_TTL_MINUTES: i64 = 525_600;

/// Inclusive range accepted for integer settings that feed date arithmetic.
fn bounds(key: &str) -> Option<(i64, i64)> {
    match key {
        "api_key_expiry_days" => Some((0, MAX_API_KEY_TTL_DAYS)),
        "token_ttl_minutes" => Some((1, MAX_TOKEN_TTL_MINUTES)),
        _ => None,
    }
}

fn check_bounds(key: &str, value: &Value) -> Result<(), AppError> {
    let Some((min, max)) = bounds(key) else {
        return Ok(());
    };
    let n = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    match n {
        Some(n) if (min..=max).contains(&n) => Ok(()),
        _ => Err(AppError::validation(
            key,
            format!("must be an integer between {min} and {max}"),
        )),
    }
}

/// Defaults written on activation when the key is absent.
pub fn defaults() -> Vec<(&'static str, Value)> {
    vec![
        ("version", json!(env!("CARGO_PKG_VERSION"))),
        ("db_version", json!("1.0.0")),
        ("enabled", json!(true)),
        ("require_api_key", json!(true)),
        ("api_key_expiry_days", json!(90)),
        ("token_ttl_minutes", json!(60)),
        ("log_requests", json!(true)),
        ("log_retention_days", json!(30)),
        ("cache_ttl", json!(86400)),
        ("max_endpoints", json!(100)),
        ("openapi_auto_refresh", json!(true)),
    ]
}

pub struct SettingsService {
    repo: Arc<dyn SettingsRepository>,
    cache: RwLock<HashMap<String, Value>>,
}

impl SettingsService {
    pub fn new(repo: Arc<dyn SettingsRepository>) -> Self {
        Self {
            repo,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Reload every setting from the store into the cache.
    pub async fn reload(&self) -> Result<(), AppError> {
        let rows = self.repo.all().await?;
        let mut cache = self.cache.write().await;
        cache.clear();
        cache.extend(rows.into_iter().map(|row| (row.key, row.value)));
        tracing::debug!(count = cache.len(), "Settings loaded");
        Ok(())
    }

    /// Write each default whose key is absent; existing values are never touched.
    ///
    /// Returns the keys that were seeded.
    pub async fn seed_defaults(&self) -> Result<Vec<&'static str>, AppError> {
        let mut seeded = Vec::new();
        for (key, value) in defaults() {
            if self.repo.insert_if_absent(key, value).await? {
                seeded.push(key);
            }
        }
        self.reload().await?;
        Ok(seeded)
    }

    /// Raw value for `key`, following dots into nested objects.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let cache = self.cache.read().await;
        if let Some(value) = cache.get(key) {
            return Some(value.clone());
        }

        let mut parts = key.split('.');
        let mut current = cache.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current.clone())
    }

    pub async fn has(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    /// Booleans accept JSON bools, 0/1 and the usual string spellings.
    pub async fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key).await {
            Some(Value::Bool(b)) => b,
            Some(Value::Number(n)) => n.as_i64().map(|n| n != 0).unwrap_or(default),
            Some(Value::String(s)) => match s.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => default,
            },
            _ => default,
        }
    }

    pub async fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.get(key).await {
            Some(Value::Number(n)) => n.as_i64().unwrap_or(default),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
            Some(Value::Bool(b)) => i64::from(b),
            _ => default,
        }
    }

    pub async fn get_string(&self, key: &str, default: &str) -> String {
        match self.get(key).await {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => default.to_string(),
        }
    }

    pub async fn get_array(&self, key: &str) -> Vec<Value> {
        match self.get(key).await {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        }
    }

    /// Persist a value and update the cache.
    pub async fn set(&self, key: &str, value: Value) -> Result<(), AppError> {
        self.write(key, value, false).await
    }

    /// Persist a value that is dropped on deactivation.
    pub async fn set_transient(&self, key: &str, value: Value) -> Result<(), AppError> {
        self.write(key, value, true).await
    }

    async fn write(&self, key: &str, value: Value, transient: bool) -> Result<(), AppError> {
        if key.trim().is_empty() {
            return Err(AppError::validation("key", "must not be empty"));
        }
        if key.chars().count() > MAX_KEY_LEN {
            return Err(AppError::validation(
                "key",
                format!("must be at most {MAX_KEY_LEN} characters"),
            ));
        }
        check_bounds(key, &value)?;
        self.repo.put(key, value.clone(), transient).await?;
        self.cache.write().await.insert(key.to_string(), value);
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<bool, AppError> {
        let removed = self.repo.delete(key).await?;
        self.cache.write().await.remove(key);
        Ok(removed)
    }

    /// Delete `key`, then write `default` if one is given.
    pub async fn reset(&self, key: &str, default: Option<Value>) -> Result<(), AppError> {
        self.delete(key).await?;
        if let Some(value) = default {
            self.set(key, value).await?;
        }
        Ok(())
    }

    /// Add `by` to an integer setting (missing counts as 0) and return the new value.
    pub async fn increment(&self, key: &str, by: i64) -> Result<i64, AppError> {
        let next = self.get_int(key, 0).await + by;
        self.set(key, json!(next)).await?;
        Ok(next)
    }

    /// Drop every transient setting, in the store and in the cache.
    pub async fn clear_transient(&self) -> Result<u64, AppError> {
        let removed = self.repo.delete_transient().await?;
        self.reload().await?;
        Ok(removed)
    }

    /// Snapshot of all cached settings.
    pub async fn all(&self) -> HashMap<String, Value> {
        self.cache.read().await.clone()
    }
}
