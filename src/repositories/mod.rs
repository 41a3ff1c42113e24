//! Typed data access, one trait per entity.
//!
//! Services depend on these traits only. `Repositories` is the container
//! wired once at startup: `Repositories::postgres` for the real store,
//! `Repositories::in_memory` for tests.
//!
//! # Store contract
//!
//! - Unique constraints fail with `AppError::Conflict`; exactly one of several
//!   concurrent inserts for the same key wins.
//! - Inserting a child whose parent is missing fails with `AppError::NotFound`.
//! - Deleting an endpoint removes its fields and permissions; deleting an API
//!   key removes its tokens and permissions.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::{
    api_key::{ApiKey, NewApiKey},
    content::{ContentItem, ContentPage, ContentQuery},
    endpoint::{Endpoint, NewEndpoint, UpdateEndpointRequest},
    field::{Field, NewField},
    permission::{NewPermission, Permission},
    request_log::{NewRequestLog, RequestLog},
    setting::Setting,
    token::{NewToken, Token},
};

#[cfg(test)]
pub mod memory;
pub mod postgres;

fn not_an_object() -> AppError {
    AppError::Storage("content data must be a JSON object".to_string())
}

/// Content data must be a JSON object (`content_items_data_object`).
fn ensure_object(data: &Value) -> Result<(), AppError> {
    if data.is_object() {
        Ok(())
    } else {
        Err(not_an_object())
    }
}

#[async_trait]
pub trait EndpointRepository: Send + Sync {
    async fn insert(&self, endpoint: NewEndpoint) -> Result<Endpoint, AppError>;
    async fn find(&self, id: i64) -> Result<Option<Endpoint>, AppError>;
    async fn find_by_name(&self, name: &str) -> Result<Option<Endpoint>, AppError>;
    async fn list(&self) -> Result<Vec<Endpoint>, AppError>;
    async fn count(&self) -> Result<u64, AppError>;
    /// Apply a partial update; `None` when the endpoint does not exist.
    async fn update(
        &self,
        id: i64,
        changes: UpdateEndpointRequest,
    ) -> Result<Option<Endpoint>, AppError>;
    /// Delete with cascade; returns whether a row was removed.
    async fn delete(&self, id: i64) -> Result<bool, AppError>;
}

#[async_trait]
pub trait FieldRepository: Send + Sync {
    async fn insert(&self, field: NewField) -> Result<Field, AppError>;
    /// Fields of an endpoint in creation order.
    async fn list_for_endpoint(&self, endpoint_id: i64) -> Result<Vec<Field>, AppError>;
    async fn delete(&self, endpoint_id: i64, field_id: i64) -> Result<bool, AppError>;
}

#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    async fn insert(&self, key: NewApiKey) -> Result<ApiKey, AppError>;
    async fn find(&self, id: i64) -> Result<Option<ApiKey>, AppError>;
    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, AppError>;
    async fn list(&self) -> Result<Vec<ApiKey>, AppError>;
    /// Returns whether the key exists.
    async fn set_active(&self, id: i64, active: bool) -> Result<bool, AppError>;
    async fn touch_last_used(&self, id: i64, at: DateTime<Utc>) -> Result<(), AppError>;
    async fn delete(&self, id: i64) -> Result<bool, AppError>;
}

#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn insert(&self, token: NewToken) -> Result<Token, AppError>;
    async fn find(&self, id: i64) -> Result<Option<Token>, AppError>;
    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<Token>, AppError>;
    async fn list_for_key(&self, api_key_id: i64) -> Result<Vec<Token>, AppError>;
    /// Set `revoked_at` unless already set. Returns whether the token exists.
    async fn revoke(&self, id: i64, at: DateTime<Utc>) -> Result<bool, AppError>;
}

#[async_trait]
pub trait PermissionRepository: Send + Sync {
    async fn insert(&self, permission: NewPermission) -> Result<Permission, AppError>;
    async fn find(
        &self,
        api_key_id: i64,
        endpoint_id: i64,
        method: &str,
    ) -> Result<Option<Permission>, AppError>;
    async fn list_for_key(&self, api_key_id: i64) -> Result<Vec<Permission>, AppError>;
    async fn delete(&self, api_key_id: i64, endpoint_id: i64, method: &str)
    -> Result<bool, AppError>;
}

#[async_trait]
pub trait RequestLogRepository: Send + Sync {
    async fn insert(&self, entry: NewRequestLog) -> Result<RequestLog, AppError>;
    /// Newest first.
    async fn recent(&self, limit: u32) -> Result<Vec<RequestLog>, AppError>;
}

#[async_trait]
pub trait ContentRepository: Send + Sync {
    async fn query(&self, query: &ContentQuery) -> Result<ContentPage, AppError>;
    async fn get(&self, post_type: &str, id: i64) -> Result<Option<ContentItem>, AppError>;
    async fn insert(&self, post_type: &str, data: Value) -> Result<ContentItem, AppError>;
    /// Replace (`merge = false`) or shallow-merge (`merge = true`) the data object.
    async fn update(
        &self,
        post_type: &str,
        id: i64,
        data: Value,
        merge: bool,
    ) -> Result<Option<ContentItem>, AppError>;
    async fn delete(&self, post_type: &str, id: i64) -> Result<bool, AppError>;
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn all(&self) -> Result<Vec<Setting>, AppError>;
    /// Insert or overwrite.
    async fn put(&self, key: &str, value: Value, transient: bool) -> Result<(), AppError>;
    /// Insert only when the key is absent; returns whether a row was written.
    async fn insert_if_absent(&self, key: &str, value: Value) -> Result<bool, AppError>;
    async fn delete(&self, key: &str) -> Result<bool, AppError>;
    /// Remove every transient row; returns how many were removed.
    async fn delete_transient(&self) -> Result<u64, AppError>;
}

/// The typed dependency container handed to every service.
#[derive(Clone)]
pub struct Repositories {
    pub endpoints: Arc<dyn EndpointRepository>,
    pub fields: Arc<dyn FieldRepository>,
    pub api_keys: Arc<dyn ApiKeyRepository>,
    pub tokens: Arc<dyn TokenRepository>,
    pub permissions: Arc<dyn PermissionRepository>,
    pub logs: Arc<dyn RequestLogRepository>,
    pub content: Arc<dyn ContentRepository>,
    pub settings: Arc<dyn SettingsRepository>,
}

impl Repositories {
    /// Repositories backed by PostgreSQL.
    pub fn postgres(pool: DbPool) -> Self {
        Self::from_store(Arc::new(postgres::PgStore::new(pool)))
    }

    /// Repositories backed by one shared in-memory store.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(memory::MemoryStore::default()))
    }

    fn from_store<S>(store: Arc<S>) -> Self
    where
        S: EndpointRepository
            + FieldRepository
            + ApiKeyRepository
            + TokenRepository
            + PermissionRepository
            + RequestLogRepository
            + ContentRepository
            + SettingsRepository
            + 'static,
    {
        Self {
            endpoints: store.clone(),
            fields: store.clone(),
            api_keys: store.clone(),
            tokens: store.clone(),
            permissions: store.clone(),
            logs: store.clone(),
            content: store.clone(),
            settings: store,
        }
    }
}
