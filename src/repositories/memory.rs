//! In-memory implementation of every repository trait.
//!
//! Mirrors the Postgres schema's constraints: unique keys, foreign keys,
//! cascades and `VARCHAR(n)` widths are all checked under one write lock, so
//! concurrent writers see the same single-winner behaviour as the database.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;

use super::{
    ApiKeyRepository, ContentRepository, EndpointRepository, FieldRepository,
    PermissionRepository, RequestLogRepository, SettingsRepository, TokenRepository,
    ensure_object, not_an_object,
};
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

#[derive(Default)]
struct Tables {
    next_id: i64,
    endpoints: BTreeMap<i64, Endpoint>,
    fields: BTreeMap<i64, Field>,
    api_keys: BTreeMap<i64, ApiKey>,
    tokens: BTreeMap<i64, Token>,
    permissions: BTreeMap<i64, Permission>,
    logs: BTreeMap<i64, RequestLog>,
    content: BTreeMap<i64, ContentItem>,
    settings: BTreeMap<String, Setting>,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

fn missing_parent() -> AppError {
    AppError::NotFound("Referenced record".to_string())
}

/// Rejects values wider than the `VARCHAR(max)` column they would land in.
fn fits(column: &str, value: &str, max: usize) -> Result<(), AppError> {
    if value.chars().count() > max {
        return Err(AppError::Storage(format!(
            "value too long for {column} (character varying({max}))"
        )));
    }
    Ok(())
}

fn fits_opt(column: &str, value: Option<&str>, max: usize) -> Result<(), AppError> {
    value.map_or(Ok(()), |v| fits(column, v, max))
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

#[async_trait]
impl EndpointRepository for MemoryStore {
    async fn insert(&self, endpoint: NewEndpoint) -> Result<Endpoint, AppError> {
        fits("endpoints.name", &endpoint.name, 120)?;
        fits("endpoints.post_type", &endpoint.post_type, 20)?;
        let mut tables = self.tables.write().await;
        if tables.endpoints.values().any(|e| e.name == endpoint.name) {
            return Err(AppError::Conflict(
                "duplicate value violates endpoints_name_key".to_string(),
            ));
        }

        let now = Utc::now();
        let id = tables.allocate_id();
        let row = Endpoint {
            id,
            name: endpoint.name,
            description: endpoint.description,
            post_type: endpoint.post_type,
            enabled: endpoint.enabled,
            require_api_key: endpoint.require_api_key,
            rate_limit_per_minute: endpoint.rate_limit_per_minute,
            documentation: endpoint.documentation,
            created_at: now,
            updated_at: now,
        };
        tables.endpoints.insert(id, row.clone());
        Ok(row)
    }

    async fn find(&self, id: i64) -> Result<Option<Endpoint>, AppError> {
        Ok(self.tables.read().await.endpoints.get(&id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Endpoint>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables.endpoints.values().find(|e| e.name == name).cloned())
    }

    async fn list(&self) -> Result<Vec<Endpoint>, AppError> {
        Ok(self.tables.read().await.endpoints.values().cloned().collect())
    }

    async fn count(&self) -> Result<u64, AppError> {
        Ok(self.tables.read().await.endpoints.len() as u64)
    }

    async fn update(
        &self,
        id: i64,
        changes: UpdateEndpointRequest,
    ) -> Result<Option<Endpoint>, AppError> {
        fits_opt("endpoints.post_type", changes.post_type.as_deref(), 20)?;
        let mut tables = self.tables.write().await;
        let Some(endpoint) = tables.endpoints.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(description) = changes.description {
            endpoint.description = Some(description);
        }
        if let Some(post_type) = changes.post_type {
            endpoint.post_type = post_type;
        }
        if let Some(enabled) = changes.enabled {
            endpoint.enabled = enabled;
        }
        if let Some(require_api_key) = changes.require_api_key {
            endpoint.require_api_key = require_api_key;
        }
        if let Some(limit) = changes.rate_limit_per_minute {
            endpoint.rate_limit_per_minute = Some(limit);
        }
        if let Some(documentation) = changes.documentation {
            endpoint.documentation = Some(documentation);
        }
        endpoint.updated_at = Utc::now();

        Ok(Some(endpoint.clone()))
    }

    async fn delete(&self, id: i64) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        if tables.endpoints.remove(&id).is_none() {
            return Ok(false);
        }
        tables.fields.retain(|_, f| f.endpoint_id != id);
        tables.permissions.retain(|_, p| p.endpoint_id != id);
        Ok(true)
    }
}

#[async_trait]
impl FieldRepository for MemoryStore {
    async fn insert(&self, field: NewField) -> Result<Field, AppError> {
        fits("endpoint_fields.field_name", &field.field_name, 120)?;
        fits("endpoint_fields.field_type", field.field_type.as_str(), 50)?;
        fits_opt("endpoint_fields.field_label", field.field_label.as_deref(), 120)?;
        fits_opt("endpoint_fields.meta_key", field.meta_key.as_deref(), 120)?;
        let mut tables = self.tables.write().await;
        if !tables.endpoints.contains_key(&field.endpoint_id) {
            return Err(missing_parent());
        }
        if tables
            .fields
            .values()
            .any(|f| f.endpoint_id == field.endpoint_id && f.field_name == field.field_name)
        {
            return Err(AppError::Conflict(
                "duplicate value violates endpoint_fields_name_key".to_string(),
            ));
        }

        let now = Utc::now();
        let id = tables.allocate_id();
        let row = Field {
            id,
            endpoint_id: field.endpoint_id,
            field_name: field.field_name,
            field_type: field.field_type,
            field_label: field.field_label,
            is_required: field.is_required,
            is_searchable: field.is_searchable,
            is_sortable: field.is_sortable,
            is_filterable: field.is_filterable,
            show_in_response: field.show_in_response,
            meta_key: field.meta_key,
            created_at: now,
            updated_at: now,
        };
        tables.fields.insert(id, row.clone());
        Ok(row)
    }

    async fn list_for_endpoint(&self, endpoint_id: i64) -> Result<Vec<Field>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .fields
            .values()
            .filter(|f| f.endpoint_id == endpoint_id)
            .cloned()
            .collect())
    }

    async fn delete(&self, endpoint_id: i64, field_id: i64) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        match tables.fields.get(&field_id) {
            Some(field) if field.endpoint_id == endpoint_id => {
                tables.fields.remove(&field_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl ApiKeyRepository for MemoryStore {
    async fn insert(&self, key: NewApiKey) -> Result<ApiKey, AppError> {
        fits("api_keys.key_hash", &key.key_hash, 255)?;
        fits("api_keys.name", &key.name, 120)?;
        let mut tables = self.tables.write().await;
        if tables.api_keys.values().any(|k| k.key_hash == key.key_hash) {
            return Err(AppError::Conflict(
                "duplicate value violates api_keys_key_hash_key".to_string(),
            ));
        }

        let now = Utc::now();
        let id = tables.allocate_id();
        let row = ApiKey {
            id,
            key_hash: key.key_hash,
            name: key.name,
            description: key.description,
            user_id: key.user_id,
            is_active: true,
            last_used_at: None,
            expires_at: key.expires_at,
            created_at: now,
            updated_at: now,
        };
        tables.api_keys.insert(id, row.clone());
        Ok(row)
    }

    async fn find(&self, id: i64) -> Result<Option<ApiKey>, AppError> {
        Ok(self.tables.read().await.api_keys.get(&id).cloned())
    }

    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .api_keys
            .values()
            .find(|k| k.key_hash == key_hash)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<ApiKey>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables.api_keys.values().rev().cloned().collect())
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        match tables.api_keys.get_mut(&id) {
            Some(key) => {
                key.is_active = active;
                key.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn touch_last_used(&self, id: i64, at: DateTime<Utc>) -> Result<(), AppError> {
        if let Some(key) = self.tables.write().await.api_keys.get_mut(&id) {
            key.last_used_at = Some(at);
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        if tables.api_keys.remove(&id).is_none() {
            return Ok(false);
        }
        tables.tokens.retain(|_, t| t.api_key_id != id);
        tables.permissions.retain(|_, p| p.api_key_id != id);
        Ok(true)
    }
}

#[async_trait]
impl TokenRepository for MemoryStore {
    async fn insert(&self, token: NewToken) -> Result<Token, AppError> {
        fits("tokens.token_hash", &token.token_hash, 255)?;
        fits("tokens.token_type", &token.token_type, 50)?;
        let mut tables = self.tables.write().await;
        if !tables.api_keys.contains_key(&token.api_key_id) {
            return Err(missing_parent());
        }
        if tables.tokens.values().any(|t| t.token_hash == token.token_hash) {
            return Err(AppError::Conflict(
                "duplicate value violates tokens_token_hash_key".to_string(),
            ));
        }

        let id = tables.allocate_id();
        let row = Token {
            id,
            token_hash: token.token_hash,
            api_key_id: token.api_key_id,
            token_type: token.token_type,
            issued_at: token.issued_at,
            expires_at: token.expires_at,
            revoked_at: None,
        };
        tables.tokens.insert(id, row.clone());
        Ok(row)
    }

    async fn find(&self, id: i64) -> Result<Option<Token>, AppError> {
        Ok(self.tables.read().await.tokens.get(&id).cloned())
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<Token>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .tokens
            .values()
            .find(|t| t.token_hash == token_hash)
            .cloned())
    }

    async fn list_for_key(&self, api_key_id: i64) -> Result<Vec<Token>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .tokens
            .values()
            .rev()
            .filter(|t| t.api_key_id == api_key_id)
            .cloned()
            .collect())
    }

    async fn revoke(&self, id: i64, at: DateTime<Utc>) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        match tables.tokens.get_mut(&id) {
            Some(token) => {
                token.revoked_at.get_or_insert(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl PermissionRepository for MemoryStore {
    async fn insert(&self, permission: NewPermission) -> Result<Permission, AppError> {
        fits("permissions.method", &permission.method, 10)?;
        let mut tables = self.tables.write().await;
        if !tables.api_keys.contains_key(&permission.api_key_id)
            || !tables.endpoints.contains_key(&permission.endpoint_id)
        {
            return Err(missing_parent());
        }
        if tables.permissions.values().any(|p| {
            p.api_key_id == permission.api_key_id
                && p.endpoint_id == permission.endpoint_id
                && p.method == permission.method
        }) {
            return Err(AppError::Conflict(
                "duplicate value violates permissions_unique_grant".to_string(),
            ));
        }

        let now = Utc::now();
        let id = tables.allocate_id();
        let row = Permission {
            id,
            api_key_id: permission.api_key_id,
            endpoint_id: permission.endpoint_id,
            method: permission.method,
            can_read: permission.can_read,
            can_create: permission.can_create,
            can_update: permission.can_update,
            can_delete: permission.can_delete,
            created_at: now,
            updated_at: now,
        };
        tables.permissions.insert(id, row.clone());
        Ok(row)
    }

    async fn find(
        &self,
        api_key_id: i64,
        endpoint_id: i64,
        method: &str,
    ) -> Result<Option<Permission>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .permissions
            .values()
            .find(|p| p.api_key_id == api_key_id && p.endpoint_id == endpoint_id && p.method == method)
            .cloned())
    }

    async fn list_for_key(&self, api_key_id: i64) -> Result<Vec<Permission>, AppError> {
        let tables = self.tables.read().await;
        let mut permissions: Vec<Permission> = tables
            .permissions
            .values()
            .filter(|p| p.api_key_id == api_key_id)
            .cloned()
            .collect();
        permissions.sort_by(|a, b| {
            (a.endpoint_id, a.method.as_str()).cmp(&(b.endpoint_id, b.method.as_str()))
        });
        Ok(permissions)
    }

    async fn delete(
        &self,
        api_key_id: i64,
        endpoint_id: i64,
        method: &str,
    ) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        let before = tables.permissions.len();
        tables.permissions.retain(|_, p| {
            !(p.api_key_id == api_key_id && p.endpoint_id == endpoint_id && p.method == method)
        });
        Ok(tables.permissions.len() < before)
    }
}

#[async_trait]
impl RequestLogRepository for MemoryStore {
    async fn insert(&self, entry: NewRequestLog) -> Result<RequestLog, AppError> {
        fits("request_logs.method", &entry.method, 10)?;
        fits("request_logs.url_path", &entry.url_path, 255)?;
        fits_opt("request_logs.user_agent", entry.user_agent.as_deref(), 500)?;
        fits_opt("request_logs.ip_address", entry.ip_address.as_deref(), 45)?;
        let mut tables = self.tables.write().await;
        let id = tables.allocate_id();
        let row = RequestLog {
            id,
            request_id: entry.request_id,
            api_key_id: entry.api_key_id,
            endpoint_id: entry.endpoint_id,
            method: entry.method,
            url_path: entry.url_path,
            http_status: entry.http_status,
            response_time_ms: entry.response_time_ms,
            request_size: entry.request_size,
            response_size: entry.response_size,
            error_message: entry.error_message,
            user_agent: entry.user_agent,
            ip_address: entry.ip_address,
            created_at: Utc::now(),
        };
        tables.logs.insert(id, row.clone());
        Ok(row)
    }

    async fn recent(&self, limit: u32) -> Result<Vec<RequestLog>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .logs
            .values()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ContentRepository for MemoryStore {
    async fn query(&self, query: &ContentQuery) -> Result<ContentPage, AppError> {
        let tables = self.tables.read().await;
        let mut matching: Vec<&ContentItem> = tables
            .content
            .values()
            .filter(|item| query.matches(item))
            .collect();
        matching.sort_by(|a, b| query.compare(a, b));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .cloned()
            .collect();

        Ok(ContentPage { items, total })
    }

    async fn get(&self, post_type: &str, id: i64) -> Result<Option<ContentItem>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .content
            .get(&id)
            .filter(|item| item.post_type == post_type)
            .cloned())
    }

    async fn insert(&self, post_type: &str, data: Value) -> Result<ContentItem, AppError> {
        fits("content_items.post_type", post_type, 20)?;
        ensure_object(&data)?;

        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let id = tables.allocate_id();
        let row = ContentItem {
            id,
            post_type: post_type.to_string(),
            data,
            created_at: now,
            updated_at: now,
        };
        tables.content.insert(id, row.clone());
        Ok(row)
    }

    async fn update(
        &self,
        post_type: &str,
        id: i64,
        data: Value,
        merge: bool,
    ) -> Result<Option<ContentItem>, AppError> {
        let Value::Object(changes) = data else {
            return Err(not_an_object());
        };

        let mut tables = self.tables.write().await;
        let Some(item) = tables
            .content
            .get_mut(&id)
            .filter(|item| item.post_type == post_type)
        else {
            return Ok(None);
        };

        match (&mut item.data, merge) {
            (Value::Object(existing), true) => existing.extend(changes),
            (data, _) => *data = Value::Object(changes),
        }
        item.updated_at = Utc::now();

        Ok(Some(item.clone()))
    }

    async fn delete(&self, post_type: &str, id: i64) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        let owned = tables
            .content
            .get(&id)
            .is_some_and(|item| item.post_type == post_type);
        if owned {
            tables.content.remove(&id);
        }
        Ok(owned)
    }
}

#[async_trait]
impl SettingsRepository for MemoryStore {
    async fn all(&self) -> Result<Vec<Setting>, AppError> {
        Ok(self.tables.read().await.settings.values().cloned().collect())
    }

    async fn put(&self, key: &str, value: Value, transient: bool) -> Result<(), AppError> {
        fits("settings.key", key, 191)?;
        let mut tables = self.tables.write().await;
        tables.settings.insert(
            key.to_string(),
            Setting {
                key: key.to_string(),
                value,
                is_transient: transient,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn insert_if_absent(&self, key: &str, value: Value) -> Result<bool, AppError> {
        fits("settings.key", key, 191)?;
        let mut tables = self.tables.write().await;
        if tables.settings.contains_key(key) {
            return Ok(false);
        }
        tables.settings.insert(
            key.to_string(),
            Setting {
                key: key.to_string(),
                value,
                is_transient: false,
                updated_at: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.tables.write().await.settings.remove(key).is_some())
    }

    async fn delete_transient(&self) -> Result<u64, AppError> {
        let mut tables = self.tables.write().await;
        let before = tables.settings.len();
        tables.settings.retain(|_, s| !s.is_transient);
        Ok((before - tables.settings.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::field::FieldType;
    use std::sync::Arc;

    fn new_endpoint(name: &str) -> NewEndpoint {
        NewEndpoint {
            name: name.to_string(),
            description: None,
            post_type: "post".to_string(),
            enabled: true,
            require_api_key: true,
            rate_limit_per_minute: None,
            documentation: None,
        }
    }

    fn new_key(hash: &str) -> NewApiKey {
        NewApiKey {
            key_hash: hash.to_string(),
            name: "test".to_string(),
            description: None,
            user_id: None,
            expires_at: None,
        }
    }

    fn new_field(endpoint_id: i64, name: &str) -> NewField {
        NewField {
            endpoint_id,
            field_name: name.to_string(),
            field_type: FieldType::String,
            field_label: None,
            is_required: false,
            is_searchable: false,
            is_sortable: false,
            is_filterable: false,
            show_in_response: true,
            meta_key: None,
        }
    }

    fn grant(api_key_id: i64, endpoint_id: i64, method: &str) -> NewPermission {
        NewPermission {
            api_key_id,
            endpoint_id,
            method: method.to_string(),
            can_read: true,
            can_create: false,
            can_update: false,
            can_delete: false,
        }
    }

    #[tokio::test]
    async fn deleting_an_endpoint_cascades() {
        let store = MemoryStore::default();
        let endpoint = EndpointRepository::insert(&store, new_endpoint("articles"))
            .await
            .unwrap();
        let key = ApiKeyRepository::insert(&store, new_key("h1")).await.unwrap();
        FieldRepository::insert(&store, new_field(endpoint.id, "title"))
            .await
            .unwrap();
        PermissionRepository::insert(&store, grant(key.id, endpoint.id, "GET"))
            .await
            .unwrap();

        assert!(EndpointRepository::delete(&store, endpoint.id).await.unwrap());

        assert!(store.list_for_endpoint(endpoint.id).await.unwrap().is_empty());
        assert!(PermissionRepository::list_for_key(&store, key.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn deleting_a_key_cascades_to_tokens() {
        let store = MemoryStore::default();
        let key = ApiKeyRepository::insert(&store, new_key("h1")).await.unwrap();
        let now = Utc::now();
        TokenRepository::insert(
            &store,
            NewToken {
                token_hash: "t1".to_string(),
                api_key_id: key.id,
                token_type: "bearer".to_string(),
                issued_at: now,
                expires_at: now,
            },
        )
        .await
        .unwrap();

        assert!(ApiKeyRepository::delete(&store, key.id).await.unwrap());
        assert!(TokenRepository::find_by_hash(&store, "t1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn children_require_existing_parents() {
        let store = MemoryStore::default();

        let err = FieldRepository::insert(&store, new_field(999, "title"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = PermissionRepository::insert(&store, grant(1, 2, "GET"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn concurrent_inserts_have_one_winner() {
        let store = Arc::new(MemoryStore::default());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                EndpointRepository::insert(store.as_ref(), new_endpoint("articles")).await
            }));
        }

        let mut winners = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(AppError::Conflict(_)) => conflicts += 1,
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }

        assert_eq!(winners, 1);
        assert_eq!(conflicts, 7);
    }

    #[tokio::test]
    async fn duplicate_permission_triple_conflicts() {
        let store = MemoryStore::default();
        let endpoint = EndpointRepository::insert(&store, new_endpoint("articles"))
            .await
            .unwrap();
        let key = ApiKeyRepository::insert(&store, new_key("h1")).await.unwrap();

        PermissionRepository::insert(&store, grant(key.id, endpoint.id, "GET"))
            .await
            .unwrap();
        let err = PermissionRepository::insert(&store, grant(key.id, endpoint.id, "GET"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        // A different method is a different triple
        PermissionRepository::insert(&store, grant(key.id, endpoint.id, "POST"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn values_wider_than_their_column_are_rejected() {
        let store = MemoryStore::default();

        let mut endpoint = new_endpoint("articles");
        endpoint.post_type = "p".repeat(21);
        let err = EndpointRepository::insert(&store, endpoint).await.unwrap_err();
        assert!(matches!(err, AppError::Storage(msg) if msg.contains("endpoints.post_type")));

        let endpoint = EndpointRepository::insert(&store, new_endpoint("articles"))
            .await
            .unwrap();
        let mut field = new_field(endpoint.id, "title");
        field.meta_key = Some("m".repeat(121));
        let err = FieldRepository::insert(&store, field).await.unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));

        let err = SettingsRepository::put(&store, &"k".repeat(192), serde_json::json!(1), false)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));

        let err = ContentRepository::insert(&store, "post", serde_json::json!([1, 2]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));

        // Exactly at the limit is fine
        let mut endpoint = new_endpoint("pages");
        endpoint.post_type = "p".repeat(20);
        EndpointRepository::insert(&store, endpoint).await.unwrap();
    }

    #[tokio::test]
    async fn patch_merges_and_put_replaces() {
        let store = MemoryStore::default();
        let item = ContentRepository::insert(
            &store,
            "post",
            serde_json::json!({"title": "a", "body": "b"}),
        )
        .await
        .unwrap();

        let merged = ContentRepository::update(
            &store,
            "post",
            item.id,
            serde_json::json!({"title": "c"}),
            true,
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(merged.data, serde_json::json!({"title": "c", "body": "b"}));

        let replaced = ContentRepository::update(
            &store,
            "post",
            item.id,
            serde_json::json!({"title": "d"}),
            false,
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(replaced.data, serde_json::json!({"title": "d"}));

        // Other post types cannot see the item
        assert!(ContentRepository::get(&store, "page", item.id)
            .await
            .unwrap()
            .is_none());
    }
}
