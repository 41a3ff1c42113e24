//! PostgreSQL implementation of every repository trait.
//!
//! Uniqueness and cascades are enforced by the schema in `migrations/`;
//! constraint violations surface through `From<sqlx::Error> for AppError`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{Postgres, QueryBuilder};

use super::{
    ensure_object, ApiKeyRepository, ContentRepository, EndpointRepository, FieldRepository,
    PermissionRepository, RequestLogRepository, SettingsRepository, TokenRepository,
};
use crate::db::DbPool;
use crate::error::AppError;
use crate::models::{
    api_key::{ApiKey, NewApiKey},
    content::{ContentItem, ContentPage, ContentQuery, ContentSort},
    endpoint::{Endpoint, NewEndpoint, UpdateEndpointRequest},
    field::{Field, FieldType, NewField},
    permission::{NewPermission, Permission},
    request_log::{NewRequestLog, RequestLog},
    setting::Setting,
    token::{NewToken, Token},
};

/// All repositories over one connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EndpointRepository for PgStore {
    async fn insert(&self, endpoint: NewEndpoint) -> Result<Endpoint, AppError> {
        let endpoint = sqlx::query_as::<_, Endpoint>(
            r#"
            INSERT INTO endpoints (
                name, description, post_type, enabled,
                require_api_key, rate_limit_per_minute, documentation
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(endpoint.name)
        .bind(endpoint.description)
        .bind(endpoint.post_type)
        .bind(endpoint.enabled)
        .bind(endpoint.require_api_key)
        .bind(endpoint.rate_limit_per_minute)
        .bind(endpoint.documentation)
        .fetch_one(&self.pool)
        .await?;

        Ok(endpoint)
    }

    async fn find(&self, id: i64) -> Result<Option<Endpoint>, AppError> {
        let endpoint = sqlx::query_as::<_, Endpoint>("SELECT * FROM endpoints WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(endpoint)
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Endpoint>, AppError> {
        let endpoint = sqlx::query_as::<_, Endpoint>("SELECT * FROM endpoints WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(endpoint)
    }

    async fn list(&self) -> Result<Vec<Endpoint>, AppError> {
        let endpoints = sqlx::query_as::<_, Endpoint>("SELECT * FROM endpoints ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(endpoints)
    }

    async fn count(&self) -> Result<u64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM endpoints")
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }

    async fn update(
        &self,
        id: i64,
        changes: UpdateEndpointRequest,
    ) -> Result<Option<Endpoint>, AppError> {
        let endpoint = sqlx::query_as::<_, Endpoint>(
            r#"
            UPDATE endpoints
            SET description = COALESCE($2, description),
                post_type = COALESCE($3, post_type),
                enabled = COALESCE($4, enabled),
                require_api_key = COALESCE($5, require_api_key),
                rate_limit_per_minute = COALESCE($6, rate_limit_per_minute),
                documentation = COALESCE($7, documentation),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(changes.description)
        .bind(changes.post_type)
        .bind(changes.enabled)
        .bind(changes.require_api_key)
        .bind(changes.rate_limit_per_minute)
        .bind(changes.documentation)
        .fetch_optional(&self.pool)
        .await?;

        Ok(endpoint)
    }

    async fn delete(&self, id: i64) -> Result<bool, AppError> {
        // Fields and permissions go with it (ON DELETE CASCADE)
        let result = sqlx::query("DELETE FROM endpoints WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl FieldRepository for PgStore {
    async fn insert(&self, field: NewField) -> Result<Field, AppError> {
        let field = sqlx::query_as::<_, Field>(
            r#"
            INSERT INTO endpoint_fields (
                endpoint_id, field_name, field_type, field_label, is_required,
                is_searchable, is_sortable, is_filterable, show_in_response, meta_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(field.endpoint_id)
        .bind(field.field_name)
        .bind(field.field_type.as_str())
        .bind(field.field_label)
        .bind(field.is_required)
        .bind(field.is_searchable)
        .bind(field.is_sortable)
        .bind(field.is_filterable)
        .bind(field.show_in_response)
        .bind(field.meta_key)
        .fetch_one(&self.pool)
        .await?;

        Ok(field)
    }

    async fn list_for_endpoint(&self, endpoint_id: i64) -> Result<Vec<Field>, AppError> {
        let fields = sqlx::query_as::<_, Field>(
            "SELECT * FROM endpoint_fields WHERE endpoint_id = $1 ORDER BY id",
        )
        .bind(endpoint_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(fields)
    }

    async fn delete(&self, endpoint_id: i64, field_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM endpoint_fields WHERE id = $1 AND endpoint_id = $2")
            .bind(field_id)
            .bind(endpoint_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ApiKeyRepository for PgStore {
    async fn insert(&self, key: NewApiKey) -> Result<ApiKey, AppError> {
        let key = sqlx::query_as::<_, ApiKey>(
            r#"
            INSERT INTO api_keys (key_hash, name, description, user_id, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(key.key_hash)
        .bind(key.name)
        .bind(key.description)
        .bind(key.user_id)
        .bind(key.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(key)
    }

    async fn find(&self, id: i64) -> Result<Option<ApiKey>, AppError> {
        let key = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(key)
    }

    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, AppError> {
        // Inactive and expired keys are returned too so the caller can say why they fail
        let key = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE key_hash = $1")
            .bind(key_hash)
            .fetch_optional(&self.pool)
            .await?;

        Ok(key)
    }

    async fn list(&self) -> Result<Vec<ApiKey>, AppError> {
        let keys = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;

        Ok(keys)
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<bool, AppError> {
        let result =
            sqlx::query("UPDATE api_keys SET is_active = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(active)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn touch_last_used(&self, id: i64, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE api_keys SET last_used_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl TokenRepository for PgStore {
    async fn insert(&self, token: NewToken) -> Result<Token, AppError> {
        let token = sqlx::query_as::<_, Token>(
            r#"
            INSERT INTO tokens (token_hash, api_key_id, token_type, issued_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(token.token_hash)
        .bind(token.api_key_id)
        .bind(token.token_type)
        .bind(token.issued_at)
        .bind(token.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(token)
    }

    async fn find(&self, id: i64) -> Result<Option<Token>, AppError> {
        let token = sqlx::query_as::<_, Token>("SELECT * FROM tokens WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(token)
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<Token>, AppError> {
        let token = sqlx::query_as::<_, Token>("SELECT * FROM tokens WHERE token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;

        Ok(token)
    }

    async fn list_for_key(&self, api_key_id: i64) -> Result<Vec<Token>, AppError> {
        let tokens = sqlx::query_as::<_, Token>(
            "SELECT * FROM tokens WHERE api_key_id = $1 ORDER BY issued_at DESC",
        )
        .bind(api_key_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(tokens)
    }

    async fn revoke(&self, id: i64, at: DateTime<Utc>) -> Result<bool, AppError> {
        // First revocation wins
        let result =
            sqlx::query("UPDATE tokens SET revoked_at = COALESCE(revoked_at, $2) WHERE id = $1")
                .bind(id)
                .bind(at)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl PermissionRepository for PgStore {
    async fn insert(&self, permission: NewPermission) -> Result<Permission, AppError> {
        let permission = sqlx::query_as::<_, Permission>(
            r#"
            INSERT INTO permissions (
                api_key_id, endpoint_id, method,
                can_read, can_create, can_update, can_delete
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(permission.api_key_id)
        .bind(permission.endpoint_id)
        .bind(permission.method)
        .bind(permission.can_read)
        .bind(permission.can_create)
        .bind(permission.can_update)
        .bind(permission.can_delete)
        .fetch_one(&self.pool)
        .await?;

        Ok(permission)
    }

    async fn find(
        &self,
        api_key_id: i64,
        endpoint_id: i64,
        method: &str,
    ) -> Result<Option<Permission>, AppError> {
        let permission = sqlx::query_as::<_, Permission>(
            r#"
            SELECT * FROM permissions
            WHERE api_key_id = $1 AND endpoint_id = $2 AND method = $3
            "#,
        )
        .bind(api_key_id)
        .bind(endpoint_id)
        .bind(method)
        .fetch_optional(&self.pool)
        .await?;

        Ok(permission)
    }

    async fn list_for_key(&self, api_key_id: i64) -> Result<Vec<Permission>, AppError> {
        let permissions = sqlx::query_as::<_, Permission>(
            "SELECT * FROM permissions WHERE api_key_id = $1 ORDER BY endpoint_id, method",
        )
        .bind(api_key_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(permissions)
    }

    async fn delete(
        &self,
        api_key_id: i64,
        endpoint_id: i64,
        method: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "DELETE FROM permissions WHERE api_key_id = $1 AND endpoint_id = $2 AND method = $3",
        )
        .bind(api_key_id)
        .bind(endpoint_id)
        .bind(method)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl RequestLogRepository for PgStore {
    async fn insert(&self, entry: NewRequestLog) -> Result<RequestLog, AppError> {
        let log = sqlx::query_as::<_, RequestLog>(
            r#"
            INSERT INTO request_logs (
                request_id, api_key_id, endpoint_id, method, url_path, http_status,
                response_time_ms, request_size, response_size, error_message,
                user_agent, ip_address
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(entry.request_id)
        .bind(entry.api_key_id)
        .bind(entry.endpoint_id)
        .bind(entry.method)
        .bind(entry.url_path)
        .bind(entry.http_status)
        .bind(entry.response_time_ms)
        .bind(entry.request_size)
        .bind(entry.response_size)
        .bind(entry.error_message)
        .bind(entry.user_agent)
        .bind(entry.ip_address)
        .fetch_one(&self.pool)
        .await?;

        Ok(log)
    }

    async fn recent(&self, limit: u32) -> Result<Vec<RequestLog>, AppError> {
        let logs = sqlx::query_as::<_, RequestLog>(
            "SELECT * FROM request_logs ORDER BY created_at DESC, id DESC LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(logs)
    }
}

/// Append the WHERE clause shared by the count and page queries.
fn push_conditions(qb: &mut QueryBuilder<'_, Postgres>, query: &ContentQuery) {
    qb.push(" WHERE post_type = ").push_bind(query.post_type.clone());

    for filter in &query.filters {
        // jsonb containment compares numbers numerically and strings exactly
        let mut predicate = Map::new();
        predicate.insert(filter.key.clone(), filter.value.clone());
        qb.push(" AND data @> ").push_bind(Value::Object(predicate));
    }

    if let Some(search) = &query.search {
        let pattern = format!("%{}%", escape_like(&search.term));
        qb.push(" AND (");
        for (i, key) in search.keys.iter().enumerate() {
            if i > 0 {
                qb.push(" OR ");
            }
            qb.push("(data ->> ")
                .push_bind(key.clone())
                .push(") ILIKE ")
                .push_bind(pattern.clone());
        }
        qb.push(")");
    }
}

/// Append `ORDER BY`, sort keys first, then `id`.
///
/// Endpoints sharing a post type may store different JSON types under one
/// key, so typed casts only apply to values of the matching JSON type.
/// Anything else sorts as NULL, i.e. last.
fn push_order_by(qb: &mut QueryBuilder<'_, Postgres>, sorts: &[ContentSort]) {
    qb.push(" ORDER BY ");
    for sort in sorts {
        let cast = match sort.field_type {
            FieldType::Integer | FieldType::Number => Some(("number", "numeric")),
            FieldType::Boolean => Some(("boolean", "boolean")),
            FieldType::String | FieldType::Date | FieldType::Datetime => None,
        };
        match cast {
            Some((json_type, sql_type)) => {
                qb.push("CASE WHEN jsonb_typeof(data -> ")
                    .push_bind(sort.key.clone())
                    .push(format!(") = '{json_type}' THEN (data ->> "))
                    .push_bind(sort.key.clone())
                    .push(format!(")::{sql_type} END"));
            }
            None => {
                qb.push("(data ->> ").push_bind(sort.key.clone()).push(")");
            }
        }
        qb.push(" ")
            .push(sort.direction.as_sql())
            .push(" NULLS LAST, ");
    }
    qb.push("id ASC");
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[async_trait]
impl ContentRepository for PgStore {
    async fn query(&self, query: &ContentQuery) -> Result<ContentPage, AppError> {
        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM content_items");
        push_conditions(&mut count_qb, query);
        let total = count_qb
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT id, post_type, data, created_at, updated_at FROM content_items",
        );
        push_conditions(&mut qb, query);

        push_order_by(&mut qb, &query.sort);

        qb.push(" LIMIT ")
            .push_bind(i64::from(query.limit))
            .push(" OFFSET ")
            .push_bind(query.offset as i64);

        let items = qb
            .build_query_as::<ContentItem>()
            .fetch_all(&self.pool)
            .await?;

        Ok(ContentPage {
            items,
            total: total as u64,
        })
    }

    async fn get(&self, post_type: &str, id: i64) -> Result<Option<ContentItem>, AppError> {
        let item = sqlx::query_as::<_, ContentItem>(
            "SELECT * FROM content_items WHERE id = $1 AND post_type = $2",
        )
        .bind(id)
        .bind(post_type)
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    async fn insert(&self, post_type: &str, data: Value) -> Result<ContentItem, AppError> {
        ensure_object(&data)?;
        let item = sqlx::query_as::<_, ContentItem>(
            "INSERT INTO content_items (post_type, data) VALUES ($1, $2) RETURNING *",
        )
        .bind(post_type)
        .bind(data)
        .fetch_one(&self.pool)
        .await?;

        Ok(item)
    }

    async fn update(
        &self,
        post_type: &str,
        id: i64,
        data: Value,
        merge: bool,
    ) -> Result<Option<ContentItem>, AppError> {
        ensure_object(&data)?;
        let item = sqlx::query_as::<_, ContentItem>(
            r#"
            UPDATE content_items
            SET data = CASE WHEN $4 THEN data || $3 ELSE $3 END,
                updated_at = NOW()
            WHERE id = $1 AND post_type = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(post_type)
        .bind(data)
        .bind(merge)
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    async fn delete(&self, post_type: &str, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM content_items WHERE id = $1 AND post_type = $2")
            .bind(id)
            .bind(post_type)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SettingsRepository for PgStore {
    async fn all(&self) -> Result<Vec<Setting>, AppError> {
        let settings = sqlx::query_as::<_, Setting>("SELECT * FROM settings ORDER BY key")
            .fetch_all(&self.pool)
            .await?;

        Ok(settings)
    }

    async fn put(&self, key: &str, value: Value, transient: bool) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, is_transient)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value,
                is_transient = EXCLUDED.is_transient,
                updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(transient)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_if_absent(&self, key: &str, value: Value) -> Result<bool, AppError> {
        let result = sqlx::query(
            "INSERT INTO settings (key, value) VALUES ($1, $2) ON CONFLICT (key) DO NOTHING",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM settings WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_transient(&self) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM settings WHERE is_transient")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
