//! Shared application state and the HTTP router.

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{any, delete, get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::db::DbPool;
use crate::handlers;
use crate::middleware;
use crate::repositories::Repositories;
use crate::services::{rate_limiter::RateLimiter, settings_service::SettingsService};

/// Everything a handler needs, built once by `lifecycle::init`.
#[derive(Clone)]
pub struct AppState {
    pub repos: Repositories,
    pub settings: Arc<SettingsService>,
    pub limiter: Arc<RateLimiter>,
    pub config: Arc<Config>,
    /// Present when backed by PostgreSQL
    pub pool: Option<DbPool>,
}

impl AppState {
    pub fn new(repos: Repositories, config: Config, pool: Option<DbPool>) -> Self {
        Self {
            settings: Arc::new(SettingsService::new(repos.settings.clone())),
            repos,
            limiter: Arc::new(RateLimiter::new()),
            config: Arc::new(config),
            pool,
        }
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self::new(Repositories::in_memory(), Config::for_tests(), None)
    }
}

/// Build the full router: dynamic endpoints, health, and the admin surface.
pub fn router(state: AppState) -> Router {
    let admin_routes = Router::new()
        // Endpoints and fields
        .route(
            "/endpoints",
            post(handlers::endpoints::create_endpoint).get(handlers::endpoints::list_endpoints),
        )
        .route(
            "/endpoints/{id}",
            get(handlers::endpoints::get_endpoint)
                .patch(handlers::endpoints::update_endpoint)
                .delete(handlers::endpoints::delete_endpoint),
        )
        .route(
            "/endpoints/{id}/enable",
            post(handlers::endpoints::enable_endpoint),
        )
        .route(
            "/endpoints/{id}/disable",
            post(handlers::endpoints::disable_endpoint),
        )
        .route(
            "/endpoints/{id}/fields",
            post(handlers::endpoints::add_field).get(handlers::endpoints::list_fields),
        )
        .route(
            "/endpoints/{id}/fields/{field_id}",
            delete(handlers::endpoints::delete_field),
        )
        // API keys and tokens
        .route(
            "/api-keys",
            post(handlers::api_keys::issue_api_key).get(handlers::api_keys::list_api_keys),
        )
        .route("/api-keys/{id}", delete(handlers::api_keys::delete_api_key))
        .route(
            "/api-keys/{id}/revoke",
            post(handlers::api_keys::revoke_api_key),
        )
        .route(
            "/api-keys/{id}/tokens",
            post(handlers::api_keys::issue_token).get(handlers::api_keys::list_tokens),
        )
        .route(
            "/api-keys/{id}/permissions",
            get(handlers::permissions::list_permissions),
        )
        .route("/tokens/{id}/revoke", post(handlers::api_keys::revoke_token))
        // Permissions
        .route(
            "/permissions",
            post(handlers::permissions::grant_permission)
                .delete(handlers::permissions::revoke_permission),
        )
        // Audit log and settings
        .route("/logs", get(handlers::admin::recent_logs))
        .route("/settings", get(handlers::admin::get_settings))
        .route("/settings/{key}", put(handlers::admin::put_setting))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::admin_auth_middleware,
        ));

    let api_routes = Router::new()
        .route("/api/v1/{endpoint}", any(handlers::dynamic::collection))
        .route("/api/v1/{endpoint}/{id}", any(handlers::dynamic::item))
        .layer(CorsLayer::permissive());

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .merge(api_routes)
        .nest("/admin/v1", admin_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
