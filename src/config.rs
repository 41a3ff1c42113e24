//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.
//!
//! Runtime-tunable behaviour (key expiry, token lifetime, endpoint caps) lives in the
//! settings table instead, see `services::settings_service`.

use serde::Deserialize;

/// Process configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `ADMIN_TOKEN` (required): bearer token guarding the `/admin/v1` routes
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `DATABASE_MAX_CONNECTIONS` (optional): pool size, defaults to 5
/// - `DEFAULT_PER_PAGE` (optional): page size when a list request omits `per_page`, defaults to 10
/// - `MAX_PER_PAGE` (optional): largest accepted `per_page`, defaults to 100
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    pub admin_token: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    #[serde(default = "default_per_page")]
    pub default_per_page: u32,

    #[serde(default = "default_max_per_page")]
    pub max_per_page: u32,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    5
}

fn default_per_page() -> u32 {
    10
}

fn default_max_per_page() -> u32 {
    100
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL, ADMIN_TOKEN)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are automatically converted: database_url -> DATABASE_URL
        envy::from_env::<Config>()
    }
}

#[cfg(test)]
impl Config {
    /// Configuration used by unit tests; never touches the environment.
    pub fn for_tests() -> Self {
        Self {
            database_url: "postgres://localhost/unused".to_string(),
            admin_token: "test-admin-token".to_string(),
            server_port: default_port(),
            database_max_connections: default_max_connections(),
            default_per_page: default_per_page(),
            max_per_page: default_max_per_page(),
        }
    }
}
