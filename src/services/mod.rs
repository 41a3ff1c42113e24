//! Business logic services.
//!
//! Services contain the core logic separated from HTTP handlers. They are
//! plain async functions over the `Repositories` container, so the same code
//! runs against PostgreSQL in production and the in-memory store in tests.

pub mod authorization_service;
pub mod credential_service;
pub mod endpoint_resolver;
pub mod endpoint_service;
pub mod pipeline;
pub mod rate_limiter;
pub mod settings_service;
