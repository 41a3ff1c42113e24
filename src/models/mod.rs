//! Data models representing database entities.
//!
//! This module contains all data structures that map to database tables,
//! plus the request and response bodies built from them.

/// API key authentication model
pub mod api_key;
/// Content items and list queries
pub mod content;
/// Endpoint definitions
pub mod endpoint;
/// Endpoint fields and value coercion
pub mod field;
/// Permission matrix
pub mod permission;
/// Request audit log
pub mod request_log;
/// Key/value settings
pub mod setting;
/// Tokens derived from API keys
pub mod token;
