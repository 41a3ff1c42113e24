//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, etc.)
//! 2. Delegates to a service
//! 3. Returns HTTP response (JSON, status code)

/// Request log and settings administration
pub mod admin;
/// API key and token administration
pub mod api_keys;
/// Dynamic endpoint entry points
pub mod dynamic;
/// Endpoint and field administration
pub mod endpoints;
/// Service health
pub mod health;
/// Permission administration
pub mod permissions;
