//! HTTP header constants and utilities for the gateway
//!
//! This module centralizes header names, paths and content types used by
//! the HTTP boundary so handlers and middleware agree on spelling.

use axum::http::{header, HeaderMap};

/// Header name for request ID used for tracing and correlation
pub const X_REQUEST_ID: &str = "x-request-id";

/// Header carrying a feature password
pub const X_FEATURE_PASSWORD: &str = "x-feature-password";

/// Header carrying the caller's cancellation key
pub const X_CANCELLATION_KEY: &str = "x-cancellation-key";

/// Authorization header prefix for bearer tokens
pub const BEARER_PREFIX: &str = "Bearer ";

/// Standard header re-exports for convenience
pub use header::{AUTHORIZATION, CACHE_CONTROL, CONNECTION, CONTENT_TYPE};

/// Well-known paths
pub mod paths {
    pub const CHAT_COMPLETIONS: &str = "/v1/chat/completions";
    pub const CHAT_COMPLETIONS_ALIAS: &str = "/api/v1/chat/completions";
    pub const HEALTH: &str = "/health";
    pub const QUEUE_STATUS: &str = "/v1/queue/status";
    pub const QUEUE_CONCURRENCY: &str = "/v1/queue/concurrency";
    pub const QUEUE_ACTIVITY: &str = "/v1/queue/activity";
    pub const QUEUE_INTERVALS: &str = "/v1/queue/intervals";
}

/// Common content types
pub mod content_types {
    pub const APPLICATION_JSON: &str = "application/json";
    pub const TEXT_EVENT_STREAM: &str = "text/event-stream";
}

/// Header values for event-stream responses
pub mod sse {
    pub const CACHE_CONTROL: &str = "no-cache";
    pub const CONNECTION: &str = "keep-alive";
}

/// Non-empty value of a header as text
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Token of an `Authorization: Bearer` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = header_str(headers, AUTHORIZATION.as_str())?;
    let scheme = value.get(..BEARER_PREFIX.len())?;
    if !scheme.eq_ignore_ascii_case(BEARER_PREFIX) {
        return None;
    }
    Some(value[BEARER_PREFIX.len()..].trim()).filter(|token| !token.is_empty())
}
