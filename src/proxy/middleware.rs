//! Middleware implementations for the gateway

use crate::domain::RequestId;
use crate::proxy::auth::{Identity, SessionResolver};
use crate::proxy::headers::{bearer_token, header_str, X_FEATURE_PASSWORD, X_REQUEST_ID};
use crate::proxy::permissions::{FeaturePasswords, ADMIN_QUEUE_PERMISSION};
use crate::proxy::types::ProxyError;
use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Request ID middleware - ensures every request has a unique ID for tracing
///
/// A valid UUID in `x-request-id` is kept; anything else is replaced with a
/// fresh v7 ID. The ID is also stored as a [`RequestId`] extension.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
        .map(RequestId::new)
        .unwrap_or_else(RequestId::generate);

    // Hyphenated UUIDs are always valid header values
    let header_value = HeaderValue::from_str(&request_id.to_string()).ok();

    if let Some(value) = header_value.clone() {
        request.headers_mut().insert(X_REQUEST_ID, value);
    }
    request.extensions_mut().insert(request_id);

    let mut response = next.run(request).await;

    if let Some(value) = header_value {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }

    response
}

/// Identity middleware - resolves the bearer token into an [`Identity`]
///
/// Never rejects: unknown tokens become passthrough provider keys.
pub async fn identity_middleware(
    State(resolver): State<Arc<dyn SessionResolver>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = bearer_token(request.headers()).map(str::to_string);
    let identity = Identity::from_bearer(resolver.as_ref(), token.as_deref()).await;
    request.extensions_mut().insert(identity);
    next.run(request).await
}

/// Guard for the queue administration routes
pub async fn admin_permission_middleware(
    State(passwords): State<Arc<FeaturePasswords>>,
    request: Request,
    next: Next,
) -> Response {
    let password = header_str(request.headers(), X_FEATURE_PASSWORD);
    if !passwords.has_permission(password, ADMIN_QUEUE_PERMISSION) {
        warn!(
            path = %request.uri().path(),
            permission = ADMIN_QUEUE_PERMISSION,
            "Feature password check failed"
        );
        let error = ProxyError::PermissionDenied {
            permission: ADMIN_QUEUE_PERMISSION.to_string(),
        };
        return match request.extensions().get::<RequestId>() {
            Some(request_id) => error.into_response_for(request_id),
            None => error.into_response(),
        };
    }
    next.run(request).await
}

/// Logging middleware - logs request/response details with timing
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    info!(
        request_id = request_id,
        method = %method,
        path = %uri.path(),
        "Incoming request"
    );

    let response = next.run(request).await;
    let duration = start.elapsed();

    info!(
        request_id = request_id,
        method = %method,
        path = %uri.path(),
        status = response.status().as_u16(),
        duration_ms = duration.as_millis(),
        "Request completed"
    );

    response
}
