//! Unified error response handling for the gateway
//!
//! Every error leaving the HTTP boundary uses the OpenAI-style envelope
//! `{ "error": { "message", "type", "code" } }` and carries the request ID
//! for correlation.

use crate::domain::RequestId;
use crate::proxy::headers::{self, content_types, sse, X_REQUEST_ID};
use crate::proxy::types::ProxyError;
use crate::streaming::SSE_DONE;
use axum::{
    body::Body,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Status used when the client or a caller cancelled the request
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Standard error response format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub message: String,
    /// Error category, mirroring OpenAI's `type` field
    #[serde(rename = "type")]
    pub error_type: String,
    /// Unique error code for programmatic handling
    pub code: String,
    /// Request ID for correlation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Serialize)]
struct Envelope<'a> {
    error: &'a ErrorResponse,
}

impl ErrorResponse {
    pub fn new(
        error_type: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            error_type: error_type.into(),
            code: code.into(),
            request_id: None,
        }
    }

    /// Add request ID for correlation
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// The `{ "error": ... }` JSON body
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "error": self })
    }

    /// Convert to HTTP response with proper headers
    pub fn into_response_with_status(self, status: StatusCode) -> Response {
        let request_id = self.request_id.clone();
        let mut response = (status, Json(Envelope { error: &self })).into_response();

        if let Some(id) = request_id {
            if let Ok(header_value) = HeaderValue::from_str(&id) {
                response.headers_mut().insert(X_REQUEST_ID, header_value);
            }
        }

        response
    }

    /// Report the error inside an event stream
    ///
    /// Streaming clients only read SSE records, so the error is sent as one
    /// `data:` record followed by the terminal `[DONE]` record.
    pub fn into_sse_response(self) -> Response {
        let body = format!("data: {}\n\n{SSE_DONE}", self.to_json());
        let mut response = Response::new(Body::from(body));
        let response_headers = response.headers_mut();
        response_headers.insert(
            headers::CONTENT_TYPE,
            HeaderValue::from_static(content_types::TEXT_EVENT_STREAM),
        );
        response_headers.insert(headers::CACHE_CONTROL, HeaderValue::from_static(sse::CACHE_CONTROL));
        response_headers.insert(headers::CONNECTION, HeaderValue::from_static(sse::CONNECTION));
        if let Some(id) = self.request_id.as_deref() {
            if let Ok(header_value) = HeaderValue::from_str(id) {
                response_headers.insert(X_REQUEST_ID, header_value);
            }
        }
        response
    }
}

/// Extension trait for consistent error formatting
pub trait ErrorResponseExt {
    /// Convert to standardized error response
    fn to_error_response(&self) -> ErrorResponse;

    /// Get the appropriate HTTP status code
    fn status_code(&self) -> StatusCode;
}

impl ErrorResponseExt for ProxyError {
    fn to_error_response(&self) -> ErrorResponse {
        use ProxyError::*;

        let message = self.to_string();
        match self {
            InvalidRequest(_) => ErrorResponse::new("invalid_request_error", "invalid_request", message),
            Unauthorized(_) => ErrorResponse::new("authentication_error", "unauthorized", message),
            PermissionDenied { .. } => {
                ErrorResponse::new("permission_error", "invalid_feature_password", message)
            }
            InsufficientBalance { .. } => {
                ErrorResponse::new("billing_error", "insufficient_balance", message)
            }
            Superseded { .. } => ErrorResponse::new("conflict_error", "request_superseded", message),
            Unavailable(_) => ErrorResponse::new("api_error", "service_unavailable", message),
            ProviderNotConfigured(_) => {
                ErrorResponse::new("api_error", "provider_not_configured", message)
            }
            Upstream(_) => ErrorResponse::new("upstream_error", "upstream_error", message),
            Aborted => ErrorResponse::new("api_error", "request_aborted", message),
            Internal(_) => ErrorResponse::new("api_error", "internal_error", message),
        }
    }

    fn status_code(&self) -> StatusCode {
        use ProxyError::*;

        match self {
            InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Unauthorized(_) => StatusCode::UNAUTHORIZED,
            PermissionDenied { .. } => StatusCode::FORBIDDEN,
            InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
            Superseded { .. } => StatusCode::CONFLICT,
            Unavailable(_) | ProviderNotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            Upstream(_) => StatusCode::BAD_GATEWAY,
            Aborted => StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ProxyError {
    /// Render with the request ID in both the body and the header
    pub fn into_response_for(self, request_id: &RequestId) -> Response {
        let status = self.status_code();
        self.to_error_response()
            .with_request_id(request_id.to_string())
            .into_response_with_status(status)
    }
}

/// Error conversion for Axum responses using standardized format
impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        self.to_error_response().into_response_with_status(status)
    }
}
