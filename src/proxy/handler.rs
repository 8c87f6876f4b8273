//! Chat-completion endpoint
//!
//! Validation, permission and balance checks all happen before the request
//! reaches the scheduler. Non-streaming calls are billed inline; streamed
//! calls are billed by a finalizer once the relay ends.

use crate::domain::{CancellationKey, ChatCompletionRequest, RequestId, TokenUsage};
use crate::infrastructure::log_messages::billing as log_msg;
use crate::ledger::{draft_usage, UsageLedger};
use crate::providers::ProviderKind;
use crate::proxy::auth::Identity;
use crate::proxy::error_response::ErrorResponseExt;
use crate::proxy::headers::{
    self, content_types, header_str, sse, X_CANCELLATION_KEY, X_FEATURE_PASSWORD,
};
use crate::proxy::service::GatewayState;
use crate::proxy::types::{ProxyError, ProxyResult, INVALID_REQUEST_MESSAGE};
use crate::scheduler::{Delivery, Outcome, RequestOptions, SchedulerError, Submission};
use crate::streaming::{client_body, ClientSink, NormalizedChunk};
use axum::{
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use bytes::Bytes;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default, Deserialize)]
pub struct CompletionQuery {
    reasoning_to_content: Option<String>,
}

impl CompletionQuery {
    /// `reasoning_to_content=1|true`
    pub fn fold_reasoning(&self) -> bool {
        matches!(
            self.reasoning_to_content.as_deref().map(str::trim),
            Some("1") | Some("true")
        )
    }
}

/// Decode and validate an inbound body
pub fn parse_request(body: &[u8]) -> ProxyResult<ChatCompletionRequest> {
    let invalid = || ProxyError::InvalidRequest(INVALID_REQUEST_MESSAGE.to_string());
    let request: ChatCompletionRequest = serde_json::from_slice(body).map_err(|error| {
        debug!(%error, "Rejecting undecodable request body");
        invalid()
    })?;

    if request.model.trim().is_empty() || request.messages.is_empty() {
        return Err(invalid());
    }
    Ok(request)
}

/// `POST /v1/chat/completions`
pub async fn chat_completions(
    State(state): State<GatewayState>,
    Extension(request_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<CompletionQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(error) => return error.into_response_for(&request_id),
    };
    let stream = request.stream;

    let provider = ProviderKind::classify(&request.model);
    let permission = provider.permission();
    if !state
        .passwords
        .has_permission(header_str(&headers, X_FEATURE_PASSWORD), &permission)
    {
        warn!(%permission, model = %request.model, "Feature password check failed");
        let error = ProxyError::PermissionDenied { permission };
        if stream {
            return error
                .to_error_response()
                .with_request_id(request_id.to_string())
                .into_sse_response();
        }
        return error.into_response_for(&request_id);
    }

    let result = if stream {
        stream_completion(state, request_id, identity, &query, &headers, request).await
    } else {
        complete(state, request_id, identity, &query, &headers, request).await
    };

    result.unwrap_or_else(|error| error.into_response_for(&request_id))
}

/// Shared checks and options for both response modes
async fn prepare(
    state: &GatewayState,
    request_id: RequestId,
    identity: &Identity,
    query: &CompletionQuery,
    headers: &HeaderMap,
    request: ChatCompletionRequest,
) -> ProxyResult<RequestOptions> {
    if state.config.require_user && identity.user_id().is_none() {
        return Err(ProxyError::Unauthorized(
            "a platform session token is required".to_string(),
        ));
    }

    if let (Some(user_id), Some(ledger)) = (identity.user_id(), state.ledger.as_ref()) {
        let min_cents = ledger.estimate_reservation(&request);
        if let Err(error) = ledger.reserve(user_id, min_cents).await {
            info!(user_id = %user_id, min_cents, %error, "{}", log_msg::RESERVATION_REJECTED);
            return Err(error.into());
        }
    }

    let cancellation_key = header_str(headers, X_CANCELLATION_KEY)
        .and_then(|key| CancellationKey::try_new(key.to_string()).ok());

    let mut options = RequestOptions::new(request).with_cancellation_key(cancellation_key);
    options.request_id = request_id;
    options.credentials = identity.credentials().cloned();
    options.fold_reasoning = query.fold_reasoning();
    Ok(options)
}

async fn complete(
    state: GatewayState,
    request_id: RequestId,
    identity: Identity,
    query: &CompletionQuery,
    headers: &HeaderMap,
    request: ChatCompletionRequest,
) -> ProxyResult<Response> {
    let options = prepare(&state, request_id, &identity, query, headers, request).await?;
    let request = options.request.clone();

    // Dropping this future (client disconnect) cancels the upstream call
    let cancel = options.cancel.clone();
    let guard = cancel.drop_guard();
    let outcome = state.scheduler.submit(options, Delivery::Call).await;
    guard.disarm();

    let response = match outcome? {
        Outcome::Response(response) => response,
        Outcome::Streamed(_) => {
            return Err(ProxyError::Internal(
                "call produced a streamed outcome".to_string(),
            ))
        }
    };

    let generated = format!("{}{}", response.reasoning_content(), response.content());
    settle(
        state.ledger.as_ref(),
        &identity,
        request_id,
        &request,
        response.usage,
        &generated,
    )
    .await;

    Ok(Json(response).into_response())
}

async fn stream_completion(
    state: GatewayState,
    request_id: RequestId,
    identity: Identity,
    query: &CompletionQuery,
    headers: &HeaderMap,
    request: ChatCompletionRequest,
) -> ProxyResult<Response> {
    let options = prepare(&state, request_id, &identity, query, headers, request).await?;
    let request = options.request.clone();
    let cancel = options.cancel.clone();

    let (sink, rx) = ClientSink::channel();
    let submission = state
        .scheduler
        .submit(options, Delivery::Client(sink.clone()));

    tokio::spawn(finalize_stream(
        submission,
        sink,
        state.ledger.clone(),
        identity,
        request_id,
        request,
    ));

    Ok(sse_response(client_body(rx, cancel)))
}

/// Wait for a streamed request to end, then bill it
///
/// Requests rejected before dispatch never reach the relay, so their error
/// is written to the client here.
async fn finalize_stream(
    submission: Submission,
    sink: ClientSink,
    ledger: Option<UsageLedger>,
    identity: Identity,
    request_id: RequestId,
    request: ChatCompletionRequest,
) {
    match submission.await {
        Ok(Outcome::Streamed(summary)) => {
            let generated = summary.generated_text();
            if generated.is_empty() && summary.usage.is_none() {
                debug!(end = ?summary.end, "Stream produced no output; nothing to bill");
                return;
            }
            settle(
                ledger.as_ref(),
                &identity,
                request_id,
                &request,
                summary.usage,
                &generated,
            )
            .await;
        }
        Ok(Outcome::Response(_)) => {
            error!(request_id = %request_id, "Streamed request produced a complete response")
        }
        Err(SchedulerError::Execution(_)) => {}
        Err(error) => {
            debug!(%error, "Streamed request ended before dispatch");
            // The client may already be gone
            let _ = sink
                .send_raw(NormalizedChunk::failed(error.to_string()).to_sse())
                .await;
        }
    }
}

/// Bill a finished exchange; failures are logged, never surfaced
async fn settle(
    ledger: Option<&UsageLedger>,
    identity: &Identity,
    request_id: RequestId,
    request: &ChatCompletionRequest,
    usage: Option<TokenUsage>,
    generated: &str,
) {
    let Some(ledger) = ledger else {
        return;
    };
    let Some(user_id) = identity.user_id() else {
        debug!(request_id = %request_id, "{}", log_msg::NOT_BILLED);
        return;
    };

    let draft = draft_usage(user_id.clone(), request_id, request, usage, generated);
    match ledger.bill(draft).await {
        Ok(receipt) => debug!(
            request_id = %request_id,
            cost_cents = receipt.cost_cents,
            "Exchange settled"
        ),
        Err(error) => error!(
            request_id = %request_id,
            user_id = %user_id,
            %error,
            "{}",
            log_msg::BILLING_FAILED
        ),
    }
}

fn sse_response(body: axum::body::Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    let response_headers = response.headers_mut();
    response_headers.insert(
        headers::CONTENT_TYPE,
        HeaderValue::from_static(content_types::TEXT_EVENT_STREAM),
    );
    response_headers.insert(headers::CACHE_CONTROL, HeaderValue::from_static(sse::CACHE_CONTROL));
    response_headers.insert(headers::CONNECTION, HeaderValue::from_static(sse::CONNECTION));
    response
}
