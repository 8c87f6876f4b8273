//! Types shared by the scheduler and its executors

use super::interval::IntervalSettings;
use crate::domain::{
    ApiKey, CancellationKey, ChatCompletionRequest, ChatCompletionResponse, RequestId, TokenUsage,
};
use crate::providers::{ProviderError, ProviderKind};
use crate::streaming::{ChunkCallback, ClientSink, StreamEnd};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Errors a submission can resolve to
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Request {id} was cancelled and replaced")]
    Superseded { id: String },

    #[error("Request aborted before start")]
    Aborted,

    #[error("Request scheduler destroyed")]
    Destroyed,

    #[error(transparent)]
    Execution(#[from] ProviderError),
}

/// How the result of a request is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestKind {
    #[display("call")]
    Call,
    #[display("stream-with-callback")]
    StreamWithCallback,
    #[display("stream-to-client")]
    StreamToClient,
}

/// Consumer of a request's output
pub enum Delivery {
    /// Resolve with the complete response
    Call,
    /// Hand every chunk to a callback and resolve with the aggregate
    Callback(ChunkCallback),
    /// Relay SSE bytes to an HTTP client
    Client(ClientSink),
}

impl Delivery {
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::Call => RequestKind::Call,
            Self::Callback(_) => RequestKind::StreamWithCallback,
            Self::Client(_) => RequestKind::StreamToClient,
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Delivery({})", self.kind())
    }
}

/// Normalized options of one logical request
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub request_id: RequestId,
    pub provider: ProviderKind,
    pub request: ChatCompletionRequest,
    /// Caller-supplied upstream key
    pub credentials: Option<ApiKey>,
    pub cancellation_key: Option<CancellationKey>,
    pub cancel: CancellationToken,
    pub fold_reasoning: bool,
}

impl RequestOptions {
    pub fn new(request: ChatCompletionRequest) -> Self {
        Self {
            request_id: RequestId::generate(),
            provider: ProviderKind::classify(&request.model),
            request,
            credentials: None,
            cancellation_key: None,
            cancel: CancellationToken::new(),
            fold_reasoning: false,
        }
    }

    pub fn with_cancellation_key(mut self, key: Option<CancellationKey>) -> Self {
        self.cancellation_key = key;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Assistant message assembled from a stream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedMessage {
    pub role: &'static str,
    pub content: String,
    pub reasoning_content: String,
    pub timestamp: DateTime<Utc>,
}

/// Result of a streamed request
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSummary {
    pub message: AggregatedMessage,
    pub finish_reason: Option<String>,
    /// Exact usage reported in the stream, if any
    pub usage: Option<TokenUsage>,
    pub end: StreamEnd,
}

impl StreamSummary {
    /// Text used to estimate completion tokens when usage is missing
    pub fn generated_text(&self) -> String {
        format!("{}{}", self.message.reasoning_content, self.message.content)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Response(ChatCompletionResponse),
    Streamed(StreamSummary),
}

/// Execution path invoked for every dispatched request
#[async_trait]
pub trait RequestExecutor: Send + Sync + 'static {
    async fn execute(
        &self,
        options: RequestOptions,
        delivery: Delivery,
    ) -> Result<Outcome, SchedulerError>;
}

/// Handle to a submitted request
///
/// Resolves exactly once with the request's outcome.
#[derive(Debug)]
pub struct Submission {
    id: String,
    rx: oneshot::Receiver<Result<Outcome, SchedulerError>>,
}

impl Submission {
    pub(super) fn new(id: String, rx: oneshot::Receiver<Result<Outcome, SchedulerError>>) -> Self {
        Self { id, rx }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Future for Submission {
    type Output = Result<Outcome, SchedulerError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(SchedulerError::Destroyed)))
    }
}

/// Summary of one queued request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedSummary {
    pub id: String,
    pub kind: RequestKind,
    pub queued_at: DateTime<Utc>,
    pub model: String,
    pub user_message_snippet: String,
}

/// Snapshot returned by [`RequestScheduler::status`](super::RequestScheduler::status)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub queue_size: usize,
    pub executing: usize,
    pub concurrency_limit: usize,
    pub current_interval_ms: u64,
    pub interval_settings: IntervalSettings,
    pub queued_requests: Vec<QueuedSummary>,
}
