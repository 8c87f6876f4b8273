//! Execution of dispatched requests against upstream providers

use crate::infrastructure::log_messages::upstream as log_msg;
use crate::providers::{ProviderError, ProviderSet};
use crate::scheduler::{
    AggregatedMessage, Delivery, Outcome, RequestExecutor, RequestOptions, SchedulerError,
    StreamSummary,
};
use crate::streaming::{
    relay, CallbackSink, ChunkSink, NormalizedChunk, StreamAccumulator, StreamEnd,
    StreamTranslator, TranslatorOptions,
};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

/// Role of every aggregated streamed message
const ASSISTANT_ROLE: &str = "assistant";

/// Runs scheduled requests through the provider adapters
#[derive(Debug, Clone)]
pub struct ProviderExecutor {
    providers: ProviderSet,
}

impl ProviderExecutor {
    pub fn new(providers: ProviderSet) -> Self {
        Self { providers }
    }

    async fn call(&self, options: &RequestOptions) -> Result<Outcome, ProviderError> {
        let adapter = self.providers.adapter(options.provider);
        let mut response = adapter
            .fetch_once(&options.request, options.credentials.as_ref(), &options.cancel)
            .await?;

        if options.fold_reasoning {
            response.fold_reasoning_into_content();
        }
        Ok(Outcome::Response(response))
    }

    /// Open the upstream stream and relay it into `sink`
    ///
    /// A failure before the first byte is reported to the sink as a
    /// terminal error marker.
    async fn stream(
        &self,
        options: &RequestOptions,
        sink: &mut dyn ChunkSink,
    ) -> Result<Outcome, ProviderError> {
        let adapter = self.providers.adapter(options.provider);
        let body = match adapter
            .fetch_stream(&options.request, options.credentials.as_ref(), &options.cancel)
            .await
        {
            Ok(body) => body,
            Err(error) => {
                if !matches!(error, ProviderError::Aborted) {
                    // The consumer may already be gone
                    let _ = sink.emit(&NormalizedChunk::failed(error.to_string())).await;
                }
                return Err(error);
            }
        };

        let mut translator = StreamTranslator::new(
            options.provider.wire_format(),
            TranslatorOptions {
                fold_reasoning: options.fold_reasoning,
                model: options.request.model.clone(),
            },
        );
        let (accumulator, end) = relay(body, &mut translator, sink, &options.cancel).await;

        match &end {
            StreamEnd::Completed => info!(
                chunks = accumulator.chunks,
                finish_reason = accumulator.finish_reason.as_deref().unwrap_or("unknown"),
                "{}",
                log_msg::STREAM_COMPLETED
            ),
            StreamEnd::Failed(reason) => warn!(%reason, "{}", log_msg::STREAM_FAILED),
            StreamEnd::Aborted => info!(chunks = accumulator.chunks, "{}", log_msg::STREAM_ABORTED),
        }

        Ok(Outcome::Streamed(summarize(accumulator, end)))
    }
}

fn summarize(accumulator: StreamAccumulator, end: StreamEnd) -> StreamSummary {
    StreamSummary {
        message: AggregatedMessage {
            role: ASSISTANT_ROLE,
            content: accumulator.content,
            reasoning_content: accumulator.reasoning_content,
            timestamp: Utc::now(),
        },
        finish_reason: accumulator.finish_reason,
        usage: accumulator.usage,
        end,
    }
}

#[async_trait]
impl RequestExecutor for ProviderExecutor {
    #[instrument(skip_all, fields(
        request_id = %options.request_id,
        provider = %options.provider,
        model = %options.request.model,
        kind = %delivery.kind(),
    ))]
    async fn execute(
        &self,
        options: RequestOptions,
        delivery: Delivery,
    ) -> Result<Outcome, SchedulerError> {
        let result = match delivery {
            Delivery::Call => self.call(&options).await,
            Delivery::Callback(callback) => {
                let mut sink = CallbackSink::new(callback);
                self.stream(&options, &mut sink).await
            }
            Delivery::Client(mut sink) => self.stream(&options, &mut sink).await,
        };

        if let Err(error) = &result {
            match error {
                ProviderError::Aborted => debug!("Upstream call aborted"),
                _ => warn!(%error, "{}", log_msg::CALL_FAILED),
            }
        }
        result.map_err(SchedulerError::from)
    }
}
