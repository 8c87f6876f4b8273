//! Adapter for the Gemini `generateContent` API
//!
//! Requests are reshaped into Gemini `contents`/`generationConfig` and
//! non-streaming replies are reshaped back into the OpenAI completion
//! envelope. Streaming bodies are returned raw; the stream translator
//! handles their object framing.

use super::constants::{completion, gemini_fields as fields, headers, model_suffixes, paths};
use super::{http, ByteStream, ProviderAdapter, ProviderError, ProviderKind, UpstreamRequest};
use crate::domain::{
    ApiKey, AssistantMessage, ChatChoice, ChatCompletionRequest, ChatCompletionResponse, ChatRole,
};
use crate::streaming::gemini::{error_message, finish_reason, usage_from_metadata, CandidateText};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Model name as sent upstream, plus whether thoughts were requested
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiModel {
    pub name: String,
    pub include_thoughts: bool,
}

impl GeminiModel {
    /// Strip the gateway-only `-streaming` and `:thinking` suffixes
    pub fn parse(model: &str) -> Self {
        Self {
            name: model
                .replacen(model_suffixes::STREAMING, "", 1)
                .replacen(model_suffixes::THINKING, "", 1),
            include_thoughts: model.contains(model_suffixes::THINKING),
        }
    }
}

/// Translate an OpenAI-shaped request into a Gemini body
pub fn request_body(request: &ChatCompletionRequest, include_thoughts: bool) -> Value {
    let contents: Vec<Value> = request
        .messages
        .iter()
        .map(|message| {
            let role = match message.role {
                ChatRole::Assistant => fields::roles::MODEL,
                _ => fields::roles::USER,
            };
            json!({
                (fields::ROLE): role,
                (fields::PARTS): [{ (fields::TEXT): message.content.text() }],
            })
        })
        .collect();

    let mut config = Map::new();
    if let Some(temperature) = request.temperature {
        config.insert(fields::TEMPERATURE.into(), json!(temperature));
    }
    if let Some(top_p) = request.top_p {
        config.insert(fields::TOP_P.into(), json!(top_p));
    }
    if let Some(max_tokens) = request.max_tokens {
        config.insert(fields::MAX_OUTPUT_TOKENS.into(), json!(max_tokens));
    }
    if let Some(stop) = &request.stop {
        let stop = stop.to_vec();
        if !stop.is_empty() {
            config.insert(fields::STOP_SEQUENCES.into(), json!(stop));
        }
    }
    if include_thoughts {
        config.insert(
            fields::THINKING_CONFIG.into(),
            json!({ (fields::INCLUDE_THOUGHTS): true }),
        );
    }

    let mut body = Map::new();
    body.insert(fields::CONTENTS.into(), Value::Array(contents));
    if !config.is_empty() {
        body.insert(fields::GENERATION_CONFIG.into(), Value::Object(config));
    }
    Value::Object(body)
}

/// Reshape a `GenerateContentResponse` into an OpenAI completion
pub fn reshape_response(
    model: &str,
    response: &Value,
) -> Result<ChatCompletionResponse, ProviderError> {
    if let Some(message) = error_message(response) {
        let status = response
            .pointer("/error/code")
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok())
            .unwrap_or(502);
        return Err(ProviderError::Upstream {
            status,
            body: message,
        });
    }

    let candidates = response
        .get(fields::CANDIDATES)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let choices = candidates
        .iter()
        .enumerate()
        .map(|(position, candidate)| {
            let text = CandidateText::from_candidate(candidate);
            let reasoning = Some(text.reasoning).filter(|reasoning| !reasoning.is_empty());
            ChatChoice {
                index: u32::try_from(position).unwrap_or_default(),
                message: AssistantMessage::new(text.content, reasoning),
                finish_reason: finish_reason(candidate),
                extra: Map::new(),
            }
        })
        .collect();

    let now = Utc::now();
    Ok(ChatCompletionResponse {
        id: format!("{}{}", completion::GEMINI_ID_PREFIX, now.timestamp_millis()),
        object: completion::OBJECT.to_string(),
        created: now.timestamp(),
        model: model.to_string(),
        choices,
        usage: usage_from_metadata(response),
        extra: Map::new(),
    })
}

#[derive(Debug, Clone)]
pub struct GeminiAdapter {
    client: Client,
    base_url: String,
    api_key: Option<ApiKey>,
}

impl GeminiAdapter {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: Option<ApiKey>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn endpoint(&self, model: &str, stream: bool) -> String {
        let method = if stream {
            paths::gemini::STREAM_GENERATE
        } else {
            paths::gemini::GENERATE
        };
        format!(
            "{}/{}/{}:{method}",
            self.base_url,
            paths::gemini::MODELS,
            urlencoding::encode(model)
        )
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn build_request(
        &self,
        request: &ChatCompletionRequest,
        credentials: Option<&ApiKey>,
        stream: bool,
    ) -> Result<UpstreamRequest, ProviderError> {
        let key = credentials
            .or(self.api_key.as_ref())
            .ok_or_else(|| ProviderError::NotConfigured {
                provider: ProviderKind::Gemini,
                reason: "no API key available".to_string(),
            })?;

        let model = GeminiModel::parse(&request.model);
        Ok(UpstreamRequest {
            url: self.endpoint(&model.name, stream),
            headers: vec![(headers::GOOG_API_KEY.to_string(), key.as_ref().to_string())],
            body: request_body(request, model.include_thoughts),
        })
    }

    #[instrument(skip_all, fields(provider = "gemini", model = %request.model))]
    async fn fetch_once(
        &self,
        request: &ChatCompletionRequest,
        credentials: Option<&ApiKey>,
        cancel: &CancellationToken,
    ) -> Result<ChatCompletionResponse, ProviderError> {
        let upstream = self.build_request(request, credentials, false)?;
        debug!(url = %upstream.url, "Calling upstream");
        let response = http::send(&self.client, &upstream, cancel).await?;
        let body: Value = http::read_json(response, cancel).await?;
        reshape_response(&request.model, &body)
    }

    #[instrument(skip_all, fields(provider = "gemini", model = %request.model))]
    async fn fetch_stream(
        &self,
        request: &ChatCompletionRequest,
        credentials: Option<&ApiKey>,
        cancel: &CancellationToken,
    ) -> Result<ByteStream, ProviderError> {
        let upstream = self.build_request(request, credentials, true)?;
        debug!(url = %upstream.url, "Opening upstream stream");
        let response = http::send(&self.client, &upstream, cancel).await?;
        Ok(http::byte_stream(response))
    }
}
