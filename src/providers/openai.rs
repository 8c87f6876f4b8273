//! Adapter for OpenAI-compatible chat-completion APIs
//!
//! Serves the generic family (OpenRouter, OpenAI) and DeepSeek. The request
//! body is the inbound request passed through with `stream` overwritten.

use super::constants::{base_urls, headers, paths};
use super::{http, ByteStream, ProviderAdapter, ProviderError, ProviderKind, UpstreamRequest};
use crate::domain::{ApiKey, ChatCompletionRequest, ChatCompletionResponse};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// One configured upstream endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    pub name: String,
    pub base_url: String,
    pub api_key: Option<ApiKey>,
    /// Extra headers sent with every request
    pub headers: Vec<(String, String)>,
}

impl Upstream {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key: None,
            headers: Vec::new(),
        }
    }

    pub fn with_key(mut self, api_key: Option<ApiKey>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Add a header; empty values are ignored
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.trim().is_empty() {
            self.headers.push((name.into(), value));
        }
        self
    }

    /// OpenRouter with its attribution headers
    pub fn openrouter(
        base_url: Option<String>,
        api_key: Option<ApiKey>,
        referer: Option<String>,
        title: Option<String>,
    ) -> Self {
        Self::new(
            "openrouter",
            base_url.unwrap_or_else(|| base_urls::OPENROUTER.to_string()),
        )
        .with_key(api_key)
        .with_header(headers::OPENROUTER_REFERER, referer.unwrap_or_default())
        .with_header(headers::OPENROUTER_TITLE, title.unwrap_or_default())
    }
}

/// `<base>/chat/completions` when the base already names `/v1`
pub fn chat_completions_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with(paths::VERSION_SUFFIX) {
        format!("{base}{}", paths::CHAT_COMPLETIONS)
    } else {
        format!("{base}{}", paths::VERSIONED_CHAT_COMPLETIONS)
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiCompatibleAdapter {
    kind: ProviderKind,
    client: Client,
    /// Configured upstreams in priority order; the first with a key wins
    upstreams: Vec<Upstream>,
    /// Base URL used with caller-supplied keys
    passthrough_base_url: String,
}

impl OpenAiCompatibleAdapter {
    pub fn new(
        kind: ProviderKind,
        client: Client,
        upstreams: Vec<Upstream>,
        passthrough_base_url: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            client,
            upstreams,
            passthrough_base_url: passthrough_base_url.into(),
        }
    }

    /// Generic adapter: OpenRouter first, then OpenAI
    pub fn generic(client: Client, openrouter: Upstream, openai: Upstream) -> Self {
        let passthrough = openai.base_url.clone();
        Self::new(
            ProviderKind::OpenAiCompatible,
            client,
            vec![openrouter, openai],
            passthrough,
        )
    }

    pub fn deepseek(client: Client, deepseek: Upstream) -> Self {
        let passthrough = deepseek.base_url.clone();
        Self::new(ProviderKind::DeepSeek, client, vec![deepseek], passthrough)
    }

    fn select<'a>(
        &'a self,
        credentials: Option<&'a ApiKey>,
    ) -> Result<(&'a str, &'a ApiKey, &'a [(String, String)]), ProviderError> {
        if let Some(key) = credentials {
            return Ok((&self.passthrough_base_url, key, &[]));
        }

        self.upstreams
            .iter()
            .find_map(|upstream| {
                upstream
                    .api_key
                    .as_ref()
                    .map(|key| (upstream.base_url.as_str(), key, upstream.headers.as_slice()))
            })
            .ok_or_else(|| ProviderError::NotConfigured {
                provider: self.kind,
                reason: "no API key available".to_string(),
            })
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleAdapter {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn build_request(
        &self,
        request: &ChatCompletionRequest,
        credentials: Option<&ApiKey>,
        stream: bool,
    ) -> Result<UpstreamRequest, ProviderError> {
        let (base_url, key, extra_headers) = self.select(credentials)?;

        let mut body = serde_json::to_value(request)
            .map_err(|error| ProviderError::Decode(error.to_string()))?;
        if let Value::Object(fields) = &mut body {
            fields.insert("stream".to_string(), Value::Bool(stream));
        }

        let mut request_headers = vec![(
            headers::AUTHORIZATION.to_string(),
            format!("Bearer {}", key.as_ref()),
        )];
        request_headers.extend(extra_headers.iter().cloned());

        Ok(UpstreamRequest {
            url: chat_completions_url(base_url),
            headers: request_headers,
            body,
        })
    }

    #[instrument(skip_all, fields(provider = %self.kind, model = %request.model))]
    async fn fetch_once(
        &self,
        request: &ChatCompletionRequest,
        credentials: Option<&ApiKey>,
        cancel: &CancellationToken,
    ) -> Result<ChatCompletionResponse, ProviderError> {
        let upstream = self.build_request(request, credentials, false)?;
        debug!(url = %upstream.url, "Calling upstream");
        let response = http::send(&self.client, &upstream, cancel).await?;
        http::read_json(response, cancel).await
    }

    #[instrument(skip_all, fields(provider = %self.kind, model = %request.model))]
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
