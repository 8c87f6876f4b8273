//! Upstream provider adapters
//!
//! Every upstream is one [`ProviderKind`] variant, selected from the model
//! name by [`ProviderKind::classify`]. Each variant has an adapter that
//! shapes requests for its API and fetches either a complete response or a
//! raw byte stream for the stream translator.

pub mod constants;
pub mod gemini;
pub mod http;
pub mod openai;

use crate::domain::{ApiKey, ChatCompletionRequest, ChatCompletionResponse};
use crate::streaming::WireFormat;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, LazyLock};
use tokio_util::sync::CancellationToken;

pub use gemini::GeminiAdapter;
pub use openai::{OpenAiCompatibleAdapter, Upstream};

static GEMINI_MODEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^gemini[-_]").expect("gemini model pattern is valid"));
static DEEPSEEK_MODEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^deepseek(?:[-_]|$)").expect("deepseek model pattern is valid")
});

/// Closed set of upstream families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// OpenAI, OpenRouter or any server speaking the same API
    OpenAiCompatible,
    DeepSeek,
    Gemini,
}

impl ProviderKind {
    /// Choose the upstream family for a model name
    pub fn classify(model: &str) -> Self {
        let model = model.trim();
        if GEMINI_MODEL.is_match(model) {
            Self::Gemini
        } else if DEEPSEEK_MODEL.is_match(model) {
            Self::DeepSeek
        } else {
            Self::OpenAiCompatible
        }
    }

    pub fn wire_format(&self) -> WireFormat {
        match self {
            Self::OpenAiCompatible | Self::DeepSeek => WireFormat::OpenAiSse,
            Self::Gemini => WireFormat::GeminiJson,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAiCompatible => "openai",
            Self::DeepSeek => "deepseek",
            Self::Gemini => "gemini",
        }
    }

    /// Feature permission required to call this provider
    pub fn permission(&self) -> String {
        format!("llm-{}", self.as_str())
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider-specific error type
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider {provider} is not configured: {reason}")]
    NotConfigured {
        provider: ProviderKind,
        reason: String,
    },

    #[error("LLM provider error {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid upstream response: {0}")]
    Decode(String),

    #[error("Upstream request aborted")]
    Aborted,
}

/// Fully shaped upstream call
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

/// Raw upstream body handed to the stream translator
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ProviderError>> + Send>>;

/// Common interface of all upstream adapters
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Shape a provider request
    ///
    /// `credentials` is a caller-supplied key that takes precedence over the
    /// configured one.
    fn build_request(
        &self,
        request: &ChatCompletionRequest,
        credentials: Option<&ApiKey>,
        stream: bool,
    ) -> Result<UpstreamRequest, ProviderError>;

    /// Single-shot call returning an OpenAI-shaped completion
    async fn fetch_once(
        &self,
        request: &ChatCompletionRequest,
        credentials: Option<&ApiKey>,
        cancel: &CancellationToken,
    ) -> Result<ChatCompletionResponse, ProviderError>;

    /// Streaming call returning the upstream body untouched
    async fn fetch_stream(
        &self,
        request: &ChatCompletionRequest,
        credentials: Option<&ApiKey>,
        cancel: &CancellationToken,
    ) -> Result<ByteStream, ProviderError>;
}

/// One adapter per provider family
#[derive(Clone)]
pub struct ProviderSet {
    openai: Arc<dyn ProviderAdapter>,
    deepseek: Arc<dyn ProviderAdapter>,
    gemini: Arc<dyn ProviderAdapter>,
}

impl ProviderSet {
    pub fn new(
        openai: Arc<dyn ProviderAdapter>,
        deepseek: Arc<dyn ProviderAdapter>,
        gemini: Arc<dyn ProviderAdapter>,
    ) -> Self {
        Self {
            openai,
            deepseek,
            gemini,
        }
    }

    pub fn adapter(&self, kind: ProviderKind) -> Arc<dyn ProviderAdapter> {
        match kind {
            ProviderKind::OpenAiCompatible => Arc::clone(&self.openai),
            ProviderKind::DeepSeek => Arc::clone(&self.deepseek),
            ProviderKind::Gemini => Arc::clone(&self.gemini),
        }
    }
}

impl fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSet").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("gemini-2.5-pro", ProviderKind::Gemini)]
    #[case("Gemini_flash", ProviderKind::Gemini)]
    #[case("gemini", ProviderKind::OpenAiCompatible)]
    #[case("deepseek-reasoner", ProviderKind::DeepSeek)]
    #[case("DeepSeek", ProviderKind::DeepSeek)]
    #[case("deepseek_chat", ProviderKind::DeepSeek)]
    #[case("deepseekr1", ProviderKind::OpenAiCompatible)]
    #[case("gpt-4o", ProviderKind::OpenAiCompatible)]
    #[case("anthropic/claude-3.5-sonnet", ProviderKind::OpenAiCompatible)]
    fn models_are_classified(#[case] model: &str, #[case] expected: ProviderKind) {
        assert_eq!(ProviderKind::classify(model), expected);
    }

    #[test]
    fn gemini_uses_object_framing() {
        assert_eq!(ProviderKind::Gemini.wire_format(), WireFormat::GeminiJson);
        assert_eq!(ProviderKind::DeepSeek.wire_format(), WireFormat::OpenAiSse);
    }

    #[test]
    fn permissions_follow_provider_names() {
        assert_eq!(ProviderKind::OpenAiCompatible.permission(), "llm-openai");
        assert_eq!(ProviderKind::Gemini.permission(), "llm-gemini");
    }
}
