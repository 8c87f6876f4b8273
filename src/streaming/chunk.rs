//! Provider-independent stream chunks

use crate::domain::{ChunkEnvelope, TokenUsage};
use bytes::Bytes;
use serde_json::{json, Map, Value};

/// Object type of OpenAI-compatible stream chunks
pub const CHUNK_OBJECT: &str = "chat.completion.chunk";

/// SSE record terminating a successful stream
pub const SSE_DONE: &str = "data: [DONE]\n\n";

/// One increment of a streamed completion
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDelta {
    pub envelope: ChunkEnvelope,
    pub index: u32,
    pub content: Option<String>,
    pub reasoning_content: Option<String>,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
    /// Upstream record when the provider already speaks the client format;
    /// relayed as-is so provider-specific fields survive
    pub source: Option<Value>,
}

impl ChunkDelta {
    /// OpenAI-compatible `chat.completion.chunk` JSON for this delta
    pub fn to_json(&self) -> Value {
        if let Some(source) = &self.source {
            return source.clone();
        }

        let mut delta = Map::new();
        if let Some(content) = &self.content {
            delta.insert("content".into(), Value::String(content.clone()));
        }
        if let Some(reasoning) = &self.reasoning_content {
            delta.insert("reasoning_content".into(), Value::String(reasoning.clone()));
        }

        let mut chunk = json!({
            "id": self.envelope.id,
            "object": CHUNK_OBJECT,
            "created": self.envelope.created,
            "model": self.envelope.model,
            "choices": [{
                "index": self.index,
                "delta": delta,
                "finish_reason": self.finish_reason,
            }],
        });
        if let (Some(usage), Some(object)) = (self.usage, chunk.as_object_mut()) {
            object.insert("usage".into(), json!(usage));
        }
        chunk
    }

    pub fn is_empty(&self) -> bool {
        is_blank(&self.content)
            && is_blank(&self.reasoning_content)
            && self.finish_reason.is_none()
            && self.usage.is_none()
    }
}

fn is_blank(text: &Option<String>) -> bool {
    matches!(text.as_deref(), None | Some(""))
}

/// Normalized unit produced by every stream translator
///
/// A stream is zero or more `Delta`s followed by exactly one `Done`.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedChunk {
    Delta(ChunkDelta),
    Done { error: Option<String> },
}

impl NormalizedChunk {
    pub fn done() -> Self {
        Self::Done { error: None }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Done {
            error: Some(message.into()),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }

    /// SSE framing sent to clients
    ///
    /// Errors become an SSE comment line so clients that ignore comments
    /// simply see the stream end.
    pub fn to_sse(&self) -> Bytes {
        match self {
            Self::Delta(delta) => Bytes::from(format!("data: {}\n\n", delta.to_json())),
            Self::Done { error: None } => Bytes::from_static(SSE_DONE.as_bytes()),
            Self::Done {
                error: Some(message),
            } => Bytes::from(format!(": error {}\n\n", single_line(message))),
        }
    }
}

fn single_line(message: &str) -> String {
    message.replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> ChunkEnvelope {
        ChunkEnvelope {
            id: "chatcmpl-1".into(),
            created: 1_700_000_000,
            model: "gemini-2.5-pro".into(),
        }
    }

    fn delta(content: Option<&str>, reasoning: Option<&str>) -> ChunkDelta {
        ChunkDelta {
            envelope: envelope(),
            index: 0,
            content: content.map(str::to_string),
            reasoning_content: reasoning.map(str::to_string),
            finish_reason: None,
            usage: None,
            source: None,
        }
    }

    #[test]
    fn synthesized_chunk_matches_openai_shape() {
        let json = delta(Some("hi"), None).to_json();

        assert_eq!(json["object"], CHUNK_OBJECT);
        assert_eq!(json["id"], "chatcmpl-1");
        assert_eq!(json["choices"][0]["index"], 0);
        assert_eq!(json["choices"][0]["delta"]["content"], "hi");
        assert!(json["choices"][0]["delta"].get("reasoning_content").is_none());
        assert!(json["choices"][0]["finish_reason"].is_null());
        assert!(json.get("usage").is_none());
    }

    #[test]
    fn source_record_is_relayed_verbatim() {
        let mut chunk = delta(Some("ignored"), None);
        chunk.source = Some(json!({"id": "x", "provider": "OpenRouter"}));
        assert_eq!(chunk.to_json(), json!({"id": "x", "provider": "OpenRouter"}));
    }

    #[test]
    fn terminal_markers_are_framed() {
        assert_eq!(NormalizedChunk::done().to_sse(), "data: [DONE]\n\n");
        assert_eq!(
            NormalizedChunk::failed("upstream\nbroke").to_sse(),
            ": error upstream broke\n\n"
        );
    }

    #[test]
    fn empty_delta_detection() {
        assert!(delta(None, Some("")).is_empty());
        assert!(!delta(None, Some("think")).is_empty());
    }
}
