//! Decoder for Gemini `streamGenerateContent` bodies
//!
//! The body is a JSON array of `GenerateContentResponse` objects with no
//! line framing and no end sentinel, so objects are cut out with
//! [`JsonObjectScanner`] and the terminal marker is synthesized when the
//! upstream body ends.

use super::chunk::{ChunkDelta, NormalizedChunk};
use super::json_objects::JsonObjectScanner;
use crate::domain::{ChunkEnvelope, TokenUsage};
use chrono::Utc;
use serde_json::Value;
use tracing::debug;

/// Text of one candidate split into the answer and thought channels
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CandidateText {
    pub content: String,
    pub reasoning: String,
}

impl CandidateText {
    /// Collect `content.parts[].text`, routing thought parts to reasoning
    pub fn from_candidate(candidate: &Value) -> Self {
        let mut text = Self::default();
        let parts = candidate
            .pointer("/content/parts")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for part in parts {
            let Some(fragment) = part.get("text").and_then(Value::as_str) else {
                continue;
            };
            if is_thought(part) {
                text.reasoning.push_str(fragment);
            } else {
                text.content.push_str(fragment);
            }
        }
        text
    }
}

fn is_thought(part: &Value) -> bool {
    ["thought", "inlineThought"]
        .iter()
        .any(|flag| part.get(flag).and_then(Value::as_bool).unwrap_or(false))
}

/// Lower-cased `finishReason` of a candidate (`STOP` becomes `stop`)
pub fn finish_reason(candidate: &Value) -> Option<String> {
    candidate
        .get("finishReason")
        .and_then(Value::as_str)
        .filter(|reason| !reason.is_empty())
        .map(str::to_lowercase)
}

/// Token counts from `usageMetadata`; thought tokens count as completion
pub fn usage_from_metadata(response: &Value) -> Option<TokenUsage> {
    let metadata = response.get("usageMetadata")?;
    let count = |field: &str| metadata.get(field).and_then(Value::as_u64).unwrap_or(0);

    let prompt = count("promptTokenCount");
    let completion = count("candidatesTokenCount") + count("thoughtsTokenCount");
    Some(TokenUsage::new(prompt, completion))
}

/// Message of a Gemini `error` object, if the response is one
pub fn error_message(response: &Value) -> Option<String> {
    let error = response.get("error")?;
    Some(
        error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
    )
}

#[derive(Debug)]
pub struct GeminiStreamDecoder {
    scanner: JsonObjectScanner,
    envelope: ChunkEnvelope,
    fold_reasoning: bool,
}

impl GeminiStreamDecoder {
    pub fn new(model: impl Into<String>, fold_reasoning: bool) -> Self {
        let now = Utc::now();
        Self {
            scanner: JsonObjectScanner::new(),
            envelope: ChunkEnvelope {
                id: format!("chatcmpl-gemini-{}", now.timestamp_millis()),
                created: now.timestamp(),
                model: model.into(),
            },
            fold_reasoning,
        }
    }

    pub fn envelope(&self) -> &ChunkEnvelope {
        &self.envelope
    }

    pub fn push(&mut self, bytes: &[u8], out: &mut Vec<NormalizedChunk>) {
        for object in self.scanner.push(bytes) {
            match serde_json::from_slice::<Value>(&object) {
                Ok(response) => self.decode_response(&response, out),
                Err(error) => debug!(%error, "Skipping undecodable Gemini object"),
            }
        }
    }

    /// Gemini has no end sentinel; the end of the body is the end of the stream
    pub fn flush(&mut self, out: &mut Vec<NormalizedChunk>) {
        if self.scanner.has_partial_object() {
            debug!("Gemini stream ended inside an object");
        }
        out.push(NormalizedChunk::done());
    }

    fn decode_response(&self, response: &Value, out: &mut Vec<NormalizedChunk>) {
        if let Some(message) = error_message(response) {
            out.push(NormalizedChunk::failed(message));
            return;
        }

        let mut usage = usage_from_metadata(response);
        let candidates = response
            .get("candidates")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for (position, candidate) in candidates.iter().enumerate() {
            let index = candidate
                .get("index")
                .and_then(Value::as_u64)
                .and_then(|index| u32::try_from(index).ok())
                .unwrap_or_else(|| u32::try_from(position).unwrap_or_default());

            let delta = self.delta(
                index,
                CandidateText::from_candidate(candidate),
                finish_reason(candidate),
                usage.take(),
            );
            if !delta.is_empty() {
                out.push(NormalizedChunk::Delta(delta));
            }
        }

        // Usage-only objects still carry billing information
        if let Some(usage) = usage {
            out.push(NormalizedChunk::Delta(self.delta(
                0,
                CandidateText::default(),
                None,
                Some(usage),
            )));
        }
    }

    fn delta(
        &self,
        index: u32,
        text: CandidateText,
        finish_reason: Option<String>,
        usage: Option<TokenUsage>,
    ) -> ChunkDelta {
        let (content, reasoning) = if self.fold_reasoning {
            let folded = if text.reasoning.is_empty() {
                text.content
            } else {
                text.reasoning
            };
            (folded, String::new())
        } else {
            (text.content, text.reasoning)
        };

        ChunkDelta {
            envelope: self.envelope.clone(),
            index,
            content: Some(content).filter(|text| !text.is_empty()),
            reasoning_content: Some(reasoning).filter(|text| !text.is_empty()),
            finish_reason,
            usage,
            source: None,
        }
    }
}
