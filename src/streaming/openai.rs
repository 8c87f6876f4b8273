//! Decoder for OpenAI-compatible `data:` event streams

use super::chunk::{ChunkDelta, NormalizedChunk};
use super::sse::{SseLine, SseLineDecoder, DONE_SENTINEL};
use crate::domain::{ChunkEnvelope, TokenUsage};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Default)]
pub struct OpenAiStreamDecoder {
    lines: SseLineDecoder,
    fold_reasoning: bool,
}

impl OpenAiStreamDecoder {
    pub fn new(fold_reasoning: bool) -> Self {
        Self {
            lines: SseLineDecoder::new(),
            fold_reasoning,
        }
    }

    pub fn push(&mut self, bytes: &[u8], out: &mut Vec<NormalizedChunk>) {
        for line in self.lines.push(bytes) {
            self.decode_line(line, out);
        }
    }

    pub fn flush(&mut self, out: &mut Vec<NormalizedChunk>) {
        if let Some(line) = self.lines.finish() {
            self.decode_line(line, out);
        }
    }

    fn decode_line(&self, line: SseLine, out: &mut Vec<NormalizedChunk>) {
        let data = match line {
            SseLine::Data(data) => data,
            SseLine::Other(_) => return,
        };

        if data == DONE_SENTINEL {
            out.push(NormalizedChunk::done());
            return;
        }

        let mut record: Value = match serde_json::from_str(&data) {
            Ok(record) => record,
            Err(error) => {
                debug!(%error, "Skipping undecodable stream record");
                return;
            }
        };

        if let Some(message) = upstream_error(&record) {
            out.push(NormalizedChunk::failed(message));
            return;
        }

        if self.fold_reasoning {
            fold_reasoning_into_content(&mut record);
        }

        out.push(NormalizedChunk::Delta(delta_from_record(record)));
    }
}

/// Copy `reasoning_content` into an absent or empty `content` and drop it
///
/// Applies to every choice of the record.
pub fn fold_reasoning_into_content(record: &mut Value) {
    let Some(choices) = record.get_mut("choices").and_then(Value::as_array_mut) else {
        return;
    };

    for choice in choices {
        let Some(delta) = choice.get_mut("delta").and_then(Value::as_object_mut) else {
            continue;
        };
        let Some(reasoning) = delta.remove("reasoning_content") else {
            continue;
        };

        let reasoning_present = reasoning.as_str().is_some_and(|text| !text.is_empty());
        let content_absent = match delta.get("content") {
            None | Some(Value::Null) => true,
            Some(Value::String(content)) => content.is_empty(),
            Some(_) => false,
        };

        if reasoning_present && content_absent {
            delta.insert("content".to_string(), reasoning);
        }
    }
}

fn upstream_error(record: &Value) -> Option<String> {
    let error = record.get("error")?;
    Some(
        error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
    )
}

fn delta_from_record(record: Value) -> ChunkDelta {
    let envelope = ChunkEnvelope {
        id: string_field(&record, "id"),
        created: record.get("created").and_then(Value::as_i64).unwrap_or_default(),
        model: string_field(&record, "model"),
    };

    let choice = record
        .get("choices")
        .and_then(|choices| choices.get(0))
        .cloned()
        .unwrap_or(Value::Null);
    let delta = choice.get("delta");

    let usage = record
        .get("usage")
        .filter(|usage| !usage.is_null())
        .and_then(|usage| serde_json::from_value::<TokenUsage>(usage.clone()).ok());

    ChunkDelta {
        envelope,
        index: choice
            .get("index")
            .and_then(Value::as_u64)
            .and_then(|index| u32::try_from(index).ok())
            .unwrap_or_default(),
        content: delta.and_then(|delta| optional_string(delta, "content")),
        reasoning_content: delta.and_then(|delta| optional_string(delta, "reasoning_content")),
        finish_reason: optional_string(&choice, "finish_reason"),
        usage,
        source: Some(record),
    }
}

fn string_field(value: &Value, key: &str) -> String {
    optional_string(value, key).unwrap_or_default()
}

fn optional_string(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}
