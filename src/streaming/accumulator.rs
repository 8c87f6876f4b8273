//! Aggregation of a streamed completion

use super::chunk::NormalizedChunk;
use crate::domain::TokenUsage;

/// Running totals of everything relayed for one request
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StreamAccumulator {
    pub content: String,
    pub reasoning_content: String,
    pub finish_reason: Option<String>,
    /// Last usage the provider reported; later reports supersede earlier ones
    pub usage: Option<TokenUsage>,
    pub error: Option<String>,
    pub chunks: usize,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, chunk: &NormalizedChunk) {
        match chunk {
            NormalizedChunk::Delta(delta) => {
                self.chunks += 1;
                if let Some(content) = &delta.content {
                    self.content.push_str(content);
                }
                if let Some(reasoning) = &delta.reasoning_content {
                    self.reasoning_content.push_str(reasoning);
                }
                if delta.finish_reason.is_some() {
                    self.finish_reason.clone_from(&delta.finish_reason);
                }
                if delta.usage.is_some() {
                    self.usage = delta.usage;
                }
            }
            NormalizedChunk::Done { error } => {
                if error.is_some() {
                    self.error.clone_from(error);
                }
            }
        }
    }

    /// All generated text, used to estimate completion tokens
    pub fn generated_text(&self) -> String {
        let mut text = String::with_capacity(self.content.len() + self.reasoning_content.len());
        text.push_str(&self.reasoning_content);
        text.push_str(&self.content);
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChunkEnvelope;
    use crate::streaming::chunk::ChunkDelta;

    fn delta(content: &str, reasoning: &str, usage: Option<TokenUsage>) -> NormalizedChunk {
        NormalizedChunk::Delta(ChunkDelta {
            envelope: ChunkEnvelope {
                id: "c".into(),
                created: 0,
                model: "m".into(),
            },
            index: 0,
            content: Some(content.to_string()).filter(|c| !c.is_empty()),
            reasoning_content: Some(reasoning.to_string()).filter(|r| !r.is_empty()),
            finish_reason: None,
            usage,
            source: None,
        })
    }

    #[test]
    fn text_and_last_usage_are_collected() {
        let mut acc = StreamAccumulator::new();
        acc.observe(&delta("Hel", "hmm", Some(TokenUsage::new(1, 1))));
        acc.observe(&delta("lo", "", Some(TokenUsage::new(3, 4))));
        acc.observe(&NormalizedChunk::failed("cut off"));

        assert_eq!(acc.content, "Hello");
        assert_eq!(acc.reasoning_content, "hmm");
        assert_eq!(acc.generated_text(), "hmmHello");
        assert_eq!(acc.usage, Some(TokenUsage::new(3, 4)));
        assert_eq!(acc.error.as_deref(), Some("cut off"));
        assert_eq!(acc.chunks, 2);
    }
}
