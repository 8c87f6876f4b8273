//! Property tests for stream translation under arbitrary read boundaries
//!
//! Upstream bodies arrive in reads of any size. Whatever the split, the
//! translated chunk sequence must match the one produced from a single read.

use proptest::prelude::*;
use proptest::sample::Index;
use tollbooth::domain::TokenUsage;
use tollbooth::streaming::{NormalizedChunk, StreamTranslator, TranslatorOptions, WireFormat};

const OPENAI_BODY: &str = concat!(
    ": keep-alive\n\n",
    "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"deepseek-reasoner\",\"choices\":[{\"index\":0,\"delta\":{\"reasoning_content\":\"think {\"}}]}\n\n",
    "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"deepseek-reasoner\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"héllo 世界\"}}]}\r\n\r\n",
    "data: not json\n\n",
    "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"deepseek-reasoner\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}],\"usage\":{\"prompt_tokens\":9,\"completion_tokens\":4,\"total_tokens\":13}}\n\n",
    "data: [DONE]\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"after done\"}}]}\n\n",
);

const GEMINI_BODY: &str = concat!(
    "[{\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"weigh \\\"}{\\\" options\",\"thought\":true}]}}]}\n",
    ",{\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Grüße {nested}\"}]}}]}\n",
    ",{\"candidates\":[{\"content\":{\"parts\":[{\"text\":\" 世界\"}]},\"finishReason\":\"STOP\"}],",
    "\"usageMetadata\":{\"promptTokenCount\":6,\"candidatesTokenCount\":3,\"thoughtsTokenCount\":2}}]",
);

/// What a client observes, without the per-stream envelope
#[derive(Debug, Clone, PartialEq)]
enum Observed {
    Delta {
        content: Option<String>,
        reasoning: Option<String>,
        finish_reason: Option<String>,
        usage: Option<TokenUsage>,
    },
    Done(Option<String>),
}

fn observe(chunks: Vec<NormalizedChunk>) -> Vec<Observed> {
    chunks
        .into_iter()
        .map(|chunk| match chunk {
            NormalizedChunk::Delta(delta) => {
                let record = delta.to_json();
                let choice = &record["choices"][0];
                Observed::Delta {
                    content: choice["delta"]["content"].as_str().map(str::to_string),
                    reasoning: choice["delta"]["reasoning_content"]
                        .as_str()
                        .map(str::to_string),
                    finish_reason: choice["finish_reason"].as_str().map(str::to_string),
                    usage: delta.usage,
                }
            }
            NormalizedChunk::Done { error } => Observed::Done(error),
        })
        .collect()
}

fn translate(format: WireFormat, reads: &[&[u8]]) -> Vec<Observed> {
    let mut translator = StreamTranslator::new(
        format,
        TranslatorOptions {
            fold_reasoning: false,
            model: "test-model".to_string(),
        },
    );
    let mut chunks = Vec::new();
    for read in reads {
        chunks.extend(translator.push(read));
    }
    chunks.extend(translator.finish());
    observe(chunks)
}

fn split<'a>(body: &'a [u8], cuts: &[Index]) -> Vec<&'a [u8]> {
    let mut offsets: Vec<usize> = cuts.iter().map(|cut| cut.index(body.len() + 1)).collect();
    offsets.sort_unstable();
    offsets.dedup();

    let mut reads = Vec::new();
    let mut start = 0;
    for offset in offsets {
        reads.push(&body[start..offset]);
        start = offset;
    }
    reads.push(&body[start..]);
    reads
}

#[test]
fn openai_reference_sequence() {
    let observed = translate(WireFormat::OpenAiSse, &[OPENAI_BODY.as_bytes()]);

    assert_eq!(observed.len(), 4);
    assert!(matches!(
        &observed[0],
        Observed::Delta { reasoning: Some(text), .. } if text == "think {"
    ));
    assert!(matches!(
        &observed[1],
        Observed::Delta { content: Some(text), .. } if text == "héllo 世界"
    ));
    assert!(matches!(
        &observed[2],
        Observed::Delta { usage: Some(usage), .. } if *usage == TokenUsage::new(9, 4)
    ));
    assert_eq!(observed[3], Observed::Done(None));
}

#[test]
fn gemini_reference_sequence() {
    let observed = translate(WireFormat::GeminiJson, &[GEMINI_BODY.as_bytes()]);

    assert_eq!(observed.len(), 4);
    assert!(matches!(
        &observed[0],
        Observed::Delta { reasoning: Some(text), .. } if text == "weigh \"}{\" options"
    ));
    assert!(matches!(
        &observed[2],
        Observed::Delta { finish_reason: Some(reason), .. } if reason == "stop"
    ));
    assert_eq!(observed[3], Observed::Done(None));
}

proptest! {
    #[test]
    fn openai_output_ignores_read_boundaries(cuts in prop::collection::vec(any::<Index>(), 0..12)) {
        let body = OPENAI_BODY.as_bytes();
        let whole = translate(WireFormat::OpenAiSse, &[body]);
        let pieces = translate(WireFormat::OpenAiSse, &split(body, &cuts));
        prop_assert_eq!(whole, pieces);
    }

    #[test]
    fn gemini_output_ignores_read_boundaries(cuts in prop::collection::vec(any::<Index>(), 0..12)) {
        let body = GEMINI_BODY.as_bytes();
        let whole = translate(WireFormat::GeminiJson, &[body]);
        let pieces = translate(WireFormat::GeminiJson, &split(body, &cuts));
        prop_assert_eq!(whole, pieces);
    }

    #[test]
    fn exactly_one_terminal_marker(cuts in prop::collection::vec(any::<Index>(), 0..6), truncate in any::<Index>()) {
        // A body cut off anywhere still ends with one marker
        let body = OPENAI_BODY.as_bytes();
        let body = &body[..truncate.index(body.len() + 1)];
        let observed = translate(WireFormat::OpenAiSse, &split(body, &cuts));

        let markers = observed.iter().filter(|chunk| matches!(chunk, Observed::Done(_))).count();
        prop_assert_eq!(markers, 1);
        prop_assert!(matches!(observed.last(), Some(Observed::Done(_))));
    }
}
