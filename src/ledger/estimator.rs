//! Heuristic token estimation
//!
//! Used whenever a provider does not report exact usage. The ratio roughly
//! approximates common subword tokenizers on mixed-language text.

use crate::domain::ChatMessage;

/// Characters per token
pub const CHARS_PER_TOKEN: f64 = 3.5;

/// Fixed overhead added for each message
pub const PER_MESSAGE_OVERHEAD: u64 = 4;

/// Fixed overhead added once per conversation
pub const PER_CONVERSATION_OVERHEAD: u64 = 2;

/// `ceil(chars / 3.5)`, or zero for non-positive and non-finite input
pub fn estimate_tokens_by_chars(chars: f64) -> u64 {
    if !chars.is_finite() || chars <= 0.0 {
        return 0;
    }
    (chars / CHARS_PER_TOKEN).ceil() as u64
}

/// Estimate the tokens of a piece of text
///
/// Length is measured in UTF-16 code units so the figures line up with the
/// browser clients that also estimate locally.
pub fn estimate_text_tokens(text: &str) -> u64 {
    estimate_tokens_by_chars(text.encode_utf16().count() as f64)
}

pub fn estimate_messages_tokens(messages: &[ChatMessage]) -> u64 {
    messages
        .iter()
        .map(|message| estimate_text_tokens(&message.content.text()) + PER_MESSAGE_OVERHEAD)
        .sum::<u64>()
        + PER_CONVERSATION_OVERHEAD
}
