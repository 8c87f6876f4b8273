//! Line framing for `text/event-stream` bodies
//!
//! Bytes are buffered until a newline arrives, so a record split across
//! reads (including inside a multi-byte character) is only decoded once it
//! is complete.

/// Sentinel payload closing an OpenAI-compatible stream
pub const DONE_SENTINEL: &str = "[DONE]";

const DATA_PREFIX: &str = "data:";

/// One meaningful SSE line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    /// Payload of a `data:` record, trimmed
    Data(String),
    /// Any other non-empty line (comments, `event:`, `id:`)
    Other(String),
}

impl SseLine {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        Some(match line.strip_prefix(DATA_PREFIX) {
            Some(data) => Self::Data(data.trim().to_string()),
            None => Self::Other(line.to_string()),
        })
    }
}

/// Incremental newline splitter
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    buffer: Vec<u8>,
}

impl SseLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return every line completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseLine> {
        self.buffer.extend_from_slice(bytes);

        let Some(last_newline) = self.buffer.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let complete: Vec<u8> = self.buffer.drain(..=last_newline).collect();
        complete
            .split(|&b| b == b'\n')
            .filter_map(|line| SseLine::parse(&String::from_utf8_lossy(line)))
            .collect()
    }

    /// Decode whatever is left once the body has ended
    pub fn finish(&mut self) -> Option<SseLine> {
        let rest = std::mem::take(&mut self.buffer);
        SseLine::parse(&String::from_utf8_lossy(&rest))
    }

    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_lines_are_split_and_trimmed() {
        let mut decoder = SseLineDecoder::new();
        let lines = decoder.push(b"data: {\"a\":1}\r\n\r\n: keep-alive\ndata:[DONE]\n");

        assert_eq!(
            lines,
            vec![
                SseLine::Data("{\"a\":1}".into()),
                SseLine::Other(": keep-alive".into()),
                SseLine::Data(DONE_SENTINEL.into()),
            ]
        );
        assert!(!decoder.has_pending());
    }

    #[test]
    fn partial_line_waits_for_newline() {
        let mut decoder = SseLineDecoder::new();
        assert!(decoder.push(b"data: {\"content\":\"hel").is_empty());
        assert!(decoder.has_pending());

        let lines = decoder.push(b"lo\"}\n");
        assert_eq!(lines, vec![SseLine::Data("{\"content\":\"hello\"}".into())]);
    }

    #[test]
    fn multibyte_characters_survive_a_split() {
        let text = "data: é\n".as_bytes();
        let mut decoder = SseLineDecoder::new();
        // 'é' is two bytes; split between them
        assert!(decoder.push(&text[..7]).is_empty());
        assert_eq!(decoder.push(&text[7..]), vec![SseLine::Data("é".into())]);
    }

    #[test]
    fn trailing_line_without_newline_is_flushed() {
        let mut decoder = SseLineDecoder::new();
        decoder.push(b"data: last");
        assert_eq!(decoder.finish(), Some(SseLine::Data("last".into())));
        assert_eq!(decoder.finish(), None);
    }
}
