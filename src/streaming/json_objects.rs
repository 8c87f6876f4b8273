//! Incremental extraction of concatenated top-level JSON objects
//!
//! Some providers stream a body that is one JSON array (or bare objects
//! back to back) with no line framing. The scanner walks each byte once,
//! tracking brace depth and whether it is inside a string literal, and
//! hands out every object as soon as its closing brace arrives. Only the
//! unfinished tail is kept between reads.

#[derive(Debug, Default)]
pub struct JsonObjectScanner {
    buffer: Vec<u8>,
    /// Next byte to examine
    cursor: usize,
    depth: usize,
    /// Offset of the `{` opening the current top-level object
    start: Option<usize>,
    in_string: bool,
    escaped: bool,
}

impl JsonObjectScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return the raw bytes of every completed object
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(bytes);
        let mut objects = Vec::new();

        while self.cursor < self.buffer.len() {
            let byte = self.buffer[self.cursor];

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
            } else {
                match byte {
                    b'"' if self.depth > 0 => self.in_string = true,
                    b'{' => {
                        if self.depth == 0 {
                            self.start = Some(self.cursor);
                        }
                        self.depth += 1;
                    }
                    b'}' if self.depth > 0 => {
                        self.depth -= 1;
                        if self.depth == 0 {
                            if let Some(start) = self.start.take() {
                                objects.push(self.buffer[start..=self.cursor].to_vec());
                            }
                        }
                    }
                    _ => {}
                }
            }

            self.cursor += 1;
        }

        self.compact();
        objects
    }

    /// True while an object has been opened but not closed
    pub fn has_partial_object(&self) -> bool {
        self.start.is_some()
    }

    /// Drop bytes that can no longer belong to an object
    fn compact(&mut self) {
        let keep_from = self.start.unwrap_or(self.cursor);
        if keep_from == 0 {
            return;
        }

        self.buffer.drain(..keep_from);
        self.cursor -= keep_from;
        if let Some(start) = self.start.as_mut() {
            *start -= keep_from;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn as_strings(objects: Vec<Vec<u8>>) -> Vec<String> {
        objects
            .into_iter()
            .map(|bytes| String::from_utf8(bytes).unwrap())
            .collect()
    }

    #[test]
    fn objects_inside_an_array_are_extracted() {
        let mut scanner = JsonObjectScanner::new();
        let objects = scanner.push(b"[{\"a\":1}\n,\r\n{\"b\":{\"c\":2}}]");
        assert_eq!(as_strings(objects), vec![r#"{"a":1}"#, r#"{"b":{"c":2}}"#]);
        assert!(!scanner.has_partial_object());
    }

    #[test]
    fn braces_inside_strings_are_ignored() {
        let mut scanner = JsonObjectScanner::new();
        let input = br#"{"text":"a } and a { and \" quote }"}"#;
        let objects = scanner.push(input);
        assert_eq!(objects, vec![input.to_vec()]);
    }

    #[test]
    fn incomplete_object_is_kept_for_the_next_read() {
        let mut scanner = JsonObjectScanner::new();
        assert!(scanner.push(br#"[{"text":"hel"#).is_empty());
        assert!(scanner.has_partial_object());

        let objects = scanner.push(br#"lo"},{"#);
        assert_eq!(as_strings(objects), vec![r#"{"text":"hello"}"#]);
        assert!(scanner.has_partial_object());
    }

    #[test]
    fn escaped_backslash_before_quote_closes_string() {
        let mut scanner = JsonObjectScanner::new();
        let input = br#"{"path":"C:\\"}{"n":1}"#;
        let objects = scanner.push(input);
        assert_eq!(as_strings(objects), vec![r#"{"path":"C:\\"}"#, r#"{"n":1}"#]);
    }

    fn payload() -> Vec<u8> {
        br#"[{"candidates":[{"content":{"parts":[{"text":"{ not a brace }"}]}}]},
{"candidates":[{"content":{"parts":[{"text":"quote \" and \\ slash"}]}}]},
{"usageMetadata":{"promptTokenCount":3}}]"#
            .to_vec()
    }

    proptest! {
        #[test]
        fn split_points_do_not_change_output(a in 0usize..200, b in 0usize..200) {
            let data = payload();
            let whole = JsonObjectScanner::new().push(&data);

            let mut cuts = [a.min(data.len()), b.min(data.len())];
            cuts.sort_unstable();
            let mut scanner = JsonObjectScanner::new();
            let mut pieces = scanner.push(&data[..cuts[0]]);
            pieces.extend(scanner.push(&data[cuts[0]..cuts[1]]));
            pieces.extend(scanner.push(&data[cuts[1]..]));

            prop_assert_eq!(pieces, whole);
        }
    }
}
