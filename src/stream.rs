//! Incremental decoder for SSE-style streamed responses.
//!
//! The proxy frames streamed replies as newline-delimited records:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//! data: {"choices":[{"delta":{"content":"lo"}}]}
//! data: [DONE]
//! ```
//!
//! Chunks arrive at arbitrary byte boundaries, so a record — or even a
//! single multi-byte character — may be split across chunks. The decoder
//! carries that state between `feed` calls.

/// Stream-terminating sentinel.
const DONE_SENTINEL: &str = "[DONE]";

/// Per-request decoder state: UTF-8 carry bytes, the trailing partial line,
/// and the assistant text assembled so far.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Incomplete multi-byte sequence from the end of the previous chunk.
    carry: Vec<u8>,
    /// Decoded text not yet terminated by a line break.
    line_buf: String,
    /// Accumulated assistant output for this turn.
    text: String,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw chunk, returning the text deltas it completed, in order.
    ///
    /// Blank lines, lines without the `data:` prefix, and records that fail
    /// to parse are skipped as keepalives. After the `[DONE]` sentinel is
    /// seen, remaining input is ignored.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        if self.done {
            return Vec::new();
        }
        self.decode_utf8(chunk);

        let mut deltas = Vec::new();
        while let Some(newline_pos) = self.line_buf.find('\n') {
            let line = self.line_buf[..newline_pos]
                .trim_end_matches('\r')
                .to_string();
            self.line_buf.drain(..=newline_pos);

            if let Some(delta) = self.process_line(&line) {
                self.text.push_str(&delta);
                deltas.push(delta);
            }
            if self.done {
                break;
            }
        }
        deltas
    }

    /// Process a trailing unterminated line once the byte source is
    /// exhausted. End-of-data without `[DONE]` is a valid way for a stream
    /// to end.
    pub fn finish(&mut self) -> Option<String> {
        if self.done || self.line_buf.trim().is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.line_buf);
        let delta = self.process_line(line.trim_end_matches('\r'))?;
        self.text.push_str(&delta);
        Some(delta)
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Consume the decoder, yielding the full accumulated assistant text.
    pub fn into_text(self) -> String {
        self.text
    }

    /// Incremental UTF-8 decode: append every complete scalar value from
    /// `chunk` to the line buffer, carrying an incomplete trailing sequence
    /// into the next call. Invalid sequences decode to U+FFFD.
    fn decode_utf8(&mut self, chunk: &[u8]) {
        let mut bytes = std::mem::take(&mut self.carry);
        bytes.extend_from_slice(chunk);

        let mut rest: &[u8] = &bytes;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    self.line_buf.push_str(valid);
                    break;
                }
                Err(err) => {
                    let (valid, tail) = rest.split_at(err.valid_up_to());
                    if let Ok(valid) = std::str::from_utf8(valid) {
                        self.line_buf.push_str(valid);
                    }
                    match err.error_len() {
                        // Incomplete sequence at the end: wait for more bytes.
                        None => {
                            self.carry = tail.to_vec();
                            break;
                        }
                        Some(invalid_len) => {
                            self.line_buf.push(char::REPLACEMENT_CHARACTER);
                            rest = &tail[invalid_len..];
                        }
                    }
                }
            }
        }
    }

    /// Extract the delta from one complete line, updating the done flag.
    fn process_line(&mut self, line: &str) -> Option<String> {
        let payload = line.strip_prefix("data:")?.trim();
        if payload == DONE_SENTINEL {
            self.done = true;
            return None;
        }
        // Records that are not JSON are protocol keepalives, not errors.
        let event: serde_json::Value = serde_json::from_str(payload).ok()?;
        let content = event["choices"][0]["delta"]["content"].as_str()?;
        if content.is_empty() {
            None
        } else {
            Some(content.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta_record(content: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":{}}}}}]}}\n",
            serde_json::to_string(content).unwrap()
        )
    }

    #[test]
    fn accumulates_deltas_and_signals_done() {
        let mut decoder = SseDecoder::new();
        let mut all = Vec::new();
        all.extend(decoder.feed(delta_record("Hel").as_bytes()));
        all.extend(decoder.feed(delta_record("lo").as_bytes()));
        assert!(!decoder.is_done());
        all.extend(decoder.feed(b"data: [DONE]\n"));
        assert!(decoder.is_done());
        assert_eq!(all, vec!["Hel", "lo"]);
        assert_eq!(decoder.into_text(), "Hello");
    }

    #[test]
    fn record_split_across_chunks_parses_once_complete() {
        let mut decoder = SseDecoder::new();
        let record = delta_record("hi there");
        let (head, tail) = record.split_at(12);
        assert!(decoder.feed(head.as_bytes()).is_empty());
        let deltas = decoder.feed(tail.as_bytes());
        assert_eq!(deltas, vec!["hi there"]);
    }

    #[test]
    fn multiple_records_in_one_chunk() {
        let mut decoder = SseDecoder::new();
        let chunk = format!("{}{}", delta_record("a"), delta_record("b"));
        assert_eq!(decoder.feed(chunk.as_bytes()), vec!["a", "b"]);
    }

    #[test]
    fn multibyte_char_split_across_chunks_decodes_intact() {
        let mut decoder = SseDecoder::new();
        let record = delta_record("héllo");
        let bytes = record.as_bytes();
        // Split inside the two-byte encoding of 'é'.
        let split = record.find('é').unwrap() + 1;
        assert!(decoder.feed(&bytes[..split]).is_empty());
        let deltas = decoder.feed(&bytes[split..]);
        assert_eq!(deltas, vec!["héllo"]);
    }

    #[test]
    fn malformed_json_is_skipped_silently() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: {not json\n").is_empty());
        let deltas = decoder.feed(delta_record("ok").as_bytes());
        assert_eq!(deltas, vec!["ok"]);
        assert!(!decoder.is_done());
    }

    #[test]
    fn blank_and_non_data_lines_are_ignored() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"\n: keepalive comment\nevent: ping\n\n").is_empty());
        assert!(!decoder.is_done());
    }

    #[test]
    fn missing_content_field_is_empty_delta() {
        let mut decoder = SseDecoder::new();
        assert!(decoder
            .feed(b"data: {\"choices\":[{\"delta\":{}}]}\n")
            .is_empty());
        assert!(decoder
            .feed(b"data: {\"choices\":[{\"finish_reason\":\"stop\"}]}\n")
            .is_empty());
    }

    #[test]
    fn input_after_done_is_ignored() {
        let mut decoder = SseDecoder::new();
        let chunk = format!("data: [DONE]\n{}", delta_record("late"));
        assert!(decoder.feed(chunk.as_bytes()).is_empty());
        assert!(decoder.feed(delta_record("later").as_bytes()).is_empty());
        assert_eq!(decoder.text(), "");
    }

    #[test]
    fn crlf_line_endings_are_handled() {
        let mut decoder = SseDecoder::new();
        let record = delta_record("x").replace('\n', "\r\n");
        assert_eq!(decoder.feed(record.as_bytes()), vec!["x"]);
        assert!(decoder.feed(b"data: [DONE]\r\n").is_empty());
        assert!(decoder.is_done());
    }

    #[test]
    fn finish_flushes_trailing_unterminated_record() {
        let mut decoder = SseDecoder::new();
        let record = delta_record("tail");
        // No trailing newline: the record stays buffered during feed.
        assert!(decoder.feed(record.trim_end().as_bytes()).is_empty());
        assert_eq!(decoder.finish(), Some("tail".to_string()));
        assert_eq!(decoder.text(), "tail");
    }

    #[test]
    fn invalid_utf8_becomes_replacement_char() {
        let mut decoder = SseDecoder::new();
        let mut bytes = b"data: {\"choices\":[{\"delta\":{\"content\":\"a".to_vec();
        bytes.push(0xFF);
        bytes.extend_from_slice(b"b\"}}]}\n");
        let deltas = decoder.feed(&bytes);
        assert_eq!(deltas, vec!["a\u{FFFD}b"]);
    }
}
