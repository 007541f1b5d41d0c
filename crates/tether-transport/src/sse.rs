//! Minimal Server-Sent Events parser.
//!
//! Only `data:` fields matter here; `event:`, `id:` and `retry:` are
//! accepted and ignored, comment lines (leading `:`) are skipped.

/// Incremental SSE parser fed with arbitrary text chunks.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    data: Vec<String>,
}

impl SseParser {
    /// Create an empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the payloads of every event it completed.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        while let Some(line_end) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=line_end).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
                    self.data.clear();
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            if field == "data" {
                self.data.push(value.to_string());
            }
        }
        events
    }

    /// Flush an event left unterminated when the stream ended.
    pub fn finish(&mut self) -> Option<String> {
        if !self.buffer.is_empty() {
            let tail = std::mem::take(&mut self.buffer);
            let _ = self.push(&format!("{tail}\n"));
        }
        if self.data.is_empty() {
            None
        } else {
            let event = self.data.join("\n");
            self.data.clear();
            Some(event)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_event() {
        let mut parser = SseParser::new();
        let events = parser.push("data: {\"a\":1}\n\n");
        assert_eq!(events, vec!["{\"a\":1}".to_string()]);
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.push("event: message\nda").is_empty());
        assert!(parser.push("ta: hel").is_empty());
        assert_eq!(parser.push("lo\r\n\r\n"), vec!["hello".to_string()]);
    }

    #[test]
    fn test_multiline_data_joined() {
        let mut parser = SseParser::new();
        let events = parser.push("data: one\ndata: two\n\n");
        assert_eq!(events, vec!["one\ntwo".to_string()]);
    }

    #[test]
    fn test_comments_and_blank_keepalives_ignored() {
        let mut parser = SseParser::new();
        assert!(parser.push(": keep-alive\n\n\n").is_empty());
        let events = parser.push("id: 4\nretry: 100\ndata:x\n\n");
        assert_eq!(events, vec!["x".to_string()]);
    }

    #[test]
    fn test_finish_flushes_unterminated_event() {
        let mut parser = SseParser::new();
        assert!(parser.push("data: tail").is_empty());
        assert_eq!(parser.finish(), Some("tail".to_string()));
        assert_eq!(parser.finish(), None);
    }
}
