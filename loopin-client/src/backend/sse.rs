//! Minimal incremental parser for `text/event-stream` payloads, enough
//! for the change-notification stream the realtime store emits.

/// One parsed server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseFrame {
    pub(crate) event: String,
    pub(crate) data: String,
}

/// Accumulates raw stream chunks and yields complete frames. Chunks may
/// split lines (and UTF-8 sequences) at arbitrary byte boundaries.
#[derive(Debug, Default)]
pub(crate) struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every frame completed by it.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(frame) = self.take_frame() {
                    frames.push(frame);
                }
                continue;
            }
            if line.starts_with(':') {
                // Comment line, e.g. keep-alives.
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }
        frames
    }

    fn take_frame(&mut self) -> Option<SseFrame> {
        if self.event.is_none() && self.data.is_empty() {
            return None;
        }
        let event = self.event.take().unwrap_or_else(|| "message".to_string());
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame { event, data })
    }
}

#[cfg(test)]
mod tests {
    use super::SseParser;

    #[test]
    fn parses_a_complete_frame() {
        let mut parser = SseParser::new();
        let frames = parser.push(b"event: put\ndata: {\"path\":\"/\"}\n\n");

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "put");
        assert_eq!(frames[0].data, "{\"path\":\"/\"}");
    }

    #[test]
    fn reassembles_frames_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"event: pa").is_empty());
        assert!(parser.push(b"tch\ndata: null").is_empty());
        let frames = parser.push(b"\n\n");

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "patch");
        assert_eq!(frames[0].data, "null");
    }

    #[test]
    fn parses_several_frames_from_one_chunk() {
        let mut parser = SseParser::new();
        let frames = parser.push(b"event: put\ndata: 1\n\nevent: put\ndata: 2\n\n");

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data, "1");
        assert_eq!(frames[1].data, "2");
    }

    #[test]
    fn ignores_comment_keepalives() {
        let mut parser = SseParser::new();
        assert!(parser.push(b": keep-alive\n\n").is_empty());
    }

    #[test]
    fn joins_multiline_data() {
        let mut parser = SseParser::new();
        let frames = parser.push(b"data: first\ndata: second\n\n");

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "message");
        assert_eq!(frames[0].data, "first\nsecond");
    }

    #[test]
    fn handles_crlf_line_endings() {
        let mut parser = SseParser::new();
        let frames = parser.push(b"event: put\r\ndata: 1\r\n\r\n");

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "put");
    }
}
