//! Incremental server-sent-events decoder.
//!
//! Bytes arrive in arbitrary chunks; `SseDecoder::feed` buffers partial
//! lines and returns every frame completed by the chunk. A frame ends at
//! a blank line. `data:` lines are joined with `\n`; lines starting with
//! `:` are comments (keep-alives). Frames with no data are dropped.

/// One dispatched SSE event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
    pub retry_ms: Option<u64>,
}

#[derive(Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
    retry_ms: Option<u64>,
    /// Last `id:` seen, kept across frames.
    last_event_id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Consume a chunk and return the frames it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }

        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => {
                self.id = Some(value.to_string());
                self.last_event_id = Some(value.to_string());
            }
            "retry" => self.retry_ms = value.trim().parse().ok(),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        let id = self.id.take();
        let retry_ms = self.retry_ms.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event,
            data,
            id,
            retry_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_frame() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"event: notification\nid: 7\ndata: {\"type\":\"heartbeat\"}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event.as_deref(), Some("notification"));
        assert_eq!(frames[0].id.as_deref(), Some("7"));
        assert_eq!(frames[0].data, r#"{"type":"heartbeat"}"#);
        assert_eq!(decoder.last_event_id(), Some("7"));
    }

    #[test]
    fn frame_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: {\"type\":").is_empty());
        assert!(decoder.feed(b"\"connected\"}\r").is_empty());
        let frames = decoder.feed(b"\n\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, r#"{"type":"connected"}"#);
    }

    #[test]
    fn multi_line_data_joined() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"data: line one\ndata:line two\n\n");
        assert_eq!(frames[0].data, "line one\nline two");
    }

    #[test]
    fn comments_and_empty_frames_dropped() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b": keep-alive\n\nevent: ping\n\nretry: 3000\ndata: x\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "x");
        assert_eq!(frames[0].retry_ms, Some(3000));
        assert_eq!(frames[0].event, None);
    }

    #[test]
    fn several_frames_in_one_chunk() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"data: a\n\ndata: b\n\ndata: c");
        assert_eq!(frames.len(), 2);
        let rest = decoder.feed(b"\n\n");
        assert_eq!(rest[0].data, "c");
    }
}
