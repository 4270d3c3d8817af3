//! Minimal SSE line buffering shared by the streaming providers.

/// Accumulates raw response bytes and yields complete `data:` payloads.
///
/// Both the OpenAI and Anthropic streaming APIs put one complete JSON
/// document on each `data:` line, so line-level framing is sufficient; event
/// names and comments are ignored.
#[derive(Default)]
pub(crate) struct SseLineBuffer {
    buf: String,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns the `data:` payloads completed by this chunk.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.push_str(&String::from_utf8_lossy(bytes));
        let mut payloads = Vec::new();
        while let Some(pos) = self.buf.find('\n') {
            let line: String = self.buf.drain(..=pos).collect();
            let line = line.trim_end();
            if let Some(data) = line.strip_prefix("data:") {
                payloads.push(data.trim_start().to_string());
            }
        }
        payloads
    }
}
