/// Accumulates raw response bytes and yields complete SSE event blocks.
///
/// Works on bytes so a UTF-8 sequence split across network chunks is only
/// decoded once the whole event has arrived.
#[derive(Debug, Default)]
pub struct SseBuffer {
    buffer: Vec<u8>,
}

impl SseBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));
    }

    pub fn next_event_block(&mut self) -> Option<String> {
        let boundary = self.buffer.windows(2).position(|w| w == b"\n\n")?;
        let rest = self.buffer.split_off(boundary + 2);
        let block = std::mem::replace(&mut self.buffer, rest);
        Some(String::from_utf8_lossy(&block).into_owned())
    }

    /// Whatever is left once the body has ended without a trailing blank line.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.iter().all(u8::is_ascii_whitespace) {
            self.buffer.clear();
            return None;
        }
        let block = std::mem::take(&mut self.buffer);
        Some(String::from_utf8_lossy(&block).into_owned())
    }
}

/// Returns each `data:` line of a block on its own. Chat completion streams
/// put one JSON payload per line, so multi-line fields are not joined with
/// `\n` the way a generic SSE client would join them.
pub fn parse_data_lines(event_block: &str) -> Vec<&str> {
    event_block
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .collect()
}
