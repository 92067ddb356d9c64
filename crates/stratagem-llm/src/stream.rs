use std::sync::Arc;

/// Callback receiving streamed tokens in arrival order.
///
/// Back-ends with a separate reasoning stream bracket it with
/// [`THINK_OPEN`] / [`THINK_CLOSE`] so a consumer can partition the
/// display; the reasoning tokens themselves never appear in the value a
/// generator returns.
pub type TokenSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Emitted to the sink before the first reasoning token.
pub const THINK_OPEN: &str = "<think>";
/// Emitted to the sink before the first main token that follows reasoning.
pub const THINK_CLOSE: &str = "</think>";

/// Parse a single SSE line (`event: <type>` or `data: <payload>`).
pub fn parse_sse_line(line: &str) -> Option<SseParsed> {
    if let Some(event_type) = line.strip_prefix("event: ") {
        Some(SseParsed::Event(event_type.to_string()))
    } else {
        line.strip_prefix("data: ")
            .map(|data| SseParsed::Data(data.to_string()))
    }
}

#[derive(Debug)]
pub enum SseParsed {
    Event(String),
    Data(String),
}

/// Accumulates partial chunks and yields complete SSE lines.
///
/// Network chunks split lines arbitrarily; the buffer keeps the trailing
/// incomplete line until the next chunk arrives.
#[derive(Default)]
pub struct LineBuffer {
    buf: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk, returning every complete line it closed.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buf.push_str(chunk);
        let mut lines: Vec<String> = self.buf.split('\n').map(str::to_string).collect();
        self.buf = lines.pop().unwrap_or_default();
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_event_and_data_lines() {
        match parse_sse_line("event: message_start") {
            Some(SseParsed::Event(e)) => assert_eq!(e, "message_start"),
            other => panic!("unexpected: {:?}", other),
        }
        match parse_sse_line("data: {\"x\":1}") {
            Some(SseParsed::Data(d)) => assert_eq!(d, "{\"x\":1}"),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(parse_sse_line(": keepalive").is_none());
    }

    #[test]
    fn line_buffer_holds_partial_lines() {
        let mut buf = LineBuffer::new();
        assert_eq!(buf.push("data: hel"), Vec::<String>::new());
        let lines = buf.push("lo\ndata: wor");
        assert_eq!(lines, vec!["data: hello"]);
        let lines = buf.push("ld\n");
        assert_eq!(lines, vec!["data: world"]);
    }
}
