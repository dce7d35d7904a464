//! Newline-delimited JSON-RPC framing over a byte stream.
//!
//! Kept as a pure, allocation-owning state machine rather than leaning on
//! `tokio::io::BufReader::lines` so it can be driven directly by tests with
//! arbitrary chunk boundaries (a server may flush a single JSON object
//! split across any number of `write()` calls).

use serde_json::Value;

/// Accumulates bytes from a stdio/socket transport and yields parsed
/// JSON-RPC values, one per newline-terminated line. Malformed lines are
/// logged and skipped, not treated as fatal: one corrupt line from a
/// flaky upstream should not tear down the whole connection.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning every complete line's parse
    /// outcome in order. Incomplete trailing data is retained for the
    /// next call.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<FramedLine> {
        self.buffer.extend_from_slice(chunk);
        let mut out = Vec::new();

        loop {
            let Some(newline_at) = self.buffer.iter().position(|&b| b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.buffer.drain(..=newline_at).collect();
            // Drop the trailing '\n' (and a preceding '\r', if any).
            let mut line = &line[..line.len() - 1];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            if let Some(framed) = Self::parse_line(line) {
                out.push(framed);
            }
        }
        out
    }

    /// Whatever partial bytes remain buffered (no trailing newline yet).
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    fn parse_line(line: &[u8]) -> Option<FramedLine> {
        if line.iter().all(|b| b.is_ascii_whitespace()) {
            return None;
        }
        match serde_json::from_slice::<Value>(line) {
            Ok(value) => Some(FramedLine::Message(value)),
            Err(err) => Some(FramedLine::Malformed {
                raw: String::from_utf8_lossy(line).into_owned(),
                error: err.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub enum FramedLine {
    Message(Value),
    Malformed { raw: String, error: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn single_line_in_one_chunk() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"{\"jsonrpc\":\"2.0\",\"id\":1}\n");
        assert_eq!(lines.len(), 1);
        assert!(matches!(lines[0], FramedLine::Message(_)));
    }

    #[test]
    fn line_split_across_chunks() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"{\"jsonrpc\":\"2.0\"").is_empty());
        let lines = framer.push(b",\"id\":1}\n");
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn malformed_line_is_reported_not_fatal() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"not json\n{\"jsonrpc\":\"2.0\",\"id\":2}\n");
        assert_eq!(lines.len(), 2);
        assert!(matches!(lines[0], FramedLine::Malformed { .. }));
        assert!(matches!(lines[1], FramedLine::Message(_)));
    }

    #[test]
    fn whitespace_only_lines_are_skipped() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"   \n\t\n{\"jsonrpc\":\"2.0\",\"id\":3}\n");
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn crlf_is_stripped() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"{\"jsonrpc\":\"2.0\",\"id\":4}\r\n");
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn partial_trailing_bytes_are_retained() {
        let mut framer = LineFramer::new();
        framer.push(b"{\"jsonrpc\":\"2.0\",\"id\":5}\npartial");
        assert_eq!(framer.pending(), b"partial");
    }

    proptest! {
        /// Feeding the same set of JSON-RPC lines through the framer in
        /// arbitrary chunk splits always yields the same sequence of
        /// parsed messages, regardless of where the splits fall.
        #[test]
        fn round_trips_across_arbitrary_chunk_boundaries(split_points in prop::collection::vec(0usize..200, 0..30)) {
            let lines = [
                r#"{"jsonrpc":"2.0","id":1,"method":"a"}"#,
                r#"{"jsonrpc":"2.0","id":2,"method":"b"}"#,
                r#"{"jsonrpc":"2.0","id":3,"method":"c"}"#,
            ];
            let full: String = lines.iter().map(|l| format!("{l}\n")).collect();
            let bytes = full.into_bytes();

            let mut cut_points: Vec<usize> = split_points
                .into_iter()
                .map(|p| p % (bytes.len() + 1))
                .collect();
            cut_points.sort_unstable();
            cut_points.dedup();

            let mut chunks = Vec::new();
            let mut prev = 0;
            for &cut in &cut_points {
                chunks.push(&bytes[prev..cut]);
                prev = cut;
            }
            chunks.push(&bytes[prev..]);

            let mut framer = LineFramer::new();
            let mut messages = Vec::new();
            for chunk in chunks {
                for framed in framer.push(chunk) {
                    if let FramedLine::Message(v) = framed {
                        messages.push(v);
                    }
                }
            }

            prop_assert_eq!(messages.len(), lines.len());
            for (i, msg) in messages.iter().enumerate() {
                prop_assert_eq!(msg["id"].as_i64().unwrap(), (i + 1) as i64);
            }
        }
    }
}
