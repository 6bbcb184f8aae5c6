//! NDJSON parser
//!
//! Splits the chunked response body into lines and decodes each one as a
//! [`FlashRecord`]. Chunk boundaries are arbitrary, so partial lines are
//! buffered until their newline arrives.

use bytes::Bytes;
use tracing::trace;

use crate::error::{FlashClientError, Result};
use crate::types::FlashRecord;

/// Incremental line parser
#[derive(Debug, Default)]
pub struct NdjsonParser {
    /// Bytes of the current, not yet terminated line
    buffer: Vec<u8>,
}

impl NdjsonParser {
    /// Create a new parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes into the parser and extract any complete records
    pub fn feed(&mut self, bytes: &Bytes) -> Vec<Result<FlashRecord>> {
        let mut records = Vec::new();
        self.buffer.extend_from_slice(bytes);

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(record) = parse_line(&line[..line.len() - 1]) {
                records.push(record);
            }
        }

        records
    }

    /// Flush a trailing line that was not newline-terminated
    pub fn finish(&mut self) -> Option<Result<FlashRecord>> {
        let line = std::mem::take(&mut self.buffer);
        parse_line(&line)
    }
}

fn parse_line(line: &[u8]) -> Option<Result<FlashRecord>> {
    // Handle \r\n line endings
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.iter().all(u8::is_ascii_whitespace) {
        trace!("Skipping blank line");
        return None;
    }

    Some(serde_json::from_slice(line).map_err(|e| {
        let text = String::from_utf8_lossy(line);
        let preview: String = text.chars().take(100).collect();
        FlashClientError::ParseError(format!("{} (line: {})", e, preview))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_records() {
        let mut parser = NdjsonParser::new();
        let input = "{\"type\": \"log\", \"message\": \"RUN: openocd\"}\n{\"type\": \"complete\", \"success\": true, \"message\": \"done\"}\n";
        let records = parser.feed(&Bytes::from(input));

        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].as_ref().unwrap(),
            &FlashRecord::Log {
                message: "RUN: openocd".into()
            }
        );
        assert!(records[1].as_ref().unwrap().is_complete());
    }

    #[test]
    fn test_parse_chunked_data() {
        let mut parser = NdjsonParser::new();

        let first = parser.feed(&Bytes::from_static(b"{\"type\": \"log\", \"mess"));
        assert!(first.is_empty());

        let second = parser.feed(&Bytes::from_static(b"age\": \"OpenOCD: A\"}\n{\"type\""));
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].as_ref().unwrap().message(), "OpenOCD: A");

        let third = parser.feed(&Bytes::from_static(
            b": \"complete\", \"success\": false, \"message\": \"x\"}\n",
        ));
        assert_eq!(third.len(), 1);
    }

    #[test]
    fn test_multibyte_split_across_chunks() {
        let mut parser = NdjsonParser::new();
        let line = "{\"type\": \"log\", \"message\": \"書き込み\"}\n".as_bytes();
        let (a, b) = line.split_at(35);

        assert!(parser.feed(&Bytes::copy_from_slice(a)).is_empty());
        let records = parser.feed(&Bytes::copy_from_slice(b));
        assert_eq!(records[0].as_ref().unwrap().message(), "書き込み");
    }

    #[test]
    fn test_crlf_and_blank_lines() {
        let mut parser = NdjsonParser::new();
        let records = parser.feed(&Bytes::from_static(
            b"\r\n{\"type\": \"log\", \"message\": \"a\"}\r\n\n",
        ));
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_invalid_line() {
        let mut parser = NdjsonParser::new();
        let records = parser.feed(&Bytes::from_static(b"not json\n"));
        assert!(matches!(records[0], Err(FlashClientError::ParseError(_))));
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut parser = NdjsonParser::new();
        assert!(parser
            .feed(&Bytes::from_static(b"{\"type\": \"log\", \"message\": \"tail\"}"))
            .is_empty());
        let record = parser.finish().unwrap().unwrap();
        assert_eq!(record.message(), "tail");
        assert!(parser.finish().is_none());
    }
}
