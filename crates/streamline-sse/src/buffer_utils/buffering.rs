use std::collections::VecDeque;

use streamline_types::StreamError;

/// Circular buffer for line-based parsing of a byte stream
/// Uses VecDeque so consumed lines drain from the front without shifting
pub struct CircularLineBuffer {
    buffer: VecDeque<u8>,
}

impl CircularLineBuffer {
    /// Create a new buffer with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
        }
    }

    /// Add bytes to the buffer
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend(bytes);
    }

    /// Extract next line (up to \n) from buffer, without its terminator
    ///
    /// Only the line ending (`\n` or `\r\n`) is removed: SSE payloads keep
    /// their surrounding whitespace. Returns None if no complete line is
    /// available.
    pub fn next_line(&mut self) -> Option<Result<String, StreamError>> {
        let newline_pos = self.buffer.iter().position(|&b| b == b'\n')?;

        let mut line_bytes: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
        line_bytes.pop();
        if line_bytes.last() == Some(&b'\r') {
            line_bytes.pop();
        }

        match String::from_utf8(line_bytes) {
            Ok(line) => Some(Ok(line)),
            Err(e) => Some(Err(StreamError::transport(format!("Invalid UTF-8: {}", e)))),
        }
    }

    /// Current buffer size
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_buffer_basic() {
        let mut buffer = CircularLineBuffer::with_capacity(64);

        buffer.extend(b"line1\nline2\n");

        assert_eq!(buffer.next_line().unwrap().unwrap(), "line1");
        assert_eq!(buffer.next_line().unwrap().unwrap(), "line2");
        assert!(buffer.next_line().is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_partial_line() {
        let mut buffer = CircularLineBuffer::with_capacity(64);

        buffer.extend(b"partial");
        assert!(buffer.next_line().is_none());
        assert_eq!(buffer.len(), 7);

        buffer.extend(b" line\n");
        assert_eq!(buffer.next_line().unwrap().unwrap(), "partial line");
    }

    #[test]
    fn test_crlf_and_whitespace_preserved() {
        let mut buffer = CircularLineBuffer::with_capacity(64);

        buffer.extend(b"data:  padded  \r\n\r\n");
        assert_eq!(buffer.next_line().unwrap().unwrap(), "data:  padded  ");
        assert_eq!(buffer.next_line().unwrap().unwrap(), "");
    }

    #[test]
    fn test_invalid_utf8() {
        let mut buffer = CircularLineBuffer::with_capacity(8);

        buffer.extend(&[0xff, 0xfe, b'\n']);
        assert!(buffer.next_line().unwrap().is_err());
    }
}
