// src/line.rs
//
// Incremental line assembly for the serial receive path.
// Buffers raw bytes and yields complete lines on '\n', stripping a
// trailing '\r' so both LF and CRLF peers display cleanly.

/// Max buffered length before a forced split. A peer that never sends a
/// terminator cannot grow the buffer without bound.
pub const MAX_LINE_LENGTH: usize = 4096;

pub struct LineSplitter {
    buffer: Vec<u8>,
    max_length: usize,
    /// Set after a forced split: a '\n' arriving next terminates the line
    /// that was already emitted and must not produce an empty one.
    swallow_lf: bool,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        LineSplitter {
            buffer: Vec::new(),
            max_length,
            swallow_lf: false,
        }
    }

    /// Feed a chunk of raw bytes, returning any lines completed by it.
    /// Partial input is carried over to the next feed.
    pub fn feed(&mut self, data: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for &byte in data {
            if std::mem::take(&mut self.swallow_lf) && byte == b'\n' {
                continue;
            }

            if byte == b'\n' {
                if self.buffer.last() == Some(&b'\r') {
                    self.buffer.pop();
                }
                let line: Vec<u8> = self.buffer.drain(..).collect();
                lines.push(String::from_utf8_lossy(&line).into_owned());
            } else {
                self.buffer.push(byte);

                // Force split on max length. A terminator straddling the
                // boundary must not leave a stray '\r' in the emitted line
                // or yield an empty follow-on line.
                if self.buffer.len() >= self.max_length {
                    if self.buffer.last() == Some(&b'\r') {
                        self.buffer.pop();
                    }
                    let line: Vec<u8> = self.buffer.drain(..).collect();
                    lines.push(String::from_utf8_lossy(&line).into_owned());
                    self.swallow_lf = true;
                }
            }
        }

        lines
    }

    /// Surface a trailing unterminated chunk when the stream ends.
    pub fn flush(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let line: Vec<u8> = self.buffer.drain(..).collect();
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_lines() {
        let mut splitter = LineSplitter::new();
        let lines = splitter.feed(b"hello\nworld\n");
        assert_eq!(lines, vec!["hello".to_string(), "world".to_string()]);
    }

    #[test]
    fn test_crlf_stripped() {
        let mut splitter = LineSplitter::new();
        let lines = splitter.feed(b"ok\r\n");
        assert_eq!(lines, vec!["ok".to_string()]);
    }

    #[test]
    fn test_partial_carried_across_feeds() {
        let mut splitter = LineSplitter::new();
        assert!(splitter.feed(b"hel").is_empty());
        assert!(splitter.feed(b"lo").is_empty());
        let lines = splitter.feed(b"\nwor");
        assert_eq!(lines, vec!["hello".to_string()]);
        let lines = splitter.feed(b"ld\n");
        assert_eq!(lines, vec!["world".to_string()]);
    }

    #[test]
    fn test_empty_line_preserved() {
        let mut splitter = LineSplitter::new();
        let lines = splitter.feed(b"a\n\nb\n");
        assert_eq!(
            lines,
            vec!["a".to_string(), "".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn test_forced_split_at_max_length() {
        let mut splitter = LineSplitter::with_max_length(4);
        let lines = splitter.feed(b"abcdef");
        assert_eq!(lines, vec!["abcd".to_string()]);
        assert_eq!(splitter.flush(), Some("ef".to_string()));
    }

    #[test]
    fn test_forced_split_strips_boundary_crlf() {
        let mut splitter = LineSplitter::with_max_length(4);
        let lines = splitter.feed(b"abc\r\ndef\n");
        assert_eq!(lines, vec!["abc".to_string(), "def".to_string()]);
    }

    #[test]
    fn test_forced_split_swallows_lf_across_feeds() {
        let mut splitter = LineSplitter::with_max_length(4);
        assert_eq!(splitter.feed(b"abcd"), vec!["abcd".to_string()]);
        assert_eq!(splitter.feed(b"\nxy\n"), vec!["xy".to_string()]);
    }

    #[test]
    fn test_flush_trailing_partial() {
        let mut splitter = LineSplitter::new();
        let lines = splitter.feed(b"done\ntail");
        assert_eq!(lines, vec!["done".to_string()]);
        assert_eq!(splitter.flush(), Some("tail".to_string()));
        assert_eq!(splitter.flush(), None);
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let mut splitter = LineSplitter::new();
        let lines = splitter.feed(&[0x61, 0xFF, 0x62, b'\n']);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0], "a\u{FFFD}b");
    }
}
