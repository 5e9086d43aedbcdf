// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Reassembly of a byte stream into newline-delimited lines.

use tracing::{debug, warn};

/// Longest partial line kept while waiting for its terminator.
pub const MAX_LINE_LENGTH: usize = 4096;

/// Splits arbitrarily chunked bytes into trimmed lines.
pub struct LineReassembler {
    buffer: Vec<u8>,
    /// Skipping the rest of an over-long line up to its terminator.
    discarding: bool,
}

impl LineReassembler {
    /// Create a new line reassembler.
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(256),
            discarding: false,
        }
    }

    /// Append a chunk and return every line it completes, in order.
    ///
    /// Blank lines are dropped. A trailing partial line is retained for the
    /// next chunk. A line longer than [`MAX_LINE_LENGTH`] is dropped whole,
    /// including whatever of it arrives after the limit was hit.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut chunk = chunk;
        if self.discarding {
            match chunk.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    debug!("Skipped {} bytes of over-long line", pos + 1);
                    self.discarding = false;
                    chunk = &chunk[pos + 1..];
                }
                None => return Vec::new(),
            }
        }
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            if pos > MAX_LINE_LENGTH {
                warn!("Discarding {} byte line", pos);
                continue;
            }
            let text = String::from_utf8_lossy(&raw);
            let trimmed = text.trim();
            if trimmed.is_empty() {
                debug!("Dropping empty line");
                continue;
            }
            lines.push(trimmed.to_string());
        }

        if self.buffer.len() > MAX_LINE_LENGTH {
            warn!(
                "Discarding {} bytes without line terminator",
                self.buffer.len()
            );
            self.buffer.clear();
            self.discarding = true;
        }

        lines
    }

    /// Drop any partial line.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }

    /// Bytes held for an unterminated line.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for LineReassembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_chunk_multiple_lines() {
        let mut reassembler = LineReassembler::new();
        let lines = reassembler.push(b"ON\nIGNITION_OFF\n");
        assert_eq!(lines, vec!["ON", "IGNITION_OFF"]);
        assert_eq!(reassembler.pending_len(), 0);
    }

    #[test]
    fn test_every_two_way_split() {
        let stream = b"ON\nIGNITION_OFF\n";
        for first in 0..=stream.len() {
            for second in first..=stream.len() {
                let mut reassembler = LineReassembler::new();
                let mut lines = reassembler.push(&stream[..first]);
                lines.extend(reassembler.push(&stream[first..second]));
                lines.extend(reassembler.push(&stream[second..]));
                assert_eq!(lines, vec!["ON", "IGNITION_OFF"], "split at {first}/{second}");
            }
        }
    }

    #[test]
    fn test_partial_line_is_retained() {
        let mut reassembler = LineReassembler::new();
        assert!(reassembler.push(b"IGNI").is_empty());
        assert_eq!(reassembler.pending_len(), 4);
        assert_eq!(reassembler.push(b"TION_ON\r\n"), vec!["IGNITION_ON"]);
        assert_eq!(reassembler.pending_len(), 0);
    }

    #[test]
    fn test_empty_lines_are_dropped() {
        let mut reassembler = LineReassembler::new();
        let lines = reassembler.push(b"\n\r\n  \nOFF\n\n");
        assert_eq!(lines, vec!["OFF"]);
    }

    #[test]
    fn test_surrounding_whitespace_trimmed() {
        let mut reassembler = LineReassembler::new();
        assert_eq!(reassembler.push(b"  status \t\n"), vec!["status"]);
    }

    #[test]
    fn test_overlong_partial_line_discarded() {
        let mut reassembler = LineReassembler::new();
        let junk = vec![b'x'; MAX_LINE_LENGTH + 1];
        assert!(reassembler.push(&junk).is_empty());
        assert_eq!(reassembler.pending_len(), 0);
        assert!(reassembler.push(b"ON\n").is_empty());
        assert_eq!(reassembler.push(b"OFF\n"), vec!["OFF"]);
    }

    #[test]
    fn test_overlong_line_tail_never_dispatched() {
        let mut reassembler = LineReassembler::new();
        assert!(reassembler.push(&vec![b'x'; MAX_LINE_LENGTH + 1]).is_empty());
        assert!(reassembler.push(&vec![b'y'; 100]).is_empty());
        assert_eq!(reassembler.push(b"ON\nOFF\n"), vec!["OFF"]);
    }

    #[test]
    fn test_overlong_terminated_line_in_one_chunk() {
        let mut reassembler = LineReassembler::new();
        let mut chunk = b"ON\n".to_vec();
        chunk.extend(vec![b'x'; MAX_LINE_LENGTH + 1]);
        chunk.extend_from_slice(b"ON\nOFF\n");
        assert_eq!(reassembler.push(&chunk), vec!["ON", "OFF"]);
    }

    #[test]
    fn test_line_at_limit_is_kept() {
        let mut reassembler = LineReassembler::new();
        let mut line = vec![b'a'; MAX_LINE_LENGTH];
        line.push(b'\n');
        let lines = reassembler.push(&line);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].len(), MAX_LINE_LENGTH);
    }

    #[test]
    fn test_reset() {
        let mut reassembler = LineReassembler::new();
        reassembler.push(b"partial");
        reassembler.push(&vec![b'x'; MAX_LINE_LENGTH + 1]);
        reassembler.reset();
        assert_eq!(reassembler.push(b"OFF\n"), vec!["OFF"]);
    }
}
