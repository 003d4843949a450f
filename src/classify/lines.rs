//! Incremental line splitting for chunked process output.
//!
//! Stdout arrives in arbitrary chunks. A chunk may end in the middle of a
//! line, or even in the middle of a multi-byte character, so bytes are
//! buffered until a terminator is seen and only then decoded.

/// Accumulates raw output bytes and yields complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    /// Bytes of the current unterminated fragment.
    pending: Vec<u8>,
}

impl LineBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completes, in order.
    ///
    /// Lines are split on `\n`; a `\r` directly before it is dropped. The
    /// trailing fragment after the last terminator is kept for the next call.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        complete[..last_newline]
            .split(|&b| b == b'\n')
            .map(decode_line)
            .collect()
    }

    /// Take the unterminated fragment left at end of stream.
    ///
    /// Returns `None` when nothing is buffered.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let fragment = std::mem::take(&mut self.pending);
        Some(decode_line(&fragment))
    }

    /// Number of bytes waiting for a terminator.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
