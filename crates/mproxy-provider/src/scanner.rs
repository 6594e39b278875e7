/// Incremental line splitter for streaming bodies.
///
/// Upstream lines can exceed 8 MiB (large tool-call arguments), so the limit
/// guards only against runaway buffers; hitting it is an error, never a
/// silent truncation.
#[derive(Debug)]
pub struct LineScanner {
    buffer: Vec<u8>,
    limit: usize,
}

pub const MAX_LINE_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("stream line exceeded {limit} bytes")]
pub struct LineOverflow {
    pub limit: usize,
}

impl LineScanner {
    pub fn new(limit: usize) -> Self {
        Self {
            buffer: Vec::new(),
            limit,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, LineOverflow> {
        let mut out = Vec::new();
        for byte in chunk {
            if *byte == b'\n' {
                out.push(self.take_line());
                continue;
            }
            self.buffer.push(*byte);
            if self.buffer.len() > self.limit {
                return Err(LineOverflow { limit: self.limit });
            }
        }
        Ok(out)
    }

    /// Flush a trailing unterminated line at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        Some(self.take_line())
    }

    fn take_line(&mut self) -> String {
        if self.buffer.last() == Some(&b'\r') {
            self.buffer.pop();
        }
        String::from_utf8_lossy(&std::mem::take(&mut self.buffer)).into_owned()
    }
}
