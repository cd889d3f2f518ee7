//! Byte-to-line framing shared by the attach backends.

/// Accumulates raw bytes and splits them into lines on `\n`.
///
/// The trailing `\n` and an optional `\r` are stripped. Invalid UTF-8 is
/// replaced lossily.
#[derive(Debug, Default)]
pub struct LineFramer {
    pending: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and return every line they complete, in order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let mut one: Vec<u8> = self.pending.drain(..=pos).collect();
            trim_newline(&mut one);
            lines.push(String::from_utf8_lossy(&one).into_owned());
        }
        lines
    }

    /// Take the unterminated tail, if any. Used when the source ends.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let mut rest = std::mem::take(&mut self.pending);
        trim_newline(&mut rest);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }

    /// Drop any partial line (e.g. after the source was truncated).
    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

/// Return the last `n` complete lines of `chunk`.
///
/// `chunk` is the tail end of a file, so its first line is likely cut off
/// unless `chunk_is_whole` says the read started at offset 0. A trailing
/// unterminated line is kept as the final entry, the way `tail` prints it.
pub fn last_lines(chunk: &[u8], n: usize, chunk_is_whole: bool) -> Vec<String> {
    if n == 0 || chunk.is_empty() {
        return Vec::new();
    }

    let mut parts: Vec<&[u8]> = chunk.split(|&b| b == b'\n').collect();
    // `split` yields an empty final part when the chunk ends with '\n'.
    if chunk.last() == Some(&b'\n') {
        parts.pop();
    }
    if !chunk_is_whole && !parts.is_empty() {
        parts.remove(0);
    }

    let skip = parts.len().saturating_sub(n);
    parts[skip..]
        .iter()
        .map(|p| {
            let p = p.strip_suffix(b"\r").unwrap_or(p);
            String::from_utf8_lossy(p).into_owned()
        })
        .collect()
}

fn trim_newline(buf: &mut Vec<u8>) {
    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
}
