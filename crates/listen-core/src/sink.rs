//! The shared output sink every attachment writes to.
//!
//! Each call writes one whole line under a single lock, so concurrent
//! attachments never split each other's lines. No ordering is imposed
//! beyond that.

use std::io::{self, Write};
use std::sync::Mutex;

use crate::types::LabeledLine;

/// Destination for labeled lines (primary output) and notices (diagnostics).
pub trait LineSink: Send + Sync {
    /// Write one line of primary output. The trailing `\n` is added here.
    fn write_line(&self, text: &str) -> io::Result<()>;

    /// Write one diagnostic line (stream ended, stream failed, ...).
    fn write_notice(&self, text: &str) -> io::Result<()>;

    /// Render and write a labeled line: `[<pid>: <stream>] <content>`.
    fn emit(&self, line: &LabeledLine) -> io::Result<()> {
        self.write_line(&line.to_string())
    }
}

/// A [`LineSink`] over two writers: one for lines, one for notices.
pub struct WriterSink<O, E> {
    out: Mutex<O>,
    err: Mutex<E>,
}

impl<O: Write + Send, E: Write + Send> WriterSink<O, E> {
    pub fn new(out: O, err: E) -> Self {
        Self {
            out: Mutex::new(out),
            err: Mutex::new(err),
        }
    }

    /// Consume the sink and return both writers.
    pub fn into_inner(self) -> (O, E) {
        (
            self.out.into_inner().unwrap_or_else(|p| p.into_inner()),
            self.err.into_inner().unwrap_or_else(|p| p.into_inner()),
        )
    }
}

impl WriterSink<io::Stdout, io::Stderr> {
    /// Lines to stdout, notices to stderr.
    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }
}

fn write_locked<W: Write>(writer: &Mutex<W>, text: &str) -> io::Result<()> {
    let mut w = writer.lock().unwrap_or_else(|p| p.into_inner());
    let mut buf = Vec::with_capacity(text.len() + 1);
    buf.extend_from_slice(text.as_bytes());
    buf.push(b'\n');
    w.write_all(&buf)?;
    w.flush()
}

impl<O: Write + Send, E: Write + Send> LineSink for WriterSink<O, E> {
    fn write_line(&self, text: &str) -> io::Result<()> {
        write_locked(&self.out, text)
    }

    fn write_notice(&self, text: &str) -> io::Result<()> {
        write_locked(&self.err, text)
    }
}
