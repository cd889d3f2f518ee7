//! Direct `/proc/<pid>/fd/<n>` reader.
//!
//! Opens the descriptor's magic link and reads it without any helper
//! process. A regular file behind the descriptor (output redirected to a
//! file) is followed like `tail -f`: backlog first, then polling for
//! appended bytes until the owning process disappears. Anything else
//! (pipe, terminal) is read until EOF or until the process disappears.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_stream::stream;
use futures::Stream;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::lines::{LineFramer, last_lines};
use super::trait_def::{AttachStream, Attacher};
use super::types::{AttachError, AttachEvent};
use crate::types::{LabeledLine, StreamHandle};

/// How far back from the end of a file the backlog scan reads.
const BACKLOG_SCAN_BYTES: u64 = 64 * 1024;

const READ_BUF_BYTES: usize = 16 * 1024;

/// Attach backend that reads `/proc/<pid>/fd/<n>` itself.
#[derive(Debug, Clone)]
pub struct ProcFdAttacher {
    proc_root: PathBuf,
    poll_interval: Duration,
    backlog_lines: usize,
}

impl ProcFdAttacher {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);
    pub const DEFAULT_BACKLOG_LINES: usize = 10;

    /// Read from the real `/proc` with default polling and backlog.
    pub fn new() -> Self {
        Self::with_proc_root("/proc")
    }

    /// Read from a different proc root. Tests point this at a temp dir.
    pub fn with_proc_root(root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: root.into(),
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            backlog_lines: Self::DEFAULT_BACKLOG_LINES,
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn backlog_lines(mut self, lines: usize) -> Self {
        self.backlog_lines = lines;
        self
    }
}

impl Default for ProcFdAttacher {
    fn default() -> Self {
        Self::new()
    }
}

impl Attacher for ProcFdAttacher {
    fn name(&self) -> &str {
        "procfd"
    }

    fn attach(&self, handle: StreamHandle) -> AttachStream {
        let path = handle.fd_path(&self.proc_root);
        let process_dir = handle.process_dir(&self.proc_root);
        let poll_interval = self.poll_interval;
        let backlog_lines = self.backlog_lines;

        let stream = stream! {
            let file = match File::open(&path).await {
                Ok(file) => file,
                Err(e) => {
                    warn!(%handle, path = %path.display(), error = %e, "cannot open descriptor");
                    yield AttachEvent::Failed(AttachError::unavailable(handle, e));
                    return;
                }
            };

            // Length is taken before `Attached` goes out, so anything written
            // after the caller sees `Attached` is delivered.
            let (is_file, len) = match file.metadata().await {
                Ok(meta) => (meta.is_file(), meta.len()),
                Err(e) => {
                    yield AttachEvent::Failed(AttachError::unavailable(handle, e));
                    return;
                }
            };

            debug!(%handle, path = %path.display(), is_file, "attached");
            yield AttachEvent::Attached;

            if is_file {
                let follow =
                    follow_file(file, len, handle, process_dir, poll_interval, backlog_lines);
                for await event in follow {
                    yield event;
                }
            } else {
                for await event in read_until_gone(file, handle, process_dir, poll_interval) {
                    yield event;
                }
            }
        };

        Box::pin(stream)
    }
}

/// Follow a growing regular file until the owning process is gone.
fn follow_file(
    mut file: File,
    len: u64,
    handle: StreamHandle,
    process_dir: PathBuf,
    poll_interval: Duration,
    backlog_lines: usize,
) -> impl Stream<Item = AttachEvent> {
    stream! {
        let mut framer = LineFramer::new();

        // Even with no backlog wanted, an unterminated last line has to be
        // in the framer so its continuation is not printed headless.
        if len > 0 {
            match read_backlog(&mut file, len).await {
                Ok((chunk, start)) => {
                    // Complete lines go out now; an unterminated tail waits
                    // in the framer for the rest of its bytes.
                    let cut = chunk
                        .iter()
                        .rposition(|&b| b == b'\n')
                        .map_or(0, |pos| pos + 1);
                    for line in last_lines(&chunk[..cut], backlog_lines, start == 0) {
                        yield AttachEvent::Line(LabeledLine::new(handle, line));
                    }
                    framer.push(&chunk[cut..]);
                }
                Err(e) => {
                    yield AttachEvent::Failed(AttachError::unavailable(handle, e));
                    return;
                }
            }
        }

        let mut position = match file.seek(SeekFrom::Start(len)).await {
            Ok(pos) => pos,
            Err(e) => {
                yield AttachEvent::Failed(AttachError::unavailable(handle, e));
                return;
            }
        };

        let mut buf = vec![0u8; READ_BUF_BYTES];
        loop {
            match file.read(&mut buf).await {
                Ok(0) => {
                    let current_len = file.metadata().await.map(|m| m.len()).unwrap_or(position);
                    if current_len < position {
                        debug!(%handle, old = position, new = current_len, "file truncated, rewinding");
                        framer.reset();
                        position = match file.seek(SeekFrom::Start(0)).await {
                            Ok(pos) => pos,
                            Err(e) => {
                                yield AttachEvent::Failed(AttachError::unavailable(handle, e));
                                return;
                            }
                        };
                        continue;
                    }

                    if !process_alive(&process_dir).await {
                        if let Some(rest) = framer.finish() {
                            yield AttachEvent::Line(LabeledLine::new(handle, rest));
                        }
                        debug!(%handle, "process gone");
                        yield AttachEvent::Ended;
                        return;
                    }

                    tokio::time::sleep(poll_interval).await;
                }
                Ok(n) => {
                    position += n as u64;
                    for line in framer.push(&buf[..n]) {
                        yield AttachEvent::Line(LabeledLine::new(handle, line));
                    }
                }
                Err(e) => {
                    warn!(%handle, error = %e, "read failed");
                    yield AttachEvent::Failed(AttachError::unavailable(handle, e));
                    return;
                }
            }
        }
    }
}

/// Outcome of one wait in [`read_until_gone`].
enum PipeWait {
    Read(std::io::Result<usize>),
    Tick,
}

/// Read a pipe or terminal until its writers close it or the owning
/// process disappears.
///
/// Other processes may keep the write end (or the terminal) open after the
/// target exits, so EOF alone cannot be relied on. On the process check
/// the pending read is abandoned; it stays parked in the blocking pool
/// until the descriptor sees data or EOF.
fn read_until_gone(
    mut file: File,
    handle: StreamHandle,
    process_dir: PathBuf,
    poll_interval: Duration,
) -> impl Stream<Item = AttachEvent> {
    stream! {
        let mut framer = LineFramer::new();
        let mut buf = vec![0u8; READ_BUF_BYTES];
        let mut tick = tokio::time::interval(poll_interval.max(Duration::from_millis(1)));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            let wait = tokio::select! {
                read = file.read(&mut buf) => PipeWait::Read(read),
                _ = tick.tick() => PipeWait::Tick,
            };

            match wait {
                PipeWait::Tick => {
                    if !process_alive(&process_dir).await {
                        if let Some(rest) = framer.finish() {
                            yield AttachEvent::Line(LabeledLine::new(handle, rest));
                        }
                        debug!(%handle, "process gone, descriptor still open elsewhere");
                        yield AttachEvent::Ended;
                        return;
                    }
                }
                PipeWait::Read(Ok(0)) => {
                    if let Some(rest) = framer.finish() {
                        yield AttachEvent::Line(LabeledLine::new(handle, rest));
                    }
                    yield AttachEvent::Ended;
                    return;
                }
                PipeWait::Read(Ok(n)) => {
                    for line in framer.push(&buf[..n]) {
                        yield AttachEvent::Line(LabeledLine::new(handle, line));
                    }
                }
                PipeWait::Read(Err(e)) => {
                    warn!(%handle, error = %e, "read failed");
                    yield AttachEvent::Failed(AttachError::unavailable(handle, e));
                    return;
                }
            }
        }
    }
}

/// Read the last (up to) [`BACKLOG_SCAN_BYTES`] of a file of length `len`.
/// Returns the bytes and the offset they start at.
async fn read_backlog(file: &mut File, len: u64) -> std::io::Result<(Vec<u8>, u64)> {
    let start = len.saturating_sub(BACKLOG_SCAN_BYTES);
    file.seek(SeekFrom::Start(start)).await?;

    let mut chunk = Vec::with_capacity((len - start) as usize);
    (&mut *file).take(len - start).read_to_end(&mut chunk).await?;
    Ok((chunk, start))
}

async fn process_alive(process_dir: &Path) -> bool {
    tokio::fs::try_exists(process_dir).await.unwrap_or(false)
}
