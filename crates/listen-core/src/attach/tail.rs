//! `tail -f` backend.
//!
//! Spawns `tail -n <backlog> -f --pid=<pid> /proc/<pid>/fd/<n>` and turns
//! its stdout into lines. `--pid` makes `tail` exit once the target
//! process dies, which ends the stream.

use std::path::PathBuf;
use std::process::Stdio;

use async_stream::stream;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::lines::LineFramer;
use super::trait_def::{AttachStream, Attacher};
use super::types::{AttachError, AttachEvent};
use crate::types::{LabeledLine, StreamHandle};

/// How much of `tail`'s stderr is kept for a failure report.
const STDERR_KEEP_BYTES: usize = 8 * 1024;

/// Attach backend that delegates following to the `tail` utility.
#[derive(Debug, Clone)]
pub struct TailAttacher {
    /// Path to the `tail` binary. Defaults to `"tail"` (found via `$PATH`).
    tail_binary: String,
    proc_root: PathBuf,
    backlog_lines: usize,
}

impl TailAttacher {
    pub fn new() -> Self {
        Self {
            tail_binary: "tail".to_string(),
            proc_root: PathBuf::from("/proc"),
            backlog_lines: 10,
        }
    }

    /// Use a custom `tail` binary (tests use a script).
    pub fn with_binary(mut self, path: impl Into<String>) -> Self {
        self.tail_binary = path.into();
        self
    }

    pub fn with_proc_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.proc_root = root.into();
        self
    }

    pub fn backlog_lines(mut self, lines: usize) -> Self {
        self.backlog_lines = lines;
        self
    }

    fn command(&self, handle: StreamHandle, path: &std::path::Path) -> Command {
        let mut cmd = Command::new(&self.tail_binary);
        cmd.arg("-n")
            .arg(self.backlog_lines.to_string())
            .arg("-f")
            .arg(format!("--pid={}", handle.pid))
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the stream (cancellation) must not leave `tail` behind.
            .kill_on_drop(true);
        cmd
    }
}

impl Default for TailAttacher {
    fn default() -> Self {
        Self::new()
    }
}

impl Attacher for TailAttacher {
    fn name(&self) -> &str {
        "tail"
    }

    fn attach(&self, handle: StreamHandle) -> AttachStream {
        let path = handle.fd_path(&self.proc_root);
        let mut cmd = self.command(handle, &path);
        let binary = self.tail_binary.clone();

        let stream = stream! {
            // `tail` would print its own complaint and exit; checking first
            // gives a cleaner error.
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                warn!(%handle, path = %path.display(), "descriptor path missing");
                yield AttachEvent::Failed(AttachError::unavailable(
                    handle,
                    format!("{} does not exist", path.display()),
                ));
                return;
            }

            let mut child = match cmd.spawn() {
                Ok(child) => child,
                Err(e) => {
                    warn!(%handle, binary = %binary, error = %e, "failed to spawn tail");
                    yield AttachEvent::Failed(AttachError::CommandFailed {
                        handle,
                        command: binary.clone(),
                        reason: e.to_string(),
                    });
                    return;
                }
            };

            let (Some(mut stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take()) else {
                yield AttachEvent::Failed(AttachError::CommandFailed {
                    handle,
                    command: binary.clone(),
                    reason: "child pipes not available".to_string(),
                });
                return;
            };

            // stderr is drained concurrently with stdout; `tail` must never
            // block on a full stderr pipe. Only the tail end is kept.
            let stderr_task = tokio::spawn(async move {
                let mut kept = Vec::new();
                let mut chunk = vec![0u8; 4096];
                while let Ok(n) = stderr.read(&mut chunk).await {
                    if n == 0 {
                        break;
                    }
                    kept.extend_from_slice(&chunk[..n]);
                    if kept.len() > STDERR_KEEP_BYTES {
                        kept.drain(..kept.len() - STDERR_KEEP_BYTES);
                    }
                }
                kept
            });

            debug!(%handle, pid = child.id(), "tail spawned");
            yield AttachEvent::Attached;

            let mut framer = LineFramer::new();
            let mut buf = vec![0u8; 16 * 1024];
            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        for line in framer.push(&buf[..n]) {
                            yield AttachEvent::Line(LabeledLine::new(handle, line));
                        }
                    }
                    Err(e) => {
                        warn!(%handle, error = %e, "error reading tail output");
                        yield AttachEvent::Failed(AttachError::unavailable(handle, e));
                        return;
                    }
                }
            }

            if let Some(rest) = framer.finish() {
                yield AttachEvent::Line(LabeledLine::new(handle, rest));
            }

            let err_buf = stderr_task.await.unwrap_or_default();

            match child.wait().await {
                Ok(status) if status.success() => {
                    debug!(%handle, "tail exited");
                    yield AttachEvent::Ended;
                }
                Ok(status) => {
                    let stderr_text = String::from_utf8_lossy(&err_buf).trim().to_string();
                    let reason = if stderr_text.is_empty() {
                        format!("{binary} exited with {status}")
                    } else {
                        stderr_text
                    };
                    yield AttachEvent::Failed(AttachError::unavailable(handle, reason));
                }
                Err(e) => {
                    yield AttachEvent::Failed(AttachError::CommandFailed {
                        handle,
                        command: binary.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        };

        Box::pin(stream)
    }
}
