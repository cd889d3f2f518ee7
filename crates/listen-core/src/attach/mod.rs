//! Stream attachers: follow one descriptor of one process and yield its
//! lines as an [`AttachEvent`] stream.
//!
//! # Architecture
//!
//! ```text
//! create_attacher("procfd" | "tail") --> Arc<dyn Attacher>
//!     |
//!     |   attach([pid: stdout]) --> Stream<AttachEvent>
//!     |        Attached, Line.., Ended | Failed
//! ```

pub mod lines;
pub mod procfd;
pub mod tail;
pub mod trait_def;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};

pub use procfd::ProcFdAttacher;
pub use tail::TailAttacher;
pub use trait_def::{AttachStream, Attacher};
pub use types::{AttachError, AttachEvent};

/// Settings shared by the attach backends.
#[derive(Debug, Clone)]
pub struct AttachOptions {
    pub proc_root: PathBuf,
    pub poll_interval: Duration,
    pub backlog_lines: usize,
    pub tail_binary: String,
}

impl Default for AttachOptions {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            poll_interval: ProcFdAttacher::DEFAULT_POLL_INTERVAL,
            backlog_lines: ProcFdAttacher::DEFAULT_BACKLOG_LINES,
            tail_binary: "tail".to_string(),
        }
    }
}

/// Factory function: create an attach backend from a mode string.
pub fn create_attacher(mode: &str, options: &AttachOptions) -> Result<Arc<dyn Attacher>> {
    match mode {
        "procfd" => Ok(Arc::new(
            ProcFdAttacher::with_proc_root(&options.proc_root)
                .poll_interval(options.poll_interval)
                .backlog_lines(options.backlog_lines),
        )),
        "tail" => Ok(Arc::new(
            TailAttacher::new()
                .with_binary(&options.tail_binary)
                .with_proc_root(&options.proc_root)
                .backlog_lines(options.backlog_lines),
        )),
        other => {
            bail!("unknown attach backend: {other:?} (expected \"procfd\" or \"tail\")")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_builds_known_backends() {
        let options = AttachOptions::default();
        assert_eq!(create_attacher("procfd", &options).unwrap().name(), "procfd");
        assert_eq!(create_attacher("tail", &options).unwrap().name(), "tail");
    }

    #[test]
    fn factory_rejects_unknown_backend() {
        let err = create_attacher("inotify", &AttachOptions::default())
            .err()
            .expect("should fail");
        assert!(err.to_string().contains("unknown attach backend"), "got: {err}");
    }
}
