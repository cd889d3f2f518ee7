//! Shared test utilities for listen-in integration tests.
//!
//! Provides:
//! - [`FakeProcRoot`]: a temp directory laid out like `/proc`, so attachers
//!   and locators can run against files the test controls.
//! - [`CollectingSink`]: a [`LineSink`] that records everything written.
//! - [`ScriptedAttacher`] / [`StaticLocator`]: in-memory stand-ins for the
//!   real backends.
//! - [`write_script`]: an executable shell script standing in for an
//!   external binary (`pidof`, `tail`).

use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use tempfile::TempDir;

use listen_core::attach::{AttachEvent, AttachStream, Attacher};
use listen_core::locate::{LocateError, Locator};
use listen_core::sink::LineSink;
use listen_core::{ProcessId, StreamHandle};

/// Shorthand for a valid pid in tests.
pub fn pid(raw: u32) -> ProcessId {
    ProcessId::new(raw).expect("test pids are non-zero")
}

/// Shorthand for a pid set.
pub fn pid_set(raw: &[u32]) -> BTreeSet<ProcessId> {
    raw.iter().map(|&p| pid(p)).collect()
}

// ---------------------------------------------------------------------------
// Scripts
// ---------------------------------------------------------------------------

/// Write an executable `/bin/sh` script named `name` into `dir`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("chmod script");
    }
    path
}

// ---------------------------------------------------------------------------
// FakeProcRoot
// ---------------------------------------------------------------------------

/// A temp directory shaped like `/proc`: `<pid>/comm` and `<pid>/fd/<n>`.
///
/// The fd entries are plain files, which the procfd attacher follows the
/// same way it follows a redirected stdout.
pub struct FakeProcRoot {
    dir: TempDir,
}

impl FakeProcRoot {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create fake proc root"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Create `<pid>/comm` containing `comm`.
    pub fn add_process(&self, pid: u32, comm: &str) {
        let dir = self.path().join(pid.to_string());
        std::fs::create_dir_all(dir.join("fd")).expect("create pid dir");
        std::fs::write(dir.join("comm"), format!("{comm}\n")).expect("write comm");
    }

    /// Create `<pid>/fd/<fd>` with initial `contents`.
    pub fn add_fd(&self, pid: u32, fd: u32, contents: &[u8]) -> PathBuf {
        let dir = self.path().join(pid.to_string()).join("fd");
        std::fs::create_dir_all(&dir).expect("create fd dir");
        let path = dir.join(fd.to_string());
        std::fs::write(&path, contents).expect("write fd file");
        path
    }

    /// Create `<pid>/fd/<fd>` as a named pipe, standing in for a process
    /// whose stdin or stdout is a pipe.
    pub fn add_fifo(&self, pid: u32, fd: u32) -> PathBuf {
        let dir = self.path().join(pid.to_string()).join("fd");
        std::fs::create_dir_all(&dir).expect("create fd dir");
        let path = dir.join(fd.to_string());
        let status = std::process::Command::new("mkfifo")
            .arg(&path)
            .status()
            .expect("run mkfifo");
        assert!(status.success(), "mkfifo {} failed: {status}", path.display());
        path
    }

    /// Append bytes to `<pid>/fd/<fd>`, like the process writing output.
    pub fn append(&self, pid: u32, fd: u32, bytes: &[u8]) {
        let path = self
            .path()
            .join(pid.to_string())
            .join("fd")
            .join(fd.to_string());
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap_or_else(|e| panic!("open {} for append: {e}", path.display()));
        file.write_all(bytes).expect("append");
    }

    /// Remove `<pid>` entirely, which is what a process exit looks like.
    pub fn remove_process(&self, pid: u32) {
        std::fs::remove_dir_all(self.path().join(pid.to_string())).expect("remove pid dir");
    }
}

impl Default for FakeProcRoot {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// CollectingSink
// ---------------------------------------------------------------------------

/// Records every line and notice in memory.
#[derive(Default)]
pub struct CollectingSink {
    lines: Mutex<Vec<String>>,
    notices: Mutex<Vec<String>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("lines lock").clone()
    }

    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().expect("notices lock").clone()
    }

    /// Lines that start with `tag` (e.g. `"[111: stdout]"`), tag stripped.
    pub fn lines_tagged(&self, tag: &str) -> Vec<String> {
        let prefix = format!("{tag} ");
        self.lines()
            .into_iter()
            .filter_map(|l| l.strip_prefix(&prefix).map(str::to_owned))
            .collect()
    }

    /// Poll until `pred` holds for the recorded lines, or panic after `timeout`.
    pub async fn wait_until<F>(&self, timeout: Duration, what: &str, pred: F)
    where
        F: Fn(&[String]) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if pred(&self.lines()) {
                return;
            }
            if Instant::now() >= deadline {
                panic!(
                    "timed out waiting for {what}; lines: {:?}, notices: {:?}",
                    self.lines(),
                    self.notices()
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl LineSink for CollectingSink {
    fn write_line(&self, text: &str) -> std::io::Result<()> {
        self.lines.lock().expect("lines lock").push(text.to_owned());
        Ok(())
    }

    fn write_notice(&self, text: &str) -> std::io::Result<()> {
        self.notices.lock().expect("notices lock").push(text.to_owned());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ScriptedAttacher
// ---------------------------------------------------------------------------

/// An [`Attacher`] that replays canned events and records every attach.
///
/// Handles without a script yield `Attached` and nothing else. When
/// `hold_open` is set, every stream stays pending after its script runs
/// out instead of ending, the way a real idle descriptor behaves.
#[derive(Default)]
pub struct ScriptedAttacher {
    scripts: HashMap<StreamHandle, Vec<AttachEvent>>,
    hold_open: bool,
    attached: Mutex<Vec<StreamHandle>>,
}

impl ScriptedAttacher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    pub fn script(mut self, handle: StreamHandle, events: Vec<AttachEvent>) -> Self {
        self.scripts.insert(handle, events);
        self
    }

    /// Every handle `attach` was called with, in call order.
    pub fn attached(&self) -> Vec<StreamHandle> {
        self.attached.lock().expect("attached lock").clone()
    }
}

impl Attacher for ScriptedAttacher {
    fn name(&self) -> &str {
        "scripted"
    }

    fn attach(&self, handle: StreamHandle) -> AttachStream {
        self.attached.lock().expect("attached lock").push(handle);

        let events = self
            .scripts
            .get(&handle)
            .cloned()
            .unwrap_or_else(|| vec![AttachEvent::Attached]);
        let scripted = futures::stream::iter(events);

        if self.hold_open {
            Box::pin(scripted.chain(futures::stream::pending()))
        } else {
            Box::pin(scripted)
        }
    }
}

// ---------------------------------------------------------------------------
// StaticLocator
// ---------------------------------------------------------------------------

/// A [`Locator`] that always answers with the same pid set.
pub struct StaticLocator {
    pids: BTreeSet<ProcessId>,
    queries: Mutex<Vec<String>>,
}

impl StaticLocator {
    pub fn new(pids: BTreeSet<ProcessId>) -> Self {
        Self {
            pids,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Every name `locate` was called with.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().expect("queries lock").clone()
    }
}

#[async_trait]
impl Locator for StaticLocator {
    fn name(&self) -> &str {
        "static"
    }

    async fn locate(&self, process_name: &str) -> Result<BTreeSet<ProcessId>, LocateError> {
        self.queries
            .lock()
            .expect("queries lock")
            .push(process_name.to_owned());
        Ok(self.pids.clone())
    }
}
