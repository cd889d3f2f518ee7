//! Locator that scans `/proc/*/comm` directly, no helper process.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, trace};

use super::{LocateError, Locator};
use crate::types::ProcessId;

/// The kernel truncates `comm` to this many bytes.
const COMM_MAX_BYTES: usize = 15;

#[derive(Debug, Clone)]
pub struct ProcfsLocator {
    proc_root: PathBuf,
}

impl ProcfsLocator {
    pub fn new() -> Self {
        Self::with_proc_root("/proc")
    }

    pub fn with_proc_root(root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: root.into(),
        }
    }
}

impl Default for ProcfsLocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Compare a `comm` value against a wanted name, allowing for the
/// kernel's truncation of long names.
fn comm_matches(comm: &str, wanted: &str) -> bool {
    if wanted.len() > COMM_MAX_BYTES {
        let mut cut = COMM_MAX_BYTES;
        while !wanted.is_char_boundary(cut) {
            cut -= 1;
        }
        comm == &wanted[..cut]
    } else {
        comm == wanted
    }
}

async fn read_comm(dir: &Path) -> Option<String> {
    let raw = tokio::fs::read_to_string(dir.join("comm")).await.ok()?;
    Some(raw.trim_end_matches('\n').to_string())
}

#[async_trait]
impl Locator for ProcfsLocator {
    fn name(&self) -> &str {
        "procfs"
    }

    async fn locate(&self, process_name: &str) -> Result<BTreeSet<ProcessId>, LocateError> {
        let mut entries = tokio::fs::read_dir(&self.proc_root).await.map_err(|e| {
            LocateError::ProcUnavailable {
                path: self.proc_root.clone(),
                reason: e.to_string(),
            }
        })?;

        let mut found = BTreeSet::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    return Err(LocateError::ProcUnavailable {
                        path: self.proc_root.clone(),
                        reason: e.to_string(),
                    });
                }
            };

            let Some(pid) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<ProcessId>().ok())
            else {
                continue;
            };

            // A process can exit between read_dir and here; skip it.
            let Some(comm) = read_comm(&entry.path()).await else {
                trace!(%pid, "comm unreadable, skipping");
                continue;
            };

            if comm_matches(&comm, process_name) {
                found.insert(pid);
            }
        }

        debug!(process_name, count = found.len(), "procfs scan finished");
        Ok(found)
    }
}
