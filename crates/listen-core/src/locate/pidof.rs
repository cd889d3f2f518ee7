//! `pidof`-backed locator.

use std::collections::BTreeSet;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{LocateError, Locator, parse_pid_list};
use crate::types::ProcessId;

/// Runs `pidof <name>` and parses its output.
#[derive(Debug, Clone)]
pub struct PidofLocator {
    /// Path to the `pidof` binary. Defaults to `"pidof"` (found via `$PATH`).
    pidof_binary: String,
}

impl PidofLocator {
    pub fn new() -> Self {
        Self::with_binary("pidof")
    }

    /// Use a custom binary path. Tests point this at a script.
    pub fn with_binary(path: impl Into<String>) -> Self {
        Self {
            pidof_binary: path.into(),
        }
    }
}

impl Default for PidofLocator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Locator for PidofLocator {
    fn name(&self) -> &str {
        "pidof"
    }

    async fn locate(&self, process_name: &str) -> Result<BTreeSet<ProcessId>, LocateError> {
        let output = Command::new(&self.pidof_binary)
            .arg(process_name)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| LocateError::CommandFailed {
                command: self.pidof_binary.clone(),
                reason: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(
            process_name,
            status = ?output.status.code(),
            stdout = %stdout.trim(),
            "pidof finished"
        );

        // pidof exits 1 when nothing matches.
        if !output.status.success() {
            if output.status.code() == Some(1) && stdout.trim().is_empty() {
                return Ok(BTreeSet::new());
            }
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(LocateError::CommandFailed {
                command: self.pidof_binary.clone(),
                reason: if stderr.is_empty() {
                    format!("exited with {}", output.status)
                } else {
                    stderr
                },
            });
        }

        parse_pid_list(&stdout)
    }
}
