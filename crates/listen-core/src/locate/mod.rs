//! Process location: resolve a command name to the set of running pids.
//!
//! An empty set is a normal answer ("nothing to attach to"), not an error.
//! Errors are reserved for the lookup itself breaking.

pub mod pidof;
pub mod procfs;

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Result, bail};
use async_trait::async_trait;

use crate::types::ProcessId;

pub use pidof::PidofLocator;
pub use procfs::ProcfsLocator;

/// Failures of the lookup itself.
#[derive(Debug, thiserror::Error)]
pub enum LocateError {
    #[error("failed to run {command}: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("unexpected token in pid list: {token:?}")]
    MalformedOutput { token: String },

    #[error("cannot read process table at {path}: {reason}")]
    ProcUnavailable { path: PathBuf, reason: String },
}

/// Resolves a process name to the pids currently running under it.
#[async_trait]
pub trait Locator: Send + Sync {
    /// Human-readable name of the lookup strategy (e.g. "pidof", "procfs").
    fn name(&self) -> &str;

    /// Point-in-time snapshot of pids whose command name equals `process_name`.
    async fn locate(&self, process_name: &str) -> Result<BTreeSet<ProcessId>, LocateError>;
}

/// Parse a whitespace-separated pid list such as `pidof` prints.
pub fn parse_pid_list(output: &str) -> Result<BTreeSet<ProcessId>, LocateError> {
    output
        .split_whitespace()
        .map(|token| {
            token
                .parse::<ProcessId>()
                .map_err(|_| LocateError::MalformedOutput {
                    token: token.to_owned(),
                })
        })
        .collect()
}

/// Settings shared by the locator backends.
#[derive(Debug, Clone)]
pub struct LocateOptions {
    pub proc_root: PathBuf,
    pub pidof_binary: String,
}

impl Default for LocateOptions {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            pidof_binary: "pidof".to_string(),
        }
    }
}

/// Factory function: create a locator from a mode string.
pub fn create_locator(mode: &str, options: &LocateOptions) -> Result<Box<dyn Locator>> {
    match mode {
        "pidof" => Ok(Box::new(PidofLocator::with_binary(&options.pidof_binary))),
        "procfs" => Ok(Box::new(ProcfsLocator::with_proc_root(&options.proc_root))),
        other => bail!("unknown locator: {other:?} (expected \"pidof\" or \"procfs\")"),
    }
}
