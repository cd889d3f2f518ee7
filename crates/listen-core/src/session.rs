//! One full run: locate, announce, attach.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::attach::Attacher;
use crate::coordinator::{CoordinatorResult, attach_all};
use crate::locate::{LocateError, Locator};
use crate::sink::LineSink;

/// Printed when the locator finds nothing.
pub const NOT_RUNNING_NOTICE: &str = "Engine not running";

/// How a session finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// No process matched; nothing was attached.
    NotRunning,
    /// Attachments ran until they ended or were interrupted.
    Finished(CoordinatorResult),
}

/// Locate `process_name`, print the discovered pid list, and attach to
/// every pid found.
///
/// The discovery line is the pids separated by spaces (an empty line when
/// none). With no pids, [`NOT_RUNNING_NOTICE`] follows and no attachment
/// is started. Sink write errors on these two lines are ignored; the
/// attachments report their own.
pub async fn run_session(
    process_name: &str,
    locator: &dyn Locator,
    attacher: Arc<dyn Attacher>,
    sink: Arc<dyn LineSink>,
    cancel: CancellationToken,
) -> Result<SessionOutcome, LocateError> {
    let pids = locator.locate(process_name).await?;

    let discovery = pids
        .iter()
        .map(|pid| pid.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    let _ = sink.write_line(&discovery);
    info!(process_name, locator = locator.name(), pids = %discovery, "located processes");

    if pids.is_empty() {
        let _ = sink.write_line(NOT_RUNNING_NOTICE);
        return Ok(SessionOutcome::NotRunning);
    }

    let result = attach_all(&pids, attacher, sink, cancel).await;
    Ok(SessionOutcome::Finished(result))
}
