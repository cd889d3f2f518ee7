//! Attachment coordinator: fan out one attachment per (pid, descriptor),
//! fan their lines into the shared sink, and wait for all of them.
//!
//! Every attachment runs in one [`JoinSet`], so none outlives
//! [`attach_all`]. A [`CancellationToken`] stops them together; each task
//! drops its stream on the way out, which tears down its reader.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::attach::{AttachError, AttachEvent, Attacher};
use crate::sink::LineSink;
use crate::types::{AttachmentState, Descriptor, ProcessId, StreamHandle};

/// Final account of one attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentReport {
    pub handle: StreamHandle,
    /// State when the attachment stopped. `Starting`/`Attached` only
    /// appear when the run was interrupted.
    pub state: AttachmentState,
    /// Number of lines written to the sink.
    pub lines: u64,
    pub error: Option<AttachError>,
}

/// Result of running every attachment to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorResult {
    /// Every attachment ended on its own (processes gone or failed).
    Completed { reports: Vec<AttachmentReport> },
    /// The cancellation token fired; attachments were torn down.
    Interrupted { reports: Vec<AttachmentReport> },
}

impl CoordinatorResult {
    /// Per-attachment reports, sorted by handle.
    pub fn reports(&self) -> &[AttachmentReport] {
        match self {
            Self::Completed { reports } | Self::Interrupted { reports } => reports,
        }
    }
}

/// Tracks one attachment's state machine and counters.
struct Tracker {
    handle: StreamHandle,
    state: AttachmentState,
    lines: u64,
    error: Option<AttachError>,
}

impl Tracker {
    fn new(handle: StreamHandle) -> Self {
        Self {
            handle,
            state: AttachmentState::Starting,
            lines: 0,
            error: None,
        }
    }

    fn advance(&mut self, to: AttachmentState) {
        // Backends may skip the explicit `Attached` event.
        if self.state == AttachmentState::Starting && to == AttachmentState::Ended {
            self.state = AttachmentState::Attached;
        }

        if self.state == to {
            return;
        }
        if AttachmentState::is_valid_transition(self.state, to) {
            debug!(handle = %self.handle, from = %self.state, to = %to, "attachment state");
            self.state = to;
        } else {
            warn!(
                handle = %self.handle,
                from = %self.state,
                to = %to,
                "ignoring invalid attachment transition"
            );
        }
    }

    fn fail(&mut self, error: AttachError) {
        self.advance(AttachmentState::Failed);
        self.error = Some(error);
    }

    fn into_report(self) -> AttachmentReport {
        AttachmentReport {
            handle: self.handle,
            state: self.state,
            lines: self.lines,
            error: self.error,
        }
    }
}

/// Attach to stdin and stdout of every pid in `pids` and forward their
/// lines to `sink` until all attachments end or `cancel` fires.
pub async fn attach_all(
    pids: &BTreeSet<ProcessId>,
    attacher: Arc<dyn Attacher>,
    sink: Arc<dyn LineSink>,
    cancel: CancellationToken,
) -> CoordinatorResult {
    let mut set = JoinSet::new();
    let mut handles_by_task = HashMap::new();

    for &pid in pids {
        for descriptor in Descriptor::ALL {
            let handle = StreamHandle::new(pid, descriptor);
            let abort = set.spawn(run_attachment(
                handle,
                Arc::clone(&attacher),
                Arc::clone(&sink),
                cancel.clone(),
            ));
            handles_by_task.insert(abort.id(), handle);
        }
    }

    info!(
        attachments = handles_by_task.len(),
        backend = attacher.name(),
        "attachments started"
    );

    let mut reports = Vec::with_capacity(handles_by_task.len());
    while let Some(joined) = set.join_next_with_id().await {
        match joined {
            Ok((_, report)) => reports.push(report),
            Err(e) => {
                let Some(&handle) = handles_by_task.get(&e.id()) else {
                    error!(error = %e, "unknown attachment task failed");
                    continue;
                };
                error!(%handle, error = %e, "attachment task panicked");
                let _ = sink.write_notice(&format!("{handle} attachment crashed: {e}"));
                reports.push(AttachmentReport {
                    handle,
                    state: AttachmentState::Failed,
                    lines: 0,
                    error: Some(AttachError::unavailable(handle, format!("task failed: {e}"))),
                });
            }
        }
    }
    reports.sort_by_key(|r| r.handle);

    if cancel.is_cancelled() {
        CoordinatorResult::Interrupted { reports }
    } else {
        CoordinatorResult::Completed { reports }
    }
}

/// Drive one attachment stream into the sink.
async fn run_attachment(
    handle: StreamHandle,
    attacher: Arc<dyn Attacher>,
    sink: Arc<dyn LineSink>,
    cancel: CancellationToken,
) -> AttachmentReport {
    let mut tracker = Tracker::new(handle);
    let mut events = attacher.attach(handle);

    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(%handle, "attachment cancelled");
                break;
            }
            event = events.next() => event,
        };

        match event {
            Some(AttachEvent::Attached) => tracker.advance(AttachmentState::Attached),
            Some(AttachEvent::Line(line)) => {
                tracker.advance(AttachmentState::Attached);
                if let Err(e) = sink.emit(&line) {
                    warn!(%handle, error = %e, "sink write failed");
                    tracker.fail(AttachError::SinkClosed {
                        handle,
                        reason: e.to_string(),
                    });
                    break;
                }
                tracker.lines += 1;
            }
            Some(AttachEvent::Failed(err)) => {
                let _ = sink.write_notice(&err.to_string());
                tracker.fail(err);
                break;
            }
            Some(AttachEvent::Ended) | None => {
                tracker.advance(AttachmentState::Ended);
                let _ = sink.write_notice(&format!("{handle} stream ended"));
                break;
            }
        }
    }

    // Dropping the stream releases the reader (and kills a `tail` child).
    drop(events);
    tracker.into_report()
}
