//! Events and errors produced by an attachment stream.

use crate::types::{LabeledLine, StreamHandle};

/// An item yielded by [`super::Attacher::attach`].
///
/// A well-formed stream yields `Attached` once, then any number of `Line`
/// events, then exactly one of `Ended` or `Failed`. A stream that could not
/// open its source yields `Failed` without `Attached`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachEvent {
    /// The source was opened and reading has begun.
    Attached,
    /// One complete line read from the source.
    Line(LabeledLine),
    /// The source is gone (process exited or writer closed).
    Ended,
    /// The attachment could not continue.
    Failed(AttachError),
}

/// Per-attachment failures. None of these abort sibling attachments.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttachError {
    #[error("{handle} stream unavailable: {reason}")]
    StreamUnavailable { handle: StreamHandle, reason: String },

    #[error("{handle} failed to run {command}: {reason}")]
    CommandFailed {
        handle: StreamHandle,
        command: String,
        reason: String,
    },

    #[error("{handle} output sink closed: {reason}")]
    SinkClosed { handle: StreamHandle, reason: String },
}

impl AttachError {
    pub(crate) fn unavailable(handle: StreamHandle, reason: impl ToString) -> Self {
        Self::StreamUnavailable {
            handle,
            reason: reason.to_string(),
        }
    }
}
