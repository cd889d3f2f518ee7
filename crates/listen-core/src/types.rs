//! Value types shared by the locator, attachers and coordinator.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ---------------------------------------------------------------------------
// ProcessId
// ---------------------------------------------------------------------------

/// OS-assigned process identifier. Only meaningful while the process lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(u32);

impl ProcessId {
    /// Wrap a raw pid. Returns `None` for 0, which never names a user process.
    pub fn new(raw: u32) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProcessId {
    type Err = ProcessIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u32>()
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| ProcessIdParseError(s.to_owned()))
    }
}

/// Error returned when parsing an invalid [`ProcessId`] string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessIdParseError(pub String);

impl fmt::Display for ProcessIdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid process id: {:?}", self.0)
    }
}

impl std::error::Error for ProcessIdParseError {}

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// Which standard stream of a process to attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Descriptor {
    Stdin,
    Stdout,
}

impl Descriptor {
    /// Both descriptors, in fd order.
    pub const ALL: [Descriptor; 2] = [Descriptor::Stdin, Descriptor::Stdout];

    pub fn fd(self) -> u32 {
        match self {
            Self::Stdin => 0,
            Self::Stdout => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Stdin => "stdin",
            Self::Stdout => "stdout",
        }
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// StreamHandle / LabeledLine
// ---------------------------------------------------------------------------

/// One descriptor of one process: the unit of attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamHandle {
    pub pid: ProcessId,
    pub descriptor: Descriptor,
}

impl StreamHandle {
    pub fn new(pid: ProcessId, descriptor: Descriptor) -> Self {
        Self { pid, descriptor }
    }

    /// The live descriptor path, e.g. `/proc/1234/fd/1`.
    pub fn fd_path(&self, proc_root: &Path) -> PathBuf {
        proc_root
            .join(self.pid.to_string())
            .join("fd")
            .join(self.descriptor.fd().to_string())
    }

    /// The process directory, e.g. `/proc/1234`. Gone once the process exits.
    pub fn process_dir(&self, proc_root: &Path) -> PathBuf {
        proc_root.join(self.pid.to_string())
    }
}

impl fmt::Display for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}: {}]", self.pid, self.descriptor)
    }
}

/// A single line read from a stream, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledLine {
    pub handle: StreamHandle,
    pub content: String,
}

impl LabeledLine {
    pub fn new(handle: StreamHandle, content: impl Into<String>) -> Self {
        Self {
            handle,
            content: content.into(),
        }
    }
}

impl fmt::Display for LabeledLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.handle, self.content)
    }
}

// ---------------------------------------------------------------------------
// AttachmentState
// ---------------------------------------------------------------------------

/// Lifecycle of a single attachment.
///
/// ```text
/// starting -> attached
/// starting -> failed    (path missing at start)
/// attached -> ended     (process gone / EOF)
/// attached -> failed    (read error mid-stream)
/// ```
///
/// There is no edge back to `starting`: attachments are never restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentState {
    Starting,
    Attached,
    Ended,
    Failed,
}

impl AttachmentState {
    pub fn is_valid_transition(from: Self, to: Self) -> bool {
        matches!(
            (from, to),
            (Self::Starting, Self::Attached)
                | (Self::Starting, Self::Failed)
                | (Self::Attached, Self::Ended)
                | (Self::Attached, Self::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Failed)
    }
}

impl fmt::Display for AttachmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Attached => "attached",
            Self::Ended => "ended",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for AttachmentState {
    type Err = AttachmentStateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starting" => Ok(Self::Starting),
            "attached" => Ok(Self::Attached),
            "ended" => Ok(Self::Ended),
            "failed" => Ok(Self::Failed),
            other => Err(AttachmentStateParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`AttachmentState`] string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentStateParseError(pub String);

impl fmt::Display for AttachmentStateParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid attachment state: {:?}", self.0)
    }
}

impl std::error::Error for AttachmentStateParseError {}
