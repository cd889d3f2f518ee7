//! Core library for `listen-in`: find processes by name and tail their
//! stdin/stdout through `/proc/<pid>/fd/<n>`.
//!
//! ```text
//! Locator --locate(name)--> {pid, ...}
//!     |
//!     v
//! attach_all(pids) -- JoinSet --+-- attach([pid: stdin])  --+
//!                               +-- attach([pid: stdout]) --+--> LineSink
//!                               +-- ...                   --+
//! ```

pub mod attach;
pub mod coordinator;
pub mod locate;
pub mod session;
pub mod sink;
pub mod types;

pub use attach::{AttachError, AttachEvent, Attacher};
pub use types::{AttachmentState, Descriptor, LabeledLine, ProcessId, StreamHandle};
