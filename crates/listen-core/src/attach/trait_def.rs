//! The `Attacher` trait: the interface every tail backend implements.
//!
//! The trait is object-safe so the coordinator can hold an
//! `Arc<dyn Attacher>` picked at runtime by [`super::create_attacher`].

use std::pin::Pin;

use futures::Stream;

use super::types::AttachEvent;
use crate::types::StreamHandle;

/// Boxed event stream returned by [`Attacher::attach`].
pub type AttachStream = Pin<Box<dyn Stream<Item = AttachEvent> + Send>>;

/// Follows one descriptor of one process and yields its lines.
pub trait Attacher: Send + Sync {
    /// Backend name (e.g. "procfd", "tail").
    fn name(&self) -> &str;

    /// Start following `handle`.
    ///
    /// The returned stream is lazy: nothing is opened or spawned until it
    /// is first polled. It runs until the source goes away, or until it is
    /// dropped. Dropping it must release everything it holds, including
    /// child processes.
    fn attach(&self, handle: StreamHandle) -> AttachStream;
}

// Compile-time assertion: Attacher must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Attacher) {}
};
