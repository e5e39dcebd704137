//! Output capability seam.
//!
//! A live graph is two owned handles: an [`OutputContext`] (engine/device) and a
//! [`SourceNode`] (one buffer connected to that engine). The session owns both
//! and releases them in the order stop -> disconnect -> close.

use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::buffer::SampleBuffer;
use crate::error::{OutputError, TeardownError};

/// Factory for output contexts (e.g. [`CpalBackend`](crate::playback::CpalBackend)).
pub trait OutputBackend: Send + Sync {
    /// Open an engine that should run as close to `preferred_rate` as the device allows.
    fn open_context(&self, preferred_rate: u32) -> Result<Box<dyn OutputContext>, OutputError>;
}

/// An open output engine. Holds at most one source at a time.
pub trait OutputContext: Send {
    /// Connect `buffer` to the output. `on_end` must be notified once when the
    /// source plays past its last frame.
    fn create_source(
        &mut self,
        buffer: Arc<SampleBuffer>,
        on_end: EndSignal,
    ) -> Result<Box<dyn SourceNode>, OutputError>;

    /// Release the engine and its device.
    fn close(self: Box<Self>) -> Result<(), TeardownError>;
}

/// One buffer connected to an output context.
pub trait SourceNode: Send {
    fn start(&mut self) -> Result<(), OutputError>;

    /// Halt output. Fails when the node already finished or lost its engine;
    /// callers treat that as expected.
    fn stop(&mut self) -> Result<(), TeardownError>;

    /// Detach the node from its engine.
    fn disconnect(self: Box<Self>);
}

/// End-of-stream notification tagged with the session it belongs to.
#[derive(Clone, Debug)]
pub struct EndSignal {
    session: u64,
    tx: Sender<u64>,
}

impl EndSignal {
    pub(crate) fn new(session: u64, tx: Sender<u64>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    /// Deliver the notification. Safe to call from an audio callback.
    pub fn notify(&self) {
        // A closed channel means the controller is gone; nobody is left to tell.
        if self.tx.try_send(self.session).is_err() {
            tracing::trace!(session = self.session, "end-of-stream dropped");
        }
    }
}
