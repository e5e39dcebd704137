//! Offline sample-rate / bit-depth degradation of audio assets with a
//! single-instance playback session.
//!
//! Data flow:
//! 1. **Decode**: [`decode`] turns raw encoded bytes into a planar [`SampleBuffer`].
//! 2. **Resample**: [`resample`] re-renders the whole buffer at a target rate (Rubato sinc).
//! 3. **Quantize**: [`quantize`] snaps every sample to a `2^bits / 2` grid.
//! 4. **Play**: [`session::PlaybackController`] owns the live output graph and guarantees
//!    that at most one graph is alive and that every graph is released exactly once.

pub mod buffer;
pub mod config;
pub mod decode;
pub mod device;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod playback;
pub mod quantize;
pub mod resample;
pub mod session;
pub mod status;

pub use buffer::SampleBuffer;
pub use config::{EngineConfig, ProcessingConfig};
pub use error::{BufferError, DecodeError, OutputError, ProcessingError, SessionError, TeardownError};
pub use session::PlaybackController;
pub use status::{PlaybackEndReason, PlaybackSource, SessionEvent, SessionState, SessionStatus};

#[cfg(test)]
pub(crate) mod test_support;
