//! Error types for the decode / render / playback stages.
//!
//! Decode and processing failures propagate to the caller. Teardown failures
//! are produced by output handles but are only ever logged by the session.

use thiserror::Error;

/// Violations of the [`SampleBuffer`](crate::SampleBuffer) invariants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("buffer needs at least one channel")]
    NoChannels,

    #[error("sample rate must be positive")]
    ZeroSampleRate,

    #[error("channel {channel} has {len} frames, expected {expected}")]
    ChannelLengthMismatch {
        channel: usize,
        len: usize,
        expected: usize,
    },

    #[error("{samples} interleaved samples do not divide into {channels} channels")]
    RaggedInterleaved { samples: usize, channels: usize },
}

/// Input bytes could not be turned into a sample buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("input is empty")]
    Empty,

    #[error("unrecognized audio container: {0}")]
    Unrecognized(String),

    #[error("no decodable audio track")]
    NoAudioTrack,

    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("malformed audio stream: {0}")]
    Malformed(String),

    #[error("stream contains no audio frames")]
    NoFrames,

    #[error("stream truncated: decoded {decoded} of {expected} frames")]
    Truncated { decoded: u64, expected: u64 },

    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Invalid parameters or input reached the offline render pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessingError {
    #[error("target sample rate must be positive, got {0}")]
    InvalidSampleRate(u32),

    #[error("bit depth must be within 1..=32, got {0}")]
    InvalidBitDepth(u32),

    #[error("source buffer has no frames")]
    EmptyBuffer,

    #[error("resampler error: {0}")]
    Resampler(String),

    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Failure to build or start a live output graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OutputError {
    #[error("output device error: {0}")]
    Device(String),

    #[error("output stream error: {0}")]
    Stream(String),

    #[error("no source connected to the output context")]
    NoSource,

    #[error("output engine is closed")]
    EngineClosed,

    #[error("buffer preparation failed: {0}")]
    Prepare(#[from] ProcessingError),
}

/// Best-effort teardown failure. Expected when a node already finished.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TeardownError {
    #[error("source already finished")]
    AlreadyFinished,

    #[error("source is not connected")]
    NotConnected,

    #[error("output engine is closed")]
    EngineClosed,

    #[error("backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by [`PlaybackController`](crate::PlaybackController) operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("no audio asset loaded")]
    NoAsset,

    #[error("another session is still starting")]
    Busy,

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Processing(#[from] ProcessingError),

    #[error(transparent)]
    Output(#[from] OutputError),
}
