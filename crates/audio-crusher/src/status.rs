//! Observable session state for presentation layers.

use crate::buffer::SampleBuffer;
use crate::config::ProcessingConfig;
use crate::decode::SourceInfo;

/// Lifecycle of the playback session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing has been played yet.
    Idle,
    /// Graph under construction (includes an offline render in flight).
    Starting,
    /// Audio is flowing.
    Playing,
    /// All resources of the last session are released.
    Terminated,
}

impl SessionState {
    /// Whether a session currently holds (or is about to hold) output resources.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Playing)
    }
}

/// Which buffer a session plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackSource {
    Original,
    Processed(ProcessingConfig),
}

/// Why the most recent session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackEndReason {
    /// The source reached end-of-stream.
    Eof,
    /// Explicit `stop()`.
    Stopped,
    /// A new play request replaced the session.
    Superseded,
    /// Rendering or graph construction failed.
    Failed,
}

/// Summary of the loaded asset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetInfo {
    pub channels: usize,
    pub frames: usize,
    pub sample_rate: u32,
    pub duration_ms: u64,
    pub codec: Option<String>,
    pub bit_depth: Option<u16>,
}

impl AssetInfo {
    pub(crate) fn new(buffer: &SampleBuffer, info: &SourceInfo) -> Self {
        Self {
            channels: buffer.channel_count(),
            frames: buffer.frame_count(),
            sample_rate: buffer.sample_rate(),
            duration_ms: buffer.duration_ms(),
            codec: info.codec.clone(),
            bit_depth: info.bit_depth,
        }
    }
}

/// State-change notification pushed to subscribers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionEvent {
    /// Id of the session the transition belongs to.
    pub session: u64,
    pub state: SessionState,
    /// Set on transitions into [`SessionState::Terminated`].
    pub end_reason: Option<PlaybackEndReason>,
}

/// Snapshot of everything a front end renders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionStatus {
    pub session: u64,
    pub state: SessionState,
    pub config: ProcessingConfig,
    pub asset: Option<AssetInfo>,
    pub source: Option<PlaybackSource>,
    pub end_reason: Option<PlaybackEndReason>,
}

/// Which front-end controls are enabled for a status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Controls {
    pub play_original: bool,
    pub play_processed: bool,
    pub stop: bool,
}

impl SessionStatus {
    /// Play buttons need an asset and no session in flight; stop needs a live session.
    pub fn controls(&self) -> Controls {
        let can_play = self.asset.is_some() && !self.state.is_active();
        Controls {
            play_original: can_play,
            play_processed: can_play,
            stop: self.state.is_active(),
        }
    }
}
