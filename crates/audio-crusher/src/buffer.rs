//! Canonical in-memory audio representation.
//!
//! [`SampleBuffer`] stores audio **planar**: one `Vec<f32>` per channel, all of the
//! same length. Stages never mutate a buffer they receive; they allocate a new one.

use crate::error::BufferError;

/// Decoded or processed audio plus its sample rate.
///
/// Invariants (checked by every constructor):
/// - at least one channel
/// - `sample_rate > 0`
/// - every channel holds exactly `frame_count` samples
#[derive(Clone, Debug, PartialEq)]
pub struct SampleBuffer {
    sample_rate: u32,
    frames: usize,
    channels: Vec<Vec<f32>>,
}

impl SampleBuffer {
    /// Build a buffer from planar channel data.
    pub fn from_channels(sample_rate: u32, channels: Vec<Vec<f32>>) -> Result<Self, BufferError> {
        if channels.is_empty() {
            return Err(BufferError::NoChannels);
        }
        if sample_rate == 0 {
            return Err(BufferError::ZeroSampleRate);
        }
        let expected = channels[0].len();
        if let Some((channel, data)) = channels
            .iter()
            .enumerate()
            .find(|(_, data)| data.len() != expected)
        {
            return Err(BufferError::ChannelLengthMismatch {
                channel,
                len: data.len(),
                expected,
            });
        }
        Ok(Self {
            sample_rate,
            frames: expected,
            channels,
        })
    }

    /// Build a buffer from interleaved samples
    /// (`frame0[ch0], frame0[ch1], ..., frame1[ch0], ...`).
    pub fn from_interleaved(
        samples: &[f32],
        channel_count: usize,
        sample_rate: u32,
    ) -> Result<Self, BufferError> {
        if channel_count == 0 {
            return Err(BufferError::NoChannels);
        }
        if samples.len() % channel_count != 0 {
            return Err(BufferError::RaggedInterleaved {
                samples: samples.len(),
                channels: channel_count,
            });
        }
        let frames = samples.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (ch, sample) in frame.iter().enumerate() {
                channels[ch].push(*sample);
            }
        }
        Self::from_channels(sample_rate, channels)
    }

    /// A buffer of `frame_count` zero samples per channel.
    pub fn silent(
        channel_count: usize,
        frame_count: usize,
        sample_rate: u32,
    ) -> Result<Self, BufferError> {
        Self::from_channels(sample_rate, vec![vec![0.0; frame_count]; channel_count])
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Frames per channel.
    pub fn frame_count(&self) -> usize {
        self.frames
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples of channel `index`, or `None` when out of range.
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Iterate over the channels in order.
    pub fn channels(&self) -> impl Iterator<Item = &[f32]> {
        self.channels.iter().map(Vec::as_slice)
    }

    /// Duration in seconds (`frame_count / sample_rate`).
    pub fn duration_secs(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }

    /// Duration in whole milliseconds, rounded down.
    pub fn duration_ms(&self) -> u64 {
        (self.frames as u64).saturating_mul(1000) / self.sample_rate as u64
    }

    /// Copy the buffer into a single interleaved vector.
    pub fn to_interleaved(&self) -> Vec<f32> {
        let channels = self.channel_count();
        let mut out = vec![0.0f32; self.frames * channels];
        for (ch, data) in self.channels.iter().enumerate() {
            for (frame, sample) in data.iter().enumerate() {
                out[frame * channels + ch] = *sample;
            }
        }
        out
    }

    /// Apply `f` to every sample, producing a new buffer with the same shape and rate.
    pub fn map_samples<F>(&self, mut f: F) -> Self
    where
        F: FnMut(f32) -> f32,
    {
        Self {
            sample_rate: self.sample_rate,
            frames: self.frames,
            channels: self
                .channels
                .iter()
                .map(|data| data.iter().map(|s| f(*s)).collect())
                .collect(),
        }
    }
}
