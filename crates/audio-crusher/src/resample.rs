//! Offline resample stage.
//!
//! Uses Rubato to re-render a complete [`SampleBuffer`] at a new rate. The whole
//! input is available up front, so the stage runs chunk by chunk over one
//! interleaved copy of the input and only returns once every output frame exists.

use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

use crate::buffer::SampleBuffer;
use crate::error::ProcessingError;

/// Configuration for the offline resampler stage.
#[derive(Clone, Copy, Debug)]
pub struct ResampleConfig {
    /// Input chunk size in frames fed to the resampler per call.
    ///
    /// Only affects speed; the rendered output does not depend on it beyond
    /// floating-point noise.
    pub chunk_frames: usize,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self { chunk_frames: 1024 }
    }
}

/// Number of output frames for a duration-preserving conversion, rounded to nearest.
///
/// Never returns zero for a non-empty input.
pub fn output_frame_count(frames: usize, from_rate: u32, to_rate: u32) -> usize {
    if frames == 0 || from_rate == 0 {
        return 0;
    }
    let from = from_rate as u128;
    let scaled = (frames as u128 * to_rate as u128 + from / 2) / from;
    usize::try_from(scaled).unwrap_or(usize::MAX).max(1)
}

/// Sinc parameters shared by every render: 128 taps, cubic interpolation.
fn sinc_params() -> SincInterpolationParameters {
    let sinc_len = 128;
    let window = WindowFunction::BlackmanHarris2;
    SincInterpolationParameters {
        sinc_len,
        f_cutoff: calculate_cutoff(sinc_len, window),
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window,
    }
}

/// Re-render `buffer` at `target_rate`.
///
/// Channel count and duration are preserved; output length is
/// [`output_frame_count`]. Samples are not renormalized.
///
/// ## Errors
/// [`ProcessingError::InvalidSampleRate`] for a zero target, [`ProcessingError::EmptyBuffer`]
/// for a buffer without frames. No partial buffer is ever returned.
pub fn resample(
    buffer: &SampleBuffer,
    target_rate: u32,
    cfg: ResampleConfig,
) -> Result<SampleBuffer, ProcessingError> {
    if target_rate == 0 {
        return Err(ProcessingError::InvalidSampleRate(target_rate));
    }
    if buffer.frame_count() == 0 {
        return Err(ProcessingError::EmptyBuffer);
    }

    let src_rate = buffer.sample_rate();
    if src_rate == target_rate {
        tracing::debug!(rate_hz = target_rate, "resample skipped");
        return Ok(buffer.clone());
    }

    let channels = buffer.channel_count();
    let in_frames = buffer.frame_count();
    let out_frames = output_frame_count(in_frames, src_rate, target_rate);
    let f_ratio = target_rate as f64 / src_rate as f64;
    let chunk = cfg.chunk_frames.max(1);

    let mut resampler = Async::<f32>::new_sinc(
        f_ratio,
        1.1,
        &sinc_params(),
        chunk,
        channels,
        FixedAsync::Input,
    )
    .map_err(|e| ProcessingError::Resampler(e.to_string()))?;

    // The sinc filter delays its output; render enough extra input (zeros) to
    // flush the delayed tail, then drop the leading `delay` frames.
    let delay = resampler.output_delay();
    let needed = delay + out_frames;
    let delay_in_frames = (delay as f64 / f_ratio).ceil() as usize;
    let chunks = (in_frames + delay_in_frames).div_ceil(chunk) + 1;
    let padded_frames = chunks * chunk;

    let mut input = buffer.to_interleaved();
    input.resize(padded_frames * channels, 0.0);

    let out_capacity = needed + resampler.output_frames_max();
    let mut rendered = vec![0.0f32; out_capacity * channels];

    let produced = {
        let input_adapter = InterleavedSlice::new(&input, channels, padded_frames)
            .map_err(|e| ProcessingError::Resampler(format!("input adapter: {e}")))?;
        let mut output_adapter = InterleavedSlice::new_mut(&mut rendered, channels, out_capacity)
            .map_err(|e| ProcessingError::Resampler(format!("output adapter: {e}")))?;

        let mut indexing = Indexing {
            input_offset: 0,
            output_offset: 0,
            active_channels_mask: None,
            partial_len: None,
        };

        let mut consumed = 0usize;
        let mut produced = 0usize;
        while produced < needed && consumed + chunk <= padded_frames {
            if produced + resampler.output_frames_next() > out_capacity {
                break;
            }
            indexing.input_offset = consumed;
            indexing.output_offset = produced;
            let (nbr_in, nbr_out) = resampler
                .process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing))
                .map_err(|e| ProcessingError::Resampler(e.to_string()))?;
            consumed += nbr_in;
            produced += nbr_out;
        }
        produced
    };

    if produced < needed {
        tracing::warn!(
            produced,
            needed,
            "resampler ended short; padding tail with silence"
        );
    }

    let mut planar = vec![Vec::with_capacity(out_frames); channels];
    for frame in delay..delay + out_frames {
        let base = frame * channels;
        for (ch, out) in planar.iter_mut().enumerate() {
            out.push(rendered[base + ch]);
        }
    }

    tracing::debug!(
        from_hz = src_rate,
        to_hz = target_rate,
        in_frames,
        out_frames,
        "resampled"
    );
    Ok(SampleBuffer::from_channels(target_rate, planar)?)
}
