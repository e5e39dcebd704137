//! Offline render pipeline wiring: resample -> quantize, plus device-rate preparation.

use std::time::Instant;

use crate::buffer::SampleBuffer;
use crate::config::ProcessingConfig;
use crate::error::ProcessingError;
use crate::resample::{self, ResampleConfig};
use crate::quantize;

/// Render the processed version of `source` for `config`.
///
/// Runs the resample stage to completion, then quantizes its output. Nothing is
/// observable until both stages are done; `source` is only read.
pub fn render_processed(
    source: &SampleBuffer,
    config: ProcessingConfig,
    resample_cfg: ResampleConfig,
) -> Result<SampleBuffer, ProcessingError> {
    config.validate()?;
    if source.frame_count() == 0 {
        return Err(ProcessingError::EmptyBuffer);
    }

    let started = Instant::now();
    let resampled = resample::resample(source, config.target_sample_rate, resample_cfg)?;
    let resample_ms = started.elapsed().as_millis();
    let quantized = quantize::quantize(&resampled, config.bit_depth)?;

    tracing::info!(
        from_hz = source.sample_rate(),
        rate_hz = config.target_sample_rate,
        bit_depth = config.bit_depth,
        frames = quantized.frame_count(),
        resample_ms,
        total_ms = started.elapsed().as_millis(),
        "offline render finished"
    );
    Ok(quantized)
}

/// Convert `buffer` to `device_rate` when the output cannot run at the buffer's own rate.
///
/// The processed buffer is already band-limited to its render rate, so converting
/// it up again keeps the degradation audible.
pub fn prepare_for_output(
    buffer: &SampleBuffer,
    device_rate: u32,
    resample_cfg: ResampleConfig,
) -> Result<SampleBuffer, ProcessingError> {
    if buffer.sample_rate() == device_rate || buffer.frame_count() == 0 {
        return Ok(buffer.clone());
    }
    tracing::info!(
        from_hz = buffer.sample_rate(),
        rate_hz = device_rate,
        "resampling to device rate"
    );
    resample::resample(buffer, device_rate, resample_cfg)
}
