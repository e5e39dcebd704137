//! Bit-depth reduction.
//!
//! Every sample `x` becomes `round(x * step) / step` with `step = 2^bits / 2`.
//! `round` resolves exact halves away from zero (`2.5 -> 3`, `-2.5 -> -3`), which
//! is what [`f64::round`] does. Do not swap in `round_ties_even`: the two rules
//! produce audibly different output on half-step inputs.
//!
//! The map is pure and per-sample, so it is idempotent: quantizing an already
//! quantized buffer at the same depth returns the same values.

use crate::buffer::SampleBuffer;
use crate::config::MAX_BIT_DEPTH;
use crate::error::ProcessingError;

/// Quantization step for `bit_depth`, i.e. `2^bit_depth / 2`.
pub fn quantization_step(bit_depth: u32) -> Result<f64, ProcessingError> {
    if bit_depth == 0 || bit_depth > MAX_BIT_DEPTH {
        return Err(ProcessingError::InvalidBitDepth(bit_depth));
    }
    let step = 2f64.powi(bit_depth as i32) / 2.0;
    if !(step.is_finite() && step > 0.0) {
        return Err(ProcessingError::InvalidBitDepth(bit_depth));
    }
    Ok(step)
}

/// Snap one sample to the grid defined by `step`.
#[inline]
pub fn quantize_sample(x: f32, step: f64) -> f32 {
    ((x as f64 * step).round() / step) as f32
}

/// Reduce `buffer` to `bit_depth` bits of amplitude resolution.
///
/// Shape and sample rate are unchanged; a new buffer is returned.
pub fn quantize(buffer: &SampleBuffer, bit_depth: u32) -> Result<SampleBuffer, ProcessingError> {
    let step = quantization_step(bit_depth)?;
    Ok(buffer.map_samples(|x| quantize_sample(x, step)))
}
