//! Processing parameters and engine tuning.

use std::ops::RangeInclusive;

use crate::error::ProcessingError;

pub const DEFAULT_TARGET_SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_BIT_DEPTH: u32 = 16;
/// Highest bit depth the quantizer accepts.
pub const MAX_BIT_DEPTH: u32 = 32;

/// Sample-rate range offered by interactive front ends.
pub const UI_SAMPLE_RATE_RANGE: RangeInclusive<u32> = 8_000..=48_000;
pub const UI_SAMPLE_RATE_STEP: u32 = 8_000;
/// Bit-depth range offered by interactive front ends.
pub const UI_BIT_DEPTH_RANGE: RangeInclusive<u32> = 4..=16;
pub const UI_BIT_DEPTH_STEP: u32 = 4;

/// User-selected transformation parameters.
///
/// Passed by value into the render pipeline, so edits made while a render is
/// in flight never affect that render.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessingConfig {
    /// Rate the processed buffer is rendered at, in Hz.
    pub target_sample_rate: u32,
    /// Amplitude resolution of the processed buffer.
    pub bit_depth: u32,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: DEFAULT_TARGET_SAMPLE_RATE,
            bit_depth: DEFAULT_BIT_DEPTH,
        }
    }
}

impl ProcessingConfig {
    /// Check the values against what the pipeline can process.
    ///
    /// This is wider than the `UI_*` ranges: any positive rate and any depth in
    /// `1..=32` is accepted. Out-of-range values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ProcessingError> {
        if self.target_sample_rate == 0 {
            return Err(ProcessingError::InvalidSampleRate(self.target_sample_rate));
        }
        if self.bit_depth == 0 || self.bit_depth > MAX_BIT_DEPTH {
            return Err(ProcessingError::InvalidBitDepth(self.bit_depth));
        }
        Ok(())
    }
}

/// Tuning shared by the offline render and the output engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Resampler input chunk size in frames.
    pub chunk_frames: usize,
    /// Output device substring match; `None` selects the host default.
    pub device: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_frames: 1024,
            device: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_front_end() {
        let cfg = ProcessingConfig::default();
        assert_eq!(cfg.target_sample_rate, 44_100);
        assert_eq!(cfg.bit_depth, 16);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_accepts_values_outside_ui_domain() {
        let cfg = ProcessingConfig {
            target_sample_rate: 96_000,
            bit_depth: 32,
        };
        assert!(cfg.validate().is_ok());
        let cfg = ProcessingConfig {
            target_sample_rate: 1,
            bit_depth: 1,
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_rate_and_bad_depth() {
        let zero_rate = ProcessingConfig {
            target_sample_rate: 0,
            bit_depth: 8,
        };
        assert_eq!(
            zero_rate.validate(),
            Err(ProcessingError::InvalidSampleRate(0))
        );
        for bits in [0, 33] {
            let cfg = ProcessingConfig {
                target_sample_rate: 8_000,
                bit_depth: bits,
            };
            assert_eq!(cfg.validate(), Err(ProcessingError::InvalidBitDepth(bits)));
        }
    }

    #[test]
    fn ui_ranges_are_step_aligned() {
        assert_eq!(
            (UI_SAMPLE_RATE_RANGE.end() - UI_SAMPLE_RATE_RANGE.start()) % UI_SAMPLE_RATE_STEP,
            0
        );
        assert_eq!(
            (UI_BIT_DEPTH_RANGE.end() - UI_BIT_DEPTH_RANGE.start()) % UI_BIT_DEPTH_STEP,
            0
        );
    }
}
