//! Fixtures shared by the inline test modules.

use std::io::Cursor;

use crate::buffer::SampleBuffer;

/// Encode a 16-bit PCM WAV in memory.
///
/// Channel 0 holds a constant +0.5, channel 1 a constant -0.25, any further
/// channels are silent.
pub(crate) fn wav_bytes(rate: u32, channels: u16, frames: usize) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for _ in 0..frames {
            for ch in 0..channels {
                let value: i16 = match ch {
                    0 => 16_384,
                    1 => -8_192,
                    _ => 0,
                };
                writer.write_sample(value).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// A sine tone of `freq_hz` at `amplitude` on every channel.
pub(crate) fn sine(
    rate: u32,
    channels: usize,
    frames: usize,
    freq_hz: f32,
    amplitude: f32,
) -> SampleBuffer {
    let tone: Vec<f32> = (0..frames)
        .map(|i| {
            let t = i as f32 / rate as f32;
            amplitude * (2.0 * std::f32::consts::PI * freq_hz * t).sin()
        })
        .collect();
    SampleBuffer::from_channels(rate, vec![tone; channels]).unwrap()
}

/// Root-mean-square of `samples`.
pub(crate) fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|s| (*s as f64) * (*s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}
