//! Decoder adapter.
//!
//! Uses Symphonia to:
//! - probe the container/codec of an in-memory byte sequence
//! - decode every packet of the selected track into `f32`
//! - de-interleave the result into a planar [`SampleBuffer`]
//!
//! The asset keeps its native sample rate and channel layout; no resampling or
//! remixing happens here.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer as InterleavedSamples;
use symphonia::core::codecs::{CODEC_TYPE_NULL, CodecParameters, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::buffer::SampleBuffer;
use crate::error::DecodeError;

/// Metadata captured while probing the source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceInfo {
    /// Codec name (best-effort).
    pub codec: Option<String>,
    /// Source bit depth (best-effort).
    pub bit_depth: Option<u16>,
    /// Container/extension hint (best-effort).
    pub container: Option<String>,
}

/// A fully decoded asset.
#[derive(Clone, Debug)]
pub struct DecodedAudio {
    pub buffer: SampleBuffer,
    pub info: SourceInfo,
}

/// Decode raw encoded bytes into a canonical buffer.
pub fn decode(bytes: &[u8]) -> Result<SampleBuffer, DecodeError> {
    decode_with_extension(bytes, None).map(|decoded| decoded.buffer)
}

/// Decode raw bytes, using `extension` (e.g. the dropped file's suffix) as a probe hint.
///
/// The input slice is copied and never modified.
pub fn decode_with_extension(
    bytes: &[u8],
    extension: Option<&str>,
) -> Result<DecodedAudio, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let mut hint = Hint::new();
    if let Some(ext) = extension.filter(|e| !e.is_empty()) {
        hint.with_extension(ext);
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::Unrecognized(e.to_string()))?;

    let format = probed.format;
    let track = format
        .default_track()
        .filter(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .or_else(|| {
            format
                .tracks()
                .iter()
                .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        })
        .ok_or(DecodeError::NoAudioTrack)?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let info = SourceInfo {
        codec: codec_name_from_params(&codec_params),
        bit_depth: codec_params
            .bits_per_sample
            .or(codec_params.bits_per_coded_sample)
            .and_then(|v| u16::try_from(v).ok()),
        container: extension.map(|e| e.to_ascii_uppercase()),
    };

    let buffer = decode_track(format, track_id, &codec_params)?;
    tracing::debug!(
        channels = buffer.channel_count(),
        frames = buffer.frame_count(),
        rate_hz = buffer.sample_rate(),
        codec = info.codec.as_deref().unwrap_or("unknown"),
        "asset decoded"
    );
    Ok(DecodedAudio { buffer, info })
}

/// Decode every packet of `track_id` into planar channels.
fn decode_track(
    mut format: Box<dyn FormatReader>,
    track_id: u32,
    codec_params: &CodecParameters,
) -> Result<SampleBuffer, DecodeError> {
    let mut decoder = symphonia::default::get_codecs()
        .make(codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::UnsupportedCodec(e.to_string()))?;

    let mut channels: Vec<Vec<f32>> = Vec::new();
    let mut sample_rate = codec_params.sample_rate.unwrap_or(0);
    let mut skipped = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(DecodeError::Malformed(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(msg)) => {
                skipped += 1;
                tracing::debug!("skipping undecodable packet: {msg}");
                continue;
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(DecodeError::Malformed(e.to_string())),
        };

        let spec = *decoded.spec();
        let count = spec.channels.count();
        if channels.is_empty() {
            channels = vec![Vec::new(); count];
            sample_rate = spec.rate;
        } else if channels.len() != count {
            return Err(DecodeError::Malformed(format!(
                "channel count changed from {} to {count}",
                channels.len()
            )));
        }

        let mut sample_buf = InterleavedSamples::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        for frame in sample_buf.samples().chunks_exact(count) {
            for (ch, sample) in frame.iter().enumerate() {
                channels[ch].push(*sample);
            }
        }
    }

    if skipped > 0 {
        tracing::warn!(skipped, "some packets could not be decoded");
    }
    if channels.first().is_none_or(|c| c.is_empty()) {
        return Err(DecodeError::NoFrames);
    }
    let decoded = channels.first().map_or(0, Vec::len) as u64;
    if let Some(expected) = codec_params.n_frames {
        if decoded < expected {
            return Err(DecodeError::Truncated { decoded, expected });
        }
    }
    Ok(SampleBuffer::from_channels(sample_rate, channels)?)
}

/// Best-effort codec label used for status payloads.
fn codec_name_from_params(params: &CodecParameters) -> Option<String> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_ALAC => "ALAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_OPUS => "OPUS",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM_S32",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        _ => return None,
    };
    Some(name.to_string())
}
