//! Output device discovery and selection (thin CPAL wrappers).

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Upper bound for a fixed stream buffer size.
const MAX_BUFFER_FRAMES: u32 = 16_384;

/// Output device metadata for listings.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub name: String,
    pub min_rate: u32,
    pub max_rate: u32,
    pub is_default: bool,
}

/// Pick the first output device whose name contains `needle` (case-insensitive),
/// or the host default when `needle` is `None` or blank.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    if let Some(needle) = needle.map(str::trim).filter(|n| !n.is_empty()) {
        let devices = host.output_devices().context("No output devices")?;
        for device in devices {
            let matched = device
                .description()
                .map(|d| matches_device_name(&d.to_string(), needle))
                .unwrap_or(false);
            if matched {
                return Ok(device);
            }
        }
        return Err(anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// Choose an output config for `target_rate`.
///
/// Prefers the target rate itself, then the highest rate below it, then the lowest
/// rate above it; ties are broken by sample format (`f32` first).
pub fn pick_output_config(
    device: &cpal::Device,
    target_rate: Option<u32>,
) -> Result<cpal::SupportedStreamConfig> {
    let mut best: Option<(Candidate, cpal::SupportedStreamConfig)> = None;

    for range in device.supported_output_configs()? {
        let rate = rate_for_range(range.min_sample_rate(), range.max_sample_rate(), target_rate);
        let candidate = Candidate {
            at_or_below_target: target_rate.is_none_or(|t| rate <= t),
            rate,
            format_rank: sample_format_rank(range.sample_format()),
        };
        if best.as_ref().is_none_or(|(b, _)| candidate.beats(b)) {
            best = Some((candidate, range.with_sample_rate(rate)));
        }
    }

    best.map(|(_, cfg)| cfg)
        .ok_or_else(|| anyhow!("No supported output configs"))
}

/// Fixed buffer size (capped) when the device advertises a range, else `None`.
pub fn pick_buffer_size(config: &cpal::SupportedStreamConfig) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            Some(cpal::BufferSize::Fixed(cap_buffer_frames(*min, *max)))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Print available output devices to stdout.
pub fn list_devices(host: &cpal::Host) -> Result<()> {
    for (i, info) in list_device_infos(host)?.iter().enumerate() {
        let marker = if info.is_default { " (default)" } else { "" };
        println!(
            "#{i}: {}{marker} [{}-{} Hz]",
            info.name, info.min_rate, info.max_rate
        );
    }
    Ok(())
}

/// Collect output device metadata. Devices without a usable rate range are skipped.
pub fn list_device_infos(host: &cpal::Host) -> Result<Vec<DeviceInfo>> {
    let default_name = host
        .default_output_device()
        .and_then(|d| d.description().ok())
        .map(|d| d.to_string());

    let mut out = Vec::new();
    for device in host.output_devices().context("No output devices")? {
        let name = device.description()?.to_string();
        let (mut min_rate, mut max_rate) = (u32::MAX, 0u32);
        if let Ok(ranges) = device.supported_output_configs() {
            for r in ranges {
                min_rate = min_rate.min(r.min_sample_rate());
                max_rate = max_rate.max(r.max_sample_rate());
            }
        }
        if min_rate > max_rate {
            if let Ok(cfg) = device.default_output_config() {
                min_rate = cfg.sample_rate();
                max_rate = cfg.sample_rate();
            }
        }
        if min_rate == 0 || min_rate > max_rate {
            tracing::warn!(device = %name, "skipping device with invalid sample rate range");
            continue;
        }
        out.push(DeviceInfo {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            min_rate,
            max_rate,
        });
    }
    Ok(out)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Candidate {
    at_or_below_target: bool,
    rate: u32,
    format_rank: u8,
}

impl Candidate {
    fn beats(&self, other: &Candidate) -> bool {
        if self.at_or_below_target != other.at_or_below_target {
            return self.at_or_below_target;
        }
        if self.rate != other.rate {
            // Below the target the highest rate is closest; above it the lowest is.
            return if self.at_or_below_target {
                self.rate > other.rate
            } else {
                self.rate < other.rate
            };
        }
        self.format_rank < other.format_rank
    }
}

fn rate_for_range(min: u32, max: u32, target_rate: Option<u32>) -> u32 {
    match target_rate {
        Some(target) => target.clamp(min, max.max(min)),
        None => max,
    }
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn cap_buffer_frames(min: u32, max: u32) -> u32 {
    if max <= MAX_BUFFER_FRAMES {
        max
    } else {
        min.max(MAX_BUFFER_FRAMES)
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    !needle.is_empty() && name.to_lowercase().contains(&needle.to_lowercase())
}
