use std::path::PathBuf;

use audio_crusher::config::{
    UI_BIT_DEPTH_RANGE, UI_BIT_DEPTH_STEP, UI_SAMPLE_RATE_RANGE, UI_SAMPLE_RATE_STEP,
};
use clap::{Parser, Subcommand};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "crusher", version = VERSION)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Resampler input chunk size in frames (higher => fewer calls, more padding)
    #[arg(long, default_value_t = 1024, value_parser = clap::value_parser!(u64).range(16..=65_536))]
    pub chunk_frames: u64,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play a file once and exit when it ends
    Play {
        /// Path to an audio file (wav, flac, mp3, aac, alac, aiff, vorbis)
        path: PathBuf,

        /// Play the resampled + quantized render instead of the original
        #[arg(long)]
        processed: bool,

        /// Render sample rate in Hz (8000-48000, step 8000)
        #[arg(long, default_value_t = 8_000, value_parser = parse_sample_rate)]
        sample_rate: u32,

        /// Render bit depth (4-16, step 4)
        #[arg(long, default_value_t = 8, value_parser = parse_bit_depth)]
        bit_depth: u32,
    },

    /// Interactive session: load, tweak, play and stop from a prompt
    Shell {
        /// File to load on start
        path: Option<PathBuf>,
    },
}

/// Parse a sample rate restricted to the interactive slider positions.
pub fn parse_sample_rate(s: &str) -> Result<u32, String> {
    parse_stepped(s, "sample rate", UI_SAMPLE_RATE_RANGE, UI_SAMPLE_RATE_STEP)
}

/// Parse a bit depth restricted to the interactive slider positions.
pub fn parse_bit_depth(s: &str) -> Result<u32, String> {
    parse_stepped(s, "bit depth", UI_BIT_DEPTH_RANGE, UI_BIT_DEPTH_STEP)
}

fn parse_stepped(
    s: &str,
    what: &str,
    range: std::ops::RangeInclusive<u32>,
    step: u32,
) -> Result<u32, String> {
    let value: u32 = s
        .trim()
        .parse()
        .map_err(|_| format!("invalid {what}: {s:?}"))?;
    if !range.contains(&value) || (value - range.start()) % step != 0 {
        return Err(format!(
            "{what} must be {}-{} in steps of {step}, got {value}",
            range.start(),
            range.end()
        ));
    }
    Ok(value)
}
