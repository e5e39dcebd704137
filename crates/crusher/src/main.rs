//! Crusher: load an audio file, render it at a reduced sample rate and bit depth,
//! and A/B the result against the original on a CPAL output device.
//!
//! ## Modes
//! - `play`: play a file (original or processed) once and exit.
//! - `shell`: interactive prompt over a single playback session.

mod cli;
mod runtime;
mod shell;

use anyhow::Result;
use audio_crusher::{EngineConfig, ProcessingConfig};
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,crusher=info,audio_crusher=info")),
        )
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    let Some(cmd) = args.cmd else {
        cli::Args::command().print_help()?;
        return Ok(());
    };

    let ctl = runtime::controller(EngineConfig {
        chunk_frames: usize::try_from(args.chunk_frames)?,
        device: args.device,
    });

    match cmd {
        cli::Command::Play {
            path,
            processed,
            sample_rate,
            bit_depth,
        } => runtime::run_play(
            ctl,
            runtime::PlayOptions {
                path,
                processed,
                config: ProcessingConfig {
                    target_sample_rate: sample_rate,
                    bit_depth,
                },
            },
        ),
        cli::Command::Shell { path } => runtime::run_shell(ctl, path),
    }
}
