//! Crusher runtime helpers.
//!
//! Provides device enumeration, one-shot playback and the interactive shell.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use audio_crusher::playback::CpalBackend;
use audio_crusher::resample::ResampleConfig;
use audio_crusher::{EngineConfig, PlaybackController, ProcessingConfig, SessionState};

use crate::shell;

#[derive(Clone, Debug)]
pub struct PlayOptions {
    pub path: PathBuf,
    pub processed: bool,
    pub config: ProcessingConfig,
}

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    audio_crusher::device::list_devices(&host)
}

/// Build a controller playing through the selected CPAL device.
pub fn controller(engine: EngineConfig) -> PlaybackController {
    let resample = ResampleConfig {
        chunk_frames: engine.chunk_frames,
    };
    let engine = EngineConfig {
        device: normalize_device_name(engine.device),
        ..engine
    };
    PlaybackController::new(Arc::new(CpalBackend::new(engine)), resample)
}

/// Play one file to its end. Ctrl-C tears the session down and exits with 130.
pub fn run_play(ctl: PlaybackController, opts: PlayOptions) -> Result<()> {
    load_file(&ctl, &opts.path)?;

    let ctl_for_signal = ctl.clone();
    let _ = ctrlc::set_handler(move || {
        ctl_for_signal.stop();
        std::process::exit(130);
    });

    let events = ctl.subscribe();
    let session = if opts.processed {
        ctl.play_processed_with(opts.config)?
    } else {
        ctl.play_original()?
    };

    // Subscribed before starting, so a very short asset cannot end unobserved.
    while let Ok(ev) = events.recv() {
        if ev.session == session && ev.state == SessionState::Terminated {
            tracing::info!(reason = ?ev.end_reason, "playback finished");
            break;
        }
    }
    Ok(())
}

/// Run the interactive shell on stdin.
pub fn run_shell(ctl: PlaybackController, path: Option<PathBuf>) -> Result<()> {
    let stdin = std::io::stdin();
    shell::run(&ctl, path.as_deref(), stdin.lock())
}

fn load_file(ctl: &PlaybackController, path: &Path) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("read {:?}", path))?;
    let ext = path.extension().and_then(|s| s.to_str());
    let info = ctl
        .load_with_extension(&bytes, ext)
        .with_context(|| format!("decode {:?}", path))?;
    tracing::info!(
        channels = info.channels,
        rate_hz = info.sample_rate,
        duration_ms = info.duration_ms,
        "source (local file)"
    );
    Ok(())
}

fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
