//! Line-oriented interactive front end.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result};
use audio_crusher::status::{Controls, SessionStatus};
use audio_crusher::{PlaybackController, SessionEvent};

use crate::cli::{parse_bit_depth, parse_sample_rate};

const HELP: &str = "\
commands:
  load <path>   decode a file and make it the current asset
  rate <hz>     render sample rate (8000-48000, step 8000)
  bits <n>      render bit depth (4-16, step 4)
  play          play the original asset
  process       render with the current settings and play the result
  stop          stop playback
  status        show the current session
  help          show this text
  quit          stop playback and exit";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShellCommand {
    Load(PathBuf),
    Rate(u32),
    Bits(u32),
    Play,
    Process,
    Stop,
    Status,
    Help,
    Quit,
    Empty,
}

pub fn parse_command(line: &str) -> Result<ShellCommand, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (line, ""),
    };
    let no_args = |cmd: ShellCommand| {
        if rest.is_empty() {
            Ok(cmd)
        } else {
            Err(format!("{word} takes no arguments"))
        }
    };
    match word.to_ascii_lowercase().as_str() {
        "" => Ok(ShellCommand::Empty),
        "load" if rest.is_empty() => Err("usage: load <path>".to_string()),
        "load" => Ok(ShellCommand::Load(PathBuf::from(rest))),
        "rate" => parse_sample_rate(rest).map(ShellCommand::Rate),
        "bits" => parse_bit_depth(rest).map(ShellCommand::Bits),
        "play" => no_args(ShellCommand::Play),
        "process" => no_args(ShellCommand::Process),
        "stop" => no_args(ShellCommand::Stop),
        "status" => no_args(ShellCommand::Status),
        "help" | "?" => Ok(ShellCommand::Help),
        "quit" | "exit" => Ok(ShellCommand::Quit),
        other => Err(format!("unknown command: {other} (try `help`)")),
    }
}

/// Read commands from `input` until `quit` or end of input.
pub fn run(ctl: &PlaybackController, initial: Option<&Path>, input: impl BufRead) -> Result<()> {
    spawn_event_printer(ctl);

    if let Some(path) = initial {
        load(ctl, path);
    }
    println!("type `help` for commands");

    let mut stdout = std::io::stdout();
    prompt(&mut stdout)?;
    for line in input.lines() {
        let line = line.context("read command")?;
        match parse_command(&line) {
            Ok(ShellCommand::Quit) => break,
            Ok(cmd) => execute(ctl, cmd),
            Err(msg) => println!("{msg}"),
        }
        prompt(&mut stdout)?;
    }

    ctl.stop();
    Ok(())
}

fn prompt(out: &mut impl Write) -> Result<()> {
    write!(out, "crusher> ")?;
    out.flush()?;
    Ok(())
}

fn execute(ctl: &PlaybackController, cmd: ShellCommand) {
    match cmd {
        ShellCommand::Load(path) => load(ctl, &path),
        ShellCommand::Rate(rate) => {
            let mut config = ctl.config();
            config.target_sample_rate = rate;
            ctl.set_config(config);
            println!("rate: {rate} Hz");
        }
        ShellCommand::Bits(bits) => {
            let mut config = ctl.config();
            config.bit_depth = bits;
            ctl.set_config(config);
            println!("bits: {bits}");
        }
        ShellCommand::Play => {
            if let Err(e) = ctl.play_original() {
                println!("play failed: {e}");
            }
        }
        ShellCommand::Process => process(ctl),
        ShellCommand::Stop => ctl.stop(),
        ShellCommand::Status => println!("{}", format_status(&ctl.status())),
        ShellCommand::Help => println!("{HELP}"),
        ShellCommand::Quit | ShellCommand::Empty => {}
    }
}

fn load(ctl: &PlaybackController, path: &Path) {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            println!("cannot read {}: {e}", path.display());
            return;
        }
    };
    let ext = path.extension().and_then(|s| s.to_str());
    match ctl.load_with_extension(&bytes, ext) {
        Ok(info) => println!(
            "loaded {}: {} ch, {} Hz, {:.2}s",
            path.display(),
            info.channels,
            info.sample_rate,
            info.duration_ms as f64 / 1000.0
        ),
        Err(e) => println!("load failed: {e}"),
    }
}

fn process(ctl: &PlaybackController) {
    match ctl.spawn_play_processed() {
        Ok(handle) => {
            thread::spawn(move || match handle.join() {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => println!("process failed: {e}"),
                Err(_) => tracing::warn!("render thread panicked"),
            });
        }
        Err(e) => println!("process failed: {e}"),
    }
}

fn spawn_event_printer(ctl: &PlaybackController) {
    let rx = ctl.subscribe();
    thread::spawn(move || {
        while let Ok(ev) = rx.recv() {
            println!("{}", format_event(&ev));
        }
    });
}

fn format_event(ev: &SessionEvent) -> String {
    match ev.end_reason {
        Some(reason) => format!("[session {}] {:?} ({reason:?})", ev.session, ev.state),
        None => format!("[session {}] {:?}", ev.session, ev.state),
    }
}

pub fn format_status(status: &SessionStatus) -> String {
    let asset = match &status.asset {
        Some(a) => format!(
            "{} ch, {} Hz, {} frames, {} ms{}",
            a.channels,
            a.sample_rate,
            a.frames,
            a.duration_ms,
            a.codec.as_deref().map(|c| format!(", {c}")).unwrap_or_default()
        ),
        None => "none".to_string(),
    };
    let Controls {
        play_original,
        play_processed,
        stop,
    } = status.controls();
    let mut enabled = Vec::new();
    if play_original {
        enabled.push("play");
    }
    if play_processed {
        enabled.push("process");
    }
    if stop {
        enabled.push("stop");
    }
    format!(
        "session: {} {:?}{}\nasset: {asset}\nsettings: {} Hz / {} bit\navailable: {}",
        status.session,
        status.state,
        status
            .end_reason
            .map(|r| format!(" ({r:?})"))
            .unwrap_or_default(),
        status.config.target_sample_rate,
        status.config.bit_depth,
        if enabled.is_empty() {
            "load".to_string()
        } else {
            enabled.join(", ")
        }
    )
}
