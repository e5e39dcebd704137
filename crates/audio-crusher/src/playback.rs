//! CPAL output engine.
//!
//! Each [`CpalContext`] is one engine thread that owns the CPAL device and at most
//! one output stream; CPAL streams never leave the thread that built them. The
//! context and source handles drive that thread over a command channel and wait
//! for its replies, so every call has completed on the device when it returns.
//!
//! The stream callback:
//! - plays the connected buffer once from its first frame
//! - applies basic channel mapping (mono↔stereo, best-effort otherwise)
//! - converts `f32` samples to the device sample format
//! - outputs silence past the end and fires the [`EndSignal`] exactly once

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use anyhow::Result;
use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};

use crate::buffer::SampleBuffer;
use crate::config::EngineConfig;
use crate::device;
use crate::error::{OutputError, TeardownError};
use crate::output::{EndSignal, OutputBackend, OutputContext, SourceNode};
use crate::pipeline;
use crate::resample::ResampleConfig;

/// [`OutputBackend`] playing through the host's CPAL device.
#[derive(Clone, Debug, Default)]
pub struct CpalBackend {
    cfg: EngineConfig,
}

impl CpalBackend {
    pub fn new(cfg: EngineConfig) -> Self {
        Self { cfg }
    }
}

impl OutputBackend for CpalBackend {
    fn open_context(&self, preferred_rate: u32) -> Result<Box<dyn OutputContext>, OutputError> {
        let ctx = CpalContext::open(
            self.cfg.device.clone(),
            preferred_rate,
            ResampleConfig {
                chunk_frames: self.cfg.chunk_frames,
            },
        )?;
        Ok(Box::new(ctx))
    }
}

/// Where the engine ended up after device negotiation.
#[derive(Clone, Debug)]
pub struct EngineInfo {
    pub device: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: String,
}

enum EngineCommand {
    Connect {
        buffer: Arc<SampleBuffer>,
        on_end: EndSignal,
        reply: Sender<Result<(), OutputError>>,
    },
    Start {
        reply: Sender<Result<(), OutputError>>,
    },
    Stop {
        reply: Sender<Result<(), TeardownError>>,
    },
    Disconnect {
        reply: Sender<()>,
    },
    Close,
}

/// Send a command built around a fresh reply channel and wait for the answer.
///
/// Returns `None` when the engine thread is gone.
fn request<T>(
    cmd_tx: &Sender<EngineCommand>,
    make: impl FnOnce(Sender<T>) -> EngineCommand,
) -> Option<T> {
    let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
    cmd_tx.send(make(reply_tx)).ok()?;
    reply_rx.recv().ok()
}

/// Handle to one engine thread.
pub struct CpalContext {
    cmd_tx: Sender<EngineCommand>,
    join: Option<JoinHandle<()>>,
    info: EngineInfo,
}

impl CpalContext {
    /// Spawn the engine thread and wait until the device is negotiated.
    pub fn open(
        device_name: Option<String>,
        preferred_rate: u32,
        resample: ResampleConfig,
    ) -> Result<Self, OutputError> {
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let join = thread::Builder::new()
            .name("crusher-output".to_string())
            .spawn(move || engine_main(device_name, preferred_rate, resample, ready_tx, cmd_rx))
            .map_err(|e| OutputError::Device(format!("spawn output engine: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(info)) => {
                tracing::info!(
                    device = %info.device,
                    rate_hz = info.sample_rate,
                    channels = info.channels,
                    sample_format = %info.sample_format,
                    "output engine opened"
                );
                Ok(Self {
                    cmd_tx,
                    join: Some(join),
                    info,
                })
            }
            Ok(Err(e)) => {
                let _ = join.join();
                Err(e)
            }
            Err(_) => {
                let _ = join.join();
                Err(OutputError::EngineClosed)
            }
        }
    }

    pub fn info(&self) -> &EngineInfo {
        &self.info
    }

    fn shutdown(&mut self) -> Result<(), TeardownError> {
        let Some(join) = self.join.take() else {
            return Ok(());
        };
        // A failed send means the thread already exited; joining is still required.
        let _ = self.cmd_tx.send(EngineCommand::Close);
        join.join()
            .map_err(|_| TeardownError::Backend("output engine panicked".to_string()))
    }
}

impl OutputContext for CpalContext {
    fn create_source(
        &mut self,
        buffer: Arc<SampleBuffer>,
        on_end: EndSignal,
    ) -> Result<Box<dyn SourceNode>, OutputError> {
        request(&self.cmd_tx, |reply| EngineCommand::Connect {
            buffer,
            on_end,
            reply,
        })
        .unwrap_or(Err(OutputError::EngineClosed))?;
        Ok(Box::new(CpalSource {
            cmd_tx: self.cmd_tx.clone(),
        }))
    }

    fn close(mut self: Box<Self>) -> Result<(), TeardownError> {
        self.shutdown()
    }
}

impl Drop for CpalContext {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::debug!("output engine shutdown: {e}");
        }
    }
}

/// Handle to the stream connected inside an engine thread.
struct CpalSource {
    cmd_tx: Sender<EngineCommand>,
}

impl SourceNode for CpalSource {
    fn start(&mut self) -> Result<(), OutputError> {
        request(&self.cmd_tx, |reply| EngineCommand::Start { reply })
            .unwrap_or(Err(OutputError::EngineClosed))
    }

    fn stop(&mut self) -> Result<(), TeardownError> {
        request(&self.cmd_tx, |reply| EngineCommand::Stop { reply })
            .unwrap_or(Err(TeardownError::EngineClosed))
    }

    fn disconnect(self: Box<Self>) {
        if request(&self.cmd_tx, |reply| EngineCommand::Disconnect { reply }).is_none() {
            tracing::debug!("output engine already closed on disconnect");
        }
    }
}

/// A built stream plus the flag its callback raises at end-of-buffer.
struct LiveStream {
    stream: cpal::Stream,
    finished: Arc<AtomicBool>,
}

/// Negotiated device state owned by the engine thread.
struct OpenDevice {
    device: cpal::Device,
    sample_format: cpal::SampleFormat,
    stream_config: cpal::StreamConfig,
    info: EngineInfo,
}

fn open_device(
    host: &cpal::Host,
    device_name: Option<&str>,
    preferred_rate: u32,
) -> Result<OpenDevice> {
    let device = device::pick_device(host, device_name)?;
    let config = device::pick_output_config(&device, Some(preferred_rate))?;
    let mut stream_config: cpal::StreamConfig = config.clone().into();
    if let Some(buf) = device::pick_buffer_size(&config) {
        stream_config.buffer_size = buf;
    }
    let info = EngineInfo {
        device: device
            .description()
            .map(|d| d.to_string())
            .unwrap_or_else(|_| "unknown".to_string()),
        sample_rate: stream_config.sample_rate,
        channels: stream_config.channels,
        sample_format: format!("{:?}", config.sample_format()),
    };
    Ok(OpenDevice {
        device,
        sample_format: config.sample_format(),
        stream_config,
        info,
    })
}

/// Engine thread body: negotiate the device, then serve commands until `Close`.
fn engine_main(
    device_name: Option<String>,
    preferred_rate: u32,
    resample: ResampleConfig,
    ready: Sender<Result<EngineInfo, OutputError>>,
    cmd_rx: Receiver<EngineCommand>,
) {
    let host = cpal::default_host();
    let open = match open_device(&host, device_name.as_deref(), preferred_rate) {
        Ok(open) => open,
        Err(e) => {
            let _ = ready.send(Err(OutputError::Device(format!("{e:#}"))));
            return;
        }
    };
    if ready.send(Ok(open.info.clone())).is_err() {
        return;
    }

    let mut source: Option<LiveStream> = None;
    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            EngineCommand::Connect {
                buffer,
                on_end,
                reply,
            } => {
                source = None;
                let result = connect_buffer(&open, buffer, on_end, resample).map(|live| {
                    source = Some(live);
                });
                let _ = reply.send(result);
            }
            EngineCommand::Start { reply } => {
                let result = match &source {
                    Some(live) => live
                        .stream
                        .play()
                        .map_err(|e| OutputError::Stream(e.to_string())),
                    None => Err(OutputError::NoSource),
                };
                let _ = reply.send(result);
            }
            EngineCommand::Stop { reply } => {
                let result = match &source {
                    None => Err(TeardownError::NotConnected),
                    Some(live) if live.finished.load(Ordering::Acquire) => {
                        Err(TeardownError::AlreadyFinished)
                    }
                    Some(live) => live
                        .stream
                        .pause()
                        .map_err(|e| TeardownError::Backend(e.to_string())),
                };
                let _ = reply.send(result);
            }
            EngineCommand::Disconnect { reply } => {
                source = None;
                let _ = reply.send(());
            }
            EngineCommand::Close => break,
        }
    }

    drop(source);
    tracing::debug!(device = %open.info.device, "output engine closed");
}

/// Bring `buffer` to the device rate and build a paused stream for it.
fn connect_buffer(
    open: &OpenDevice,
    buffer: Arc<SampleBuffer>,
    on_end: EndSignal,
    resample: ResampleConfig,
) -> Result<LiveStream, OutputError> {
    let device_rate = open.stream_config.sample_rate;
    let buffer = if buffer.sample_rate() == device_rate {
        buffer
    } else {
        Arc::new(pipeline::prepare_for_output(&buffer, device_rate, resample)?)
    };

    let finished = Arc::new(AtomicBool::new(false));
    let stream = match open.sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(open, buffer, on_end, finished.clone()),
        cpal::SampleFormat::I16 => build_stream::<i16>(open, buffer, on_end, finished.clone()),
        cpal::SampleFormat::I32 => build_stream::<i32>(open, buffer, on_end, finished.clone()),
        cpal::SampleFormat::U16 => build_stream::<u16>(open, buffer, on_end, finished.clone()),
        other => Err(OutputError::Stream(format!(
            "Unsupported sample format: {other:?}"
        ))),
    }?;
    Ok(LiveStream { stream, finished })
}

/// Type-specialized stream builder for CPAL sample formats.
fn build_stream<T>(
    open: &OpenDevice,
    buffer: Arc<SampleBuffer>,
    on_end: EndSignal,
    finished: Arc<AtomicBool>,
) -> Result<cpal::Stream, OutputError>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    let channels_out = (open.stream_config.channels as usize).max(1);
    let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);
    let mut cursor = 0usize;

    let err_fn = |err| tracing::warn!("stream error: {err}");

    open.device
        .build_output_stream(
            &open.stream_config,
            move |data: &mut [T], _| {
                let total = buffer.frame_count();
                for out in data.chunks_mut(channels_out) {
                    if cursor >= total {
                        out.fill(silence);
                        continue;
                    }
                    for (ch, slot) in out.iter_mut().enumerate() {
                        *slot = <T as cpal::Sample>::from_sample::<f32>(mapped_sample(
                            &buffer,
                            cursor,
                            channels_out,
                            ch,
                        ));
                    }
                    cursor += 1;
                }
                if cursor >= total && !finished.swap(true, Ordering::AcqRel) {
                    on_end.notify();
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| OutputError::Stream(e.to_string()))
}

/// Read one output sample for `dst_ch` of `frame`, applying a simple channel mapping.
///
/// - mono → any: duplicate channel 0
/// - stereo → mono: average L/R
/// - other layouts: clamp to the available channels
fn mapped_sample(buffer: &SampleBuffer, frame: usize, dst_channels: usize, dst_ch: usize) -> f32 {
    let src = |ch: usize| {
        buffer
            .channel(ch)
            .and_then(|c| c.get(frame))
            .copied()
            .unwrap_or(0.0)
    };
    match (buffer.channel_count(), dst_channels) {
        (1, _) => src(0),
        (2, 1) => 0.5 * (src(0) + src(1)),
        (n, _) => src(dst_ch.min(n - 1)),
    }
}
