//! Single-instance playback session.
//!
//! [`PlaybackController`] owns the loaded asset, the processing parameters and at
//! most one live output graph. Every play request tears the previous graph down
//! (stop, disconnect, close) before it builds a new one, and each graph is tagged
//! with a monotonically increasing session id so late end-of-stream notifications
//! and late offline renders from an older session are ignored.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

use crate::buffer::SampleBuffer;
use crate::config::ProcessingConfig;
use crate::decode;
use crate::error::{OutputError, ProcessingError, SessionError};
use crate::output::{EndSignal, OutputBackend, OutputContext, SourceNode};
use crate::pipeline;
use crate::resample::ResampleConfig;
use crate::status::{
    AssetInfo, PlaybackEndReason, PlaybackSource, SessionEvent, SessionState, SessionStatus,
};

/// Cheaply cloneable handle to the playback session.
///
/// The live graph is released when the last handle is dropped.
#[derive(Clone)]
pub struct PlaybackController {
    shared: Arc<Shared>,
}

struct Shared {
    backend: Arc<dyn OutputBackend>,
    resample: ResampleConfig,
    end_tx: Sender<u64>,
    inner: Mutex<Inner>,
}

struct Inner {
    next_session: u64,
    session: u64,
    state: SessionState,
    source: Option<PlaybackSource>,
    end_reason: Option<PlaybackEndReason>,
    config: ProcessingConfig,
    asset: Option<Asset>,
    graph: Option<LiveGraph>,
    subscribers: Vec<Sender<SessionEvent>>,
}

struct Asset {
    buffer: Arc<SampleBuffer>,
    info: AssetInfo,
}

/// Output resources of one session. Released exactly once.
struct LiveGraph {
    session: u64,
    context: Option<Box<dyn OutputContext>>,
    source: Option<Box<dyn SourceNode>>,
}

impl LiveGraph {
    fn open(backend: &dyn OutputBackend, session: u64, rate: u32) -> Result<Self, OutputError> {
        Ok(Self {
            session,
            context: Some(backend.open_context(rate)?),
            source: None,
        })
    }

    fn connect(&mut self, buffer: Arc<SampleBuffer>, on_end: EndSignal) -> Result<(), OutputError> {
        let context = self.context.as_mut().ok_or(OutputError::EngineClosed)?;
        self.source = Some(context.create_source(buffer, on_end)?);
        Ok(())
    }

    fn start(&mut self) -> Result<(), OutputError> {
        self.source.as_mut().ok_or(OutputError::NoSource)?.start()
    }

    /// Stop, disconnect, close. Teardown failures are expected (a finished source
    /// refuses to stop) and never abort the remaining steps.
    fn release(&mut self) {
        if let Some(mut source) = self.source.take() {
            if let Err(e) = source.stop() {
                tracing::debug!(session = self.session, "source stop: {e}");
            }
            source.disconnect();
        }
        if let Some(context) = self.context.take() {
            if let Err(e) = context.close() {
                tracing::debug!(session = self.session, "context close: {e}");
            }
        }
    }
}

impl Drop for LiveGraph {
    fn drop(&mut self) {
        self.release();
    }
}

impl Inner {
    fn new(config: ProcessingConfig) -> Self {
        Self {
            next_session: 0,
            session: 0,
            state: SessionState::Idle,
            source: None,
            end_reason: None,
            config,
            asset: None,
            graph: None,
            subscribers: Vec::new(),
        }
    }

    fn emit(&mut self, end_reason: Option<PlaybackEndReason>) {
        let event = SessionEvent {
            session: self.session,
            state: self.state,
            end_reason,
        };
        self.subscribers.retain(|tx| tx.send(event).is_ok());
    }

    /// End the active session, if any. Returns whether anything was torn down.
    fn terminate(&mut self, reason: PlaybackEndReason) -> bool {
        if !self.state.is_active() {
            return false;
        }
        if let Some(mut graph) = self.graph.take() {
            graph.release();
        }
        self.state = SessionState::Terminated;
        self.end_reason = Some(reason);
        tracing::info!(session = self.session, ?reason, "session terminated");
        self.emit(Some(reason));
        true
    }

    /// Tear down the current session and open a new one in `Starting`.
    fn begin(&mut self, source: PlaybackSource) -> u64 {
        self.terminate(PlaybackEndReason::Superseded);
        self.next_session = self.next_session.saturating_add(1);
        self.session = self.next_session;
        self.state = SessionState::Starting;
        self.source = Some(source);
        self.end_reason = None;
        tracing::debug!(session = self.session, ?source, "session starting");
        self.emit(None);
        self.session
    }

    fn fail(&mut self) {
        self.state = SessionState::Terminated;
        self.end_reason = Some(PlaybackEndReason::Failed);
        self.emit(Some(PlaybackEndReason::Failed));
    }

    fn asset_buffer(&self) -> Result<Arc<SampleBuffer>, SessionError> {
        self.asset
            .as_ref()
            .map(|a| a.buffer.clone())
            .ok_or(SessionError::NoAsset)
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open and connect a graph for `session` without holding the lock, then start
    /// it only if `session` is still the one `Starting`. A graph built for an
    /// abandoned session is released without ever producing sound.
    fn start_graph(&self, session: u64, buffer: Arc<SampleBuffer>) -> Result<(), SessionError> {
        let rate = buffer.sample_rate();
        let frames = buffer.frame_count();
        let built = LiveGraph::open(self.backend.as_ref(), session, rate).and_then(|mut graph| {
            graph.connect(buffer, EndSignal::new(session, self.end_tx.clone()))?;
            Ok(graph)
        });

        let mut inner = self.lock();
        if inner.session != session || inner.state != SessionState::Starting {
            drop(inner);
            tracing::debug!(session, "discarding graph of an abandoned session");
            drop(built);
            return Ok(());
        }

        let mut graph = match built {
            Ok(graph) => graph,
            Err(e) => {
                tracing::warn!(session, "failed to build output graph: {e}");
                inner.fail();
                return Err(e.into());
            }
        };
        if let Err(e) = graph.start() {
            tracing::warn!(session, "failed to start playback: {e}");
            inner.fail();
            drop(inner);
            drop(graph);
            return Err(e.into());
        }

        inner.graph = Some(graph);
        inner.state = SessionState::Playing;
        tracing::info!(session, rate_hz = rate, frames, "playing");
        inner.emit(None);
        Ok(())
    }

    fn handle_end(&self, session: u64) {
        let mut inner = self.lock();
        if inner.session != session || inner.state != SessionState::Playing {
            tracing::debug!(session, current = inner.session, "ignoring stale end-of-stream");
            return;
        }
        inner.terminate(PlaybackEndReason::Eof);
    }
}

fn spawn_end_watcher(shared: Weak<Shared>, end_rx: Receiver<u64>) {
    thread::spawn(move || {
        while let Ok(session) = end_rx.recv() {
            let Some(shared) = shared.upgrade() else {
                break;
            };
            shared.handle_end(session);
        }
        tracing::trace!("end-of-stream watcher exited");
    });
}

impl PlaybackController {
    pub fn new(backend: Arc<dyn OutputBackend>, resample: ResampleConfig) -> Self {
        let (end_tx, end_rx) = crossbeam_channel::unbounded();
        let shared = Arc::new(Shared {
            backend,
            resample,
            end_tx,
            inner: Mutex::new(Inner::new(ProcessingConfig::default())),
        });
        spawn_end_watcher(Arc::downgrade(&shared), end_rx);
        Self { shared }
    }

    /// Decode `bytes` and make them the current asset.
    ///
    /// On failure the previous asset (and any playing session) is left untouched.
    pub fn load(&self, bytes: &[u8]) -> Result<AssetInfo, SessionError> {
        self.load_with_extension(bytes, None)
    }

    pub fn load_with_extension(
        &self,
        bytes: &[u8],
        extension: Option<&str>,
    ) -> Result<AssetInfo, SessionError> {
        let decoded = decode::decode_with_extension(bytes, extension).inspect_err(|e| {
            tracing::warn!("decode failed: {e}");
        })?;
        let info = AssetInfo::new(&decoded.buffer, &decoded.info);
        tracing::info!(
            channels = info.channels,
            frames = info.frames,
            rate_hz = info.sample_rate,
            duration_ms = info.duration_ms,
            codec = info.codec.as_deref().unwrap_or("unknown"),
            "asset loaded"
        );

        let mut inner = self.shared.lock();
        inner.asset = Some(Asset {
            buffer: Arc::new(decoded.buffer),
            info: info.clone(),
        });
        Ok(info)
    }

    pub fn asset(&self) -> Option<Arc<SampleBuffer>> {
        self.shared.lock().asset.as_ref().map(|a| a.buffer.clone())
    }

    pub fn config(&self) -> ProcessingConfig {
        self.shared.lock().config
    }

    /// Record the parameters used by the next processed play. Does not affect a
    /// session that is already rendering or playing.
    pub fn set_config(&self, config: ProcessingConfig) {
        self.shared.lock().config = config;
    }

    /// Play the decoded asset as-is. Returns the new session id.
    ///
    /// The lock is released while the output graph is built, so `stop()` and
    /// status reads stay responsive; a stop during construction wins and this
    /// still returns `Ok`.
    pub fn play_original(&self) -> Result<u64, SessionError> {
        let (session, buffer) = {
            let mut inner = self.shared.lock();
            let buffer = inner.asset_buffer()?;
            (inner.begin(PlaybackSource::Original), buffer)
        };
        self.shared.start_graph(session, buffer)?;
        Ok(session)
    }

    /// Render and play the asset using a snapshot of the current config.
    pub fn play_processed(&self) -> Result<u64, SessionError> {
        let config = self.config();
        self.play_processed_with(config)
    }

    /// Render `config` offline on the calling thread, then play the result.
    ///
    /// If the session is stopped or superseded while rendering, the result is
    /// dropped without playing and this still returns `Ok`.
    pub fn play_processed_with(&self, config: ProcessingConfig) -> Result<u64, SessionError> {
        let (session, source) = self.begin_render(config, false)?;
        let rendered = pipeline::render_processed(&source, config, self.shared.resample);
        self.finish_render(session, rendered)?;
        Ok(session)
    }

    /// Like [`play_processed`](Self::play_processed), but renders on a worker thread.
    ///
    /// The previous session is torn down and the new one is `Starting` before
    /// this returns; the config is captured at call time. Refused with
    /// [`SessionError::Busy`] while another session is still starting.
    pub fn spawn_play_processed(
        &self,
    ) -> Result<JoinHandle<Result<u64, SessionError>>, SessionError> {
        let config = self.config();
        let (session, source) = self.begin_render(config, true)?;
        let this = self.clone();
        Ok(thread::spawn(move || {
            let rendered = pipeline::render_processed(&source, config, this.shared.resample);
            this.finish_render(session, rendered).map(|()| session)
        }))
    }

    /// Validate the request, then supersede the current session. With
    /// `exclusive`, a session that is still `Starting` is left alone instead.
    fn begin_render(
        &self,
        config: ProcessingConfig,
        exclusive: bool,
    ) -> Result<(u64, Arc<SampleBuffer>), SessionError> {
        config.validate()?;
        let mut inner = self.shared.lock();
        if exclusive && inner.state == SessionState::Starting {
            return Err(SessionError::Busy);
        }
        let buffer = inner.asset_buffer()?;
        if buffer.frame_count() == 0 {
            return Err(ProcessingError::EmptyBuffer.into());
        }
        let session = inner.begin(PlaybackSource::Processed(config));
        Ok((session, buffer))
    }

    fn finish_render(
        &self,
        session: u64,
        rendered: Result<SampleBuffer, ProcessingError>,
    ) -> Result<(), SessionError> {
        let buffer = {
            let mut inner = self.shared.lock();
            if inner.session != session || inner.state != SessionState::Starting {
                tracing::debug!(
                    session,
                    current = inner.session,
                    "discarding render of an abandoned session"
                );
                return Ok(());
            }
            match rendered {
                Ok(buffer) => buffer,
                Err(e) => {
                    tracing::warn!(session, "offline render failed: {e}");
                    inner.fail();
                    return Err(e.into());
                }
            }
        };
        self.shared.start_graph(session, Arc::new(buffer))
    }

    /// Terminate the current session. A no-op when nothing is active.
    pub fn stop(&self) {
        let mut inner = self.shared.lock();
        if !inner.terminate(PlaybackEndReason::Stopped) {
            tracing::debug!("stop ignored; no active session");
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    pub fn status(&self) -> SessionStatus {
        let inner = self.shared.lock();
        SessionStatus {
            session: inner.session,
            state: inner.state,
            config: inner.config,
            asset: inner.asset.as_ref().map(|a| a.info.clone()),
            source: inner.source,
            end_reason: inner.end_reason,
        }
    }

    /// Receive every state transition from now on.
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.shared.lock().subscribers.push(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    use super::*;
    use crate::error::{DecodeError, TeardownError};
    use crate::test_support::wav_bytes;

    #[derive(Default)]
    struct Probe {
        contexts_opened: AtomicUsize,
        contexts_live: AtomicUsize,
        sources_live: AtomicUsize,
        stop_calls: AtomicUsize,
        started: AtomicUsize,
        connect_delay_ms: AtomicU64,
        fail_stop: AtomicBool,
        fail_open: AtomicBool,
        ends: Mutex<Vec<EndSignal>>,
        played: Mutex<Vec<Arc<SampleBuffer>>>,
    }

    struct FakeBackend(Arc<Probe>);
    struct FakeContext(Arc<Probe>);
    struct FakeSource(Arc<Probe>);

    impl OutputBackend for FakeBackend {
        fn open_context(&self, _rate: u32) -> Result<Box<dyn OutputContext>, OutputError> {
            if self.0.fail_open.load(Ordering::SeqCst) {
                return Err(OutputError::Device("no device".to_string()));
            }
            self.0.contexts_opened.fetch_add(1, Ordering::SeqCst);
            self.0.contexts_live.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeContext(self.0.clone())))
        }
    }

    impl OutputContext for FakeContext {
        fn create_source(
            &mut self,
            buffer: Arc<SampleBuffer>,
            on_end: EndSignal,
        ) -> Result<Box<dyn SourceNode>, OutputError> {
            let delay = self.0.connect_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                thread::sleep(Duration::from_millis(delay));
            }
            self.0.sources_live.fetch_add(1, Ordering::SeqCst);
            self.0.ends.lock().unwrap().push(on_end);
            self.0.played.lock().unwrap().push(buffer);
            Ok(Box::new(FakeSource(self.0.clone())))
        }

        fn close(self: Box<Self>) -> Result<(), TeardownError> {
            self.0.contexts_live.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl SourceNode for FakeSource {
        fn start(&mut self) -> Result<(), OutputError> {
            self.0.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&mut self) -> Result<(), TeardownError> {
            self.0.stop_calls.fetch_add(1, Ordering::SeqCst);
            if self.0.fail_stop.load(Ordering::SeqCst) {
                Err(TeardownError::AlreadyFinished)
            } else {
                Ok(())
            }
        }

        fn disconnect(self: Box<Self>) {
            self.0.sources_live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl Probe {
        fn live(&self) -> (usize, usize) {
            (
                self.contexts_live.load(Ordering::SeqCst),
                self.sources_live.load(Ordering::SeqCst),
            )
        }

        fn opened(&self) -> usize {
            self.contexts_opened.load(Ordering::SeqCst)
        }

        fn last_played(&self) -> Arc<SampleBuffer> {
            self.played.lock().unwrap().last().cloned().unwrap()
        }
    }

    fn controller() -> (PlaybackController, Arc<Probe>) {
        let probe = Arc::new(Probe::default());
        let ctl = PlaybackController::new(
            Arc::new(FakeBackend(probe.clone())),
            ResampleConfig::default(),
        );
        (ctl, probe)
    }

    fn loaded() -> (PlaybackController, Arc<Probe>) {
        let (ctl, probe) = controller();
        ctl.load(&wav_bytes(44_100, 2, 4_410)).unwrap();
        (ctl, probe)
    }

    fn crushed(rate: u32, bits: u32) -> ProcessingConfig {
        ProcessingConfig {
            target_sample_rate: rate,
            bit_depth: bits,
        }
    }

    fn wait_for(rx: &Receiver<SessionEvent>, state: SessionState) -> SessionEvent {
        loop {
            let ev = rx
                .recv_timeout(Duration::from_secs(5))
                .expect("timed out waiting for session event");
            if ev.state == state {
                return ev;
            }
        }
    }

    #[test]
    fn starts_idle_and_stop_is_noop() {
        let (ctl, probe) = controller();
        let rx = ctl.subscribe();
        assert_eq!(ctl.state(), SessionState::Idle);
        ctl.stop();
        assert_eq!(ctl.state(), SessionState::Idle);
        assert!(rx.try_recv().is_err());
        assert_eq!(probe.opened(), 0);
    }

    #[test]
    fn play_without_asset_is_rejected() {
        let (ctl, probe) = controller();
        assert_eq!(ctl.play_original().unwrap_err(), SessionError::NoAsset);
        assert_eq!(ctl.play_processed().unwrap_err(), SessionError::NoAsset);
        assert_eq!(ctl.state(), SessionState::Idle);
        assert_eq!(probe.opened(), 0);
    }

    #[test]
    fn play_original_builds_one_graph() {
        let (ctl, probe) = loaded();
        let session = ctl.play_original().unwrap();
        let status = ctl.status();
        assert_eq!(status.session, session);
        assert_eq!(status.state, SessionState::Playing);
        assert_eq!(status.source, Some(PlaybackSource::Original));
        assert_eq!(probe.live(), (1, 1));
        assert_eq!(probe.last_played().sample_rate(), 44_100);
    }

    #[test]
    fn at_most_one_graph_across_requests() {
        let (ctl, probe) = loaded();
        let first = ctl.play_original().unwrap();
        ctl.set_config(crushed(8_000, 8));
        let second = ctl.play_processed().unwrap();
        let third = ctl.play_original().unwrap();
        assert!(first < second && second < third);
        assert_eq!(probe.opened(), 3);
        assert_eq!(probe.live(), (1, 1));
        assert_eq!(probe.stop_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn processed_twice_leaves_one_session() {
        let (ctl, probe) = loaded();
        let rx = ctl.subscribe();
        let first = ctl.play_processed_with(crushed(8_000, 8)).unwrap();
        let second = ctl.play_processed_with(crushed(16_000, 4)).unwrap();
        assert_eq!(ctl.state(), SessionState::Playing);
        assert_eq!(probe.opened(), 2);
        assert_eq!(probe.live(), (1, 1));

        let ended = rx
            .try_iter()
            .find(|ev| ev.session == first && ev.state == SessionState::Terminated)
            .unwrap();
        assert_eq!(ended.end_reason, Some(PlaybackEndReason::Superseded));
        assert_eq!(ctl.status().session, second);
    }

    #[test]
    fn processed_buffer_matches_config() {
        let (ctl, probe) = loaded();
        ctl.set_config(crushed(8_000, 4));
        ctl.play_processed().unwrap();
        let played = probe.last_played();
        assert_eq!(played.sample_rate(), 8_000);
        assert_eq!(played.channel_count(), 2);
        assert_eq!(played.frame_count(), 800);
        for ch in played.channels() {
            for s in ch {
                let scaled = *s as f64 * 8.0;
                assert_eq!(scaled, scaled.round());
            }
        }
        assert_eq!(
            ctl.status().source,
            Some(PlaybackSource::Processed(crushed(8_000, 4)))
        );
    }

    #[test]
    fn stop_releases_everything_once() {
        let (ctl, probe) = loaded();
        ctl.play_original().unwrap();
        ctl.stop();
        assert_eq!(ctl.state(), SessionState::Terminated);
        assert_eq!(ctl.status().end_reason, Some(PlaybackEndReason::Stopped));
        assert_eq!(probe.live(), (0, 0));

        ctl.stop();
        assert_eq!(probe.stop_calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctl.status().end_reason, Some(PlaybackEndReason::Stopped));
    }

    #[test]
    fn failing_source_stop_still_closes_context() {
        let (ctl, probe) = loaded();
        probe.fail_stop.store(true, Ordering::SeqCst);
        ctl.play_original().unwrap();
        ctl.play_original().unwrap();
        assert_eq!(probe.live(), (1, 1));
        ctl.stop();
        assert_eq!(probe.live(), (0, 0));
        assert_eq!(ctl.state(), SessionState::Terminated);
    }

    #[test]
    fn natural_end_terminates_session() {
        let (ctl, probe) = loaded();
        let rx = ctl.subscribe();
        let session = ctl.play_original().unwrap();
        probe.ends.lock().unwrap()[0].notify();

        let ev = wait_for(&rx, SessionState::Terminated);
        assert_eq!(ev.session, session);
        assert_eq!(ev.end_reason, Some(PlaybackEndReason::Eof));
        assert_eq!(probe.live(), (0, 0));
    }

    #[test]
    fn stale_end_is_ignored() {
        let (ctl, probe) = loaded();
        let first = ctl.play_original().unwrap();
        let second = ctl.play_original().unwrap();
        assert_eq!(probe.ends.lock().unwrap()[0].session(), first);

        ctl.shared.handle_end(first);
        assert_eq!(ctl.state(), SessionState::Playing);
        assert_eq!(ctl.status().session, second);
        assert_eq!(probe.live(), (1, 1));

        ctl.shared.handle_end(second);
        assert_eq!(ctl.state(), SessionState::Terminated);
        assert_eq!(ctl.status().end_reason, Some(PlaybackEndReason::Eof));
    }

    fn wait_for_state(ctl: &PlaybackController, state: SessionState) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while ctl.state() != state {
            assert!(Instant::now() < deadline, "never reached {state:?}");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn stop_does_not_wait_for_graph_construction() {
        let (ctl, probe) = loaded();
        probe.connect_delay_ms.store(800, Ordering::SeqCst);
        let player = ctl.clone();
        let handle = thread::spawn(move || player.play_original());
        wait_for_state(&ctl, SessionState::Starting);

        let asked = Instant::now();
        assert_eq!(ctl.status().state, SessionState::Starting);
        ctl.stop();
        assert!(
            asked.elapsed() < Duration::from_millis(400),
            "stop blocked for {:?}",
            asked.elapsed()
        );
        assert_eq!(ctl.state(), SessionState::Terminated);

        let session = handle.join().unwrap().unwrap();
        assert_eq!(ctl.status().session, session);
        assert_eq!(ctl.state(), SessionState::Terminated);
        assert_eq!(ctl.status().end_reason, Some(PlaybackEndReason::Stopped));
        assert_eq!(probe.started.load(Ordering::SeqCst), 0);
        assert_eq!(probe.live(), (0, 0));
    }

    #[test]
    fn superseded_construction_never_starts() {
        let (ctl, probe) = loaded();
        probe.connect_delay_ms.store(300, Ordering::SeqCst);
        let player = ctl.clone();
        let handle = thread::spawn(move || player.play_original());
        wait_for_state(&ctl, SessionState::Starting);

        let second = ctl.play_original().unwrap();
        handle.join().unwrap().unwrap();

        assert_eq!(ctl.status().session, second);
        assert_eq!(ctl.state(), SessionState::Playing);
        assert_eq!(probe.started.load(Ordering::SeqCst), 1);
        assert_eq!(probe.live(), (1, 1));
    }

    #[test]
    fn background_render_refused_while_starting() {
        let (ctl, probe) = loaded();
        let (session, _) = ctl.begin_render(crushed(8_000, 8), false).unwrap();
        assert_eq!(
            ctl.spawn_play_processed().unwrap_err(),
            SessionError::Busy
        );
        let status = ctl.status();
        assert_eq!(status.session, session);
        assert_eq!(status.state, SessionState::Starting);
        assert_eq!(probe.opened(), 0);
    }

    #[test]
    fn stop_during_render_discards_output() {
        let (ctl, probe) = loaded();
        let config = crushed(8_000, 8);
        let (session, source) = ctl.begin_render(config, false).unwrap();
        assert_eq!(ctl.state(), SessionState::Starting);
        ctl.stop();

        let rendered = pipeline::render_processed(&source, config, ResampleConfig::default());
        ctl.finish_render(session, rendered).unwrap();
        assert_eq!(ctl.state(), SessionState::Terminated);
        assert_eq!(probe.opened(), 0);
    }

    #[test]
    fn superseded_render_is_discarded() {
        let (ctl, probe) = loaded();
        let config = crushed(16_000, 8);
        let (stale, source) = ctl.begin_render(config, false).unwrap();
        let (fresh, _) = ctl.begin_render(config, false).unwrap();

        let rendered = pipeline::render_processed(&source, config, ResampleConfig::default());
        ctl.finish_render(stale, rendered.clone()).unwrap();
        assert_eq!(probe.opened(), 0);
        assert_eq!(ctl.state(), SessionState::Starting);

        ctl.finish_render(fresh, rendered).unwrap();
        assert_eq!(ctl.state(), SessionState::Playing);
        assert_eq!(probe.live(), (1, 1));
    }

    #[test]
    fn invalid_config_leaves_session_alone() {
        let (ctl, probe) = loaded();
        let session = ctl.play_original().unwrap();
        let err = ctl.play_processed_with(crushed(8_000, 0)).unwrap_err();
        assert_eq!(err, SessionError::Processing(ProcessingError::InvalidBitDepth(0)));
        let status = ctl.status();
        assert_eq!(status.session, session);
        assert_eq!(status.state, SessionState::Playing);
        assert_eq!(probe.live(), (1, 1));
    }

    #[test]
    fn decode_failure_keeps_previous_asset() {
        let (ctl, _probe) = loaded();
        ctl.play_original().unwrap();
        let before = ctl.asset().unwrap();

        assert_eq!(
            ctl.load(&[]).unwrap_err(),
            SessionError::Decode(DecodeError::Empty)
        );
        assert!(matches!(
            ctl.load(b"definitely not audio").unwrap_err(),
            SessionError::Decode(_)
        ));
        let partial = wav_bytes(44_100, 2, 4_410);
        assert!(matches!(
            ctl.load(&partial[..partial.len() - 400]).unwrap_err(),
            SessionError::Decode(DecodeError::Truncated { .. })
        ));
        assert!(Arc::ptr_eq(&before, &ctl.asset().unwrap()));
        assert_eq!(ctl.state(), SessionState::Playing);
    }

    #[test]
    fn open_failure_marks_session_failed() {
        let (ctl, probe) = loaded();
        probe.fail_open.store(true, Ordering::SeqCst);
        assert!(matches!(
            ctl.play_original().unwrap_err(),
            SessionError::Output(OutputError::Device(_))
        ));
        assert_eq!(ctl.state(), SessionState::Terminated);
        assert_eq!(ctl.status().end_reason, Some(PlaybackEndReason::Failed));
        assert_eq!(probe.live(), (0, 0));
    }

    #[test]
    fn events_follow_lifecycle() {
        let (ctl, _probe) = loaded();
        let rx = ctl.subscribe();
        let first = ctl.play_original().unwrap();
        let second = ctl.play_original().unwrap();

        let events: Vec<_> = rx.try_iter().collect();
        let expect = |session, state, end_reason| SessionEvent {
            session,
            state,
            end_reason,
        };
        assert_eq!(
            events,
            vec![
                expect(first, SessionState::Starting, None),
                expect(first, SessionState::Playing, None),
                expect(
                    first,
                    SessionState::Terminated,
                    Some(PlaybackEndReason::Superseded)
                ),
                expect(second, SessionState::Starting, None),
                expect(second, SessionState::Playing, None),
            ]
        );
    }

    #[test]
    fn spawned_render_uses_config_at_request_time() {
        let (ctl, probe) = loaded();
        ctl.set_config(crushed(16_000, 8));
        let handle = ctl.spawn_play_processed().unwrap();
        assert_eq!(ctl.state(), SessionState::Starting);
        ctl.set_config(crushed(8_000, 4));

        let session = handle.join().unwrap().unwrap();
        assert_eq!(ctl.status().session, session);
        assert_eq!(ctl.state(), SessionState::Playing);
        assert_eq!(probe.last_played().sample_rate(), 16_000);
        assert_eq!(ctl.config(), crushed(8_000, 4));
    }

    #[test]
    fn loading_does_not_interrupt_playback() {
        let (ctl, probe) = loaded();
        ctl.play_original().unwrap();
        let info = ctl.load(&wav_bytes(22_050, 1, 2_205)).unwrap();
        assert_eq!(info.sample_rate, 22_050);
        assert_eq!(info.channels, 1);
        assert_eq!(ctl.state(), SessionState::Playing);
        assert_eq!(probe.live(), (1, 1));
    }

    #[test]
    fn dropping_controller_releases_graph() {
        let (ctl, probe) = loaded();
        ctl.play_original().unwrap();
        drop(ctl);
        assert_eq!(probe.live(), (0, 0));
    }
}
