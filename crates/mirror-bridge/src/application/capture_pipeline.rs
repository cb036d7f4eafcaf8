//! CapturePipeline: supervised frame producer for one Android device link.
//!
//! One background worker task per link produces frames into a [`FrameHub`].
//! The worker runs whichever strategy the current [`CaptureMode`] selects:
//!
//! - **Turbo** – opens the screen-record → transcoder stream, splits its
//!   output into JPEG images and publishes each one.  When the stream ends
//!   or errors, the link is downgraded to Compat for good and the worker
//!   restarts after `restart_delay`.
//! - **Compat** – takes one PNG screenshot per iteration, pausing
//!   `compat_interval` between shots and `compat_backoff` after a failure.
//!   Retries are unbounded and never escalate the mode.
//!
//! Before each strategy run the worker makes a best-effort connection
//! attempt; its outcome is only logged.
//!
//! # Single producer
//!
//! [`CapturePipeline::start_stream`] spawns a worker only from `Stopped` (or
//! `Failed`).  While a worker is `Starting` or `Running`, further calls are
//! no-ops.  [`CapturePipeline::stop`] aborts the worker task; the child
//! processes it owns are killed when their handles drop.
//! [`CapturePipeline::needs_restart`] tells a starving viewer whether the
//! worker is gone or stuck, as opposed to busy with a slow screenshot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::StreamExt;
use mirror_core::{CaptureMode, Frame, JpegSplitter, StreamState};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::device::{AndroidCapture, DeviceError};
use crate::application::frame_channel::{FrameChannel, FrameHub};
use crate::domain::config::CaptureSettings;

/// Supervisor handle for one Android link.  Cheap to clone.
#[derive(Clone)]
pub struct CapturePipeline {
    inner: Arc<Inner>,
}

struct Inner {
    device_id: String,
    capture: Arc<dyn AndroidCapture>,
    settings: CaptureSettings,
    hub: FrameHub,
    state: Mutex<StreamState>,
    mode: Mutex<CaptureMode>,
    /// Set once Turbo has failed on this link.
    downgraded: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Why a Turbo run ended.
enum TurboExit {
    Failed(DeviceError),
    ModeChanged,
}

impl CapturePipeline {
    pub fn new(
        device_id: impl Into<String>,
        capture: Arc<dyn AndroidCapture>,
        initial_mode: CaptureMode,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                device_id: device_id.into(),
                capture,
                settings,
                hub: FrameHub::new(),
                state: Mutex::new(StreamState::Stopped),
                mode: Mutex::new(initial_mode),
                downgraded: AtomicBool::new(false),
                worker: Mutex::new(None),
            }),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.inner.device_id
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.inner.settings
    }

    /// Spawns the capture worker unless one is already active.
    ///
    /// Returns `true` when a new worker was spawned.
    pub fn start_stream(&self) -> bool {
        let mut state = self.inner.lock_state();
        if state.is_active() {
            debug!("{}: start ignored, stream is {}", self.inner.device_id, *state);
            return false;
        }
        *state = StreamState::Starting;

        info!(
            "{}: starting capture in {} mode",
            self.inner.device_id,
            self.mode()
        );
        let handle = tokio::spawn(run_worker(Arc::clone(&self.inner)));
        if let Some(previous) = self.inner.lock_worker().replace(handle) {
            previous.abort();
        }
        true
    }

    /// Aborts the worker (killing its child processes) and marks the link stopped.
    pub fn stop(&self) {
        let mut state = self.inner.lock_state();
        if let Some(handle) = self.inner.lock_worker().take() {
            handle.abort();
        }
        if *state != StreamState::Stopped {
            info!("{}: capture stopped", self.inner.device_id);
        }
        *state = StreamState::Stopped;
    }

    pub fn state(&self) -> StreamState {
        *self.inner.lock_state()
    }

    /// Advisory: `true` while a producer is starting or running.
    pub fn is_running(&self) -> bool {
        self.state().is_active()
    }

    pub fn mode(&self) -> CaptureMode {
        self.inner.mode()
    }

    /// Whether a viewer that saw no frame within its drain timeout should
    /// restart the producer.
    ///
    /// A finished worker always needs a restart.  A live Compat worker does
    /// not: each screenshot is bounded by `compat_timeout`, and aborting one
    /// in progress would discard it.  A live Turbo worker may be blocked on a
    /// silent transcoder, so it is restarted.
    pub fn needs_restart(&self) -> bool {
        let worker_alive = self
            .inner
            .lock_worker()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished());
        !worker_alive || self.mode() == CaptureMode::Turbo
    }

    /// `true` once Turbo has failed on this link.
    pub fn is_downgraded(&self) -> bool {
        self.inner.downgraded.load(Ordering::Relaxed)
    }

    /// Explicit mode request from a viewer.
    ///
    /// This is the only way back to Turbo after a downgrade.  A running
    /// worker picks the new mode up on its next iteration.
    pub fn request_mode(&self, mode: CaptureMode) {
        let mut current = self.inner.lock_mode();
        if *current != mode {
            info!(
                "{}: capture mode {} -> {} (requested)",
                self.inner.device_id, *current, mode
            );
            *current = mode;
        }
        if mode == CaptureMode::Turbo {
            self.inner.downgraded.store(false, Ordering::Relaxed);
        }
    }

    /// Registers a viewer and returns its private frame channel.
    pub fn subscribe(&self) -> Arc<FrameChannel> {
        self.inner.hub.subscribe()
    }

    pub fn viewer_count(&self) -> usize {
        self.inner.hub.subscriber_count()
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, StreamState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_mode(&self) -> MutexGuard<'_, CaptureMode> {
        self.mode.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn mode(&self) -> CaptureMode {
        *self.lock_mode()
    }

    fn set_state(&self, next: StreamState) {
        *self.lock_state() = next;
    }

    fn publish(&self, frame: Frame) {
        {
            let mut state = self.lock_state();
            if *state == StreamState::Starting {
                info!("{}: first frame received, stream running", self.device_id);
                *state = StreamState::Running;
            }
        }
        self.hub.publish(&frame);
    }

    fn downgrade(&self) {
        let mut mode = self.lock_mode();
        if *mode == CaptureMode::Turbo {
            warn!("{}: downgrading capture mode to compat", self.device_id);
            *mode = CaptureMode::Compat;
        }
        self.downgraded.store(true, Ordering::Relaxed);
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

async fn run_worker(inner: Arc<Inner>) {
    loop {
        if let Err(e) = inner.capture.connect().await {
            debug!("{}: connect attempt failed (continuing): {e}", inner.device_id);
        }

        match inner.mode() {
            CaptureMode::Turbo => match run_turbo(&inner).await {
                TurboExit::Failed(e) => {
                    warn!("{}: turbo capture failed: {e}", inner.device_id);
                    inner.downgrade();
                    inner.set_state(StreamState::Stopped);
                    tokio::time::sleep(inner.settings.restart_delay()).await;
                    inner.set_state(StreamState::Starting);
                }
                TurboExit::ModeChanged => {
                    debug!("{}: leaving turbo on mode request", inner.device_id);
                }
            },
            CaptureMode::Compat => run_compat(&inner).await,
        }
    }
}

async fn run_turbo(inner: &Inner) -> TurboExit {
    let mut stream = match inner.capture.open_video_stream().await {
        Ok(stream) => stream,
        Err(e) => return TurboExit::Failed(e),
    };
    let mut splitter = JpegSplitter::new();

    loop {
        match stream.next().await {
            Some(Ok(chunk)) => {
                splitter.push(&chunk);
                while let Some(image) = splitter.next_image() {
                    inner.publish(Frame::jpeg(image));
                }
            }
            Some(Err(e)) => return TurboExit::Failed(e),
            None => return TurboExit::Failed(DeviceError::StreamEnded),
        }

        if inner.mode() != CaptureMode::Turbo {
            return TurboExit::ModeChanged;
        }
    }
}

/// Runs until the mode leaves Compat.
async fn run_compat(inner: &Inner) {
    let settings = &inner.settings;
    while inner.mode() == CaptureMode::Compat {
        let shot = tokio::time::timeout(settings.compat_timeout(), inner.capture.capture_still()).await;
        match shot {
            Ok(Ok(png)) if !png.is_empty() => {
                inner.publish(Frame::png(png));
                tokio::time::sleep(settings.compat_interval()).await;
            }
            Ok(Ok(_)) => {
                warn!("{}: screenshot was empty, retrying", inner.device_id);
                tokio::time::sleep(settings.compat_backoff()).await;
            }
            Ok(Err(e)) => {
                warn!("{}: screenshot failed, retrying: {e}", inner.device_id);
                tokio::time::sleep(settings.compat_backoff()).await;
            }
            Err(_) => {
                warn!(
                    "{}: screenshot timed out after {:?}, retrying",
                    inner.device_id,
                    settings.compat_timeout()
                );
                tokio::time::sleep(settings.compat_backoff()).await;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures_util::stream;
    use mirror_core::FrameFormat;

    use crate::application::device::ChunkStream;

    /// What one `open_video_stream` call should do.
    enum TurboScript {
        /// Spawning the process pair fails.
        SpawnFails,
        /// Emit these chunks, then end (the transcoder exited).
        ChunksThenEnd(Vec<Vec<u8>>),
        /// Emit these chunks, then stay open forever.
        ChunksThenHang(Vec<Vec<u8>>),
    }

    /// Scripted capture backend that records every call.
    #[derive(Default)]
    struct ScriptedCapture {
        connects: AtomicUsize,
        connect_fails: bool,
        video_opens: AtomicUsize,
        turbo: Mutex<VecDeque<TurboScript>>,
        stills: AtomicUsize,
        /// Number of leading screenshot calls that fail.
        failing_stills: usize,
    }

    impl ScriptedCapture {
        fn with_turbo(scripts: Vec<TurboScript>) -> Self {
            Self {
                turbo: Mutex::new(scripts.into()),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl AndroidCapture for ScriptedCapture {
        async fn connect(&self) -> Result<(), DeviceError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.connect_fails {
                return Err(DeviceError::EmptyOutput {
                    program: "adb".into(),
                });
            }
            Ok(())
        }

        async fn open_video_stream(&self) -> Result<ChunkStream<DeviceError>, DeviceError> {
            self.video_opens.fetch_add(1, Ordering::SeqCst);
            let script = self
                .turbo
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(TurboScript::SpawnFails);
            match script {
                TurboScript::SpawnFails => Err(DeviceError::Spawn {
                    program: "ffmpeg".into(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
                }),
                TurboScript::ChunksThenEnd(chunks) => Ok(Box::pin(stream::iter(
                    chunks.into_iter().map(|c| Ok(Bytes::from(c))),
                ))),
                TurboScript::ChunksThenHang(chunks) => Ok(Box::pin(
                    stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c))))
                        .chain(stream::pending()),
                )),
            }
        }

        async fn capture_still(&self) -> Result<Bytes, DeviceError> {
            let n = self.stills.fetch_add(1, Ordering::SeqCst);
            if n < self.failing_stills {
                return Err(DeviceError::Timeout {
                    program: "adb".into(),
                    timeout: Duration::from_millis(1),
                });
            }
            Ok(Bytes::from_static(b"\x89PNG-still"))
        }
    }

    fn fast_settings() -> CaptureSettings {
        CaptureSettings {
            turbo_read_chunk: 16,
            compat_interval_ms: 5,
            compat_timeout_ms: 500,
            compat_backoff_ms: 5,
            restart_delay_ms: 10,
            drain_timeout_ms: 200,
            drain_restart_delay_ms: 10,
            command_timeout_ms: 500,
            install_timeout_ms: 500,
        }
    }

    fn jpeg(body: &[u8]) -> Vec<u8> {
        let mut v = vec![0xFF, 0xD8];
        v.extend_from_slice(body);
        v.extend_from_slice(&[0xFF, 0xD9]);
        v
    }

    fn pipeline(capture: Arc<ScriptedCapture>, mode: CaptureMode) -> CapturePipeline {
        CapturePipeline::new("test-device", capture, mode, fast_settings())
    }

    #[tokio::test]
    async fn test_turbo_frames_are_published_as_jpeg() {
        // Arrange
        let img = jpeg(&[1, 2, 3]);
        let capture = Arc::new(ScriptedCapture::with_turbo(vec![TurboScript::ChunksThenHang(
            vec![img[..3].to_vec(), img[3..].to_vec()],
        )]));
        let pipeline = pipeline(Arc::clone(&capture), CaptureMode::Turbo);
        let viewer = pipeline.subscribe();

        // Act
        assert!(pipeline.start_stream());
        let frame = viewer.get(Duration::from_secs(2)).await.expect("frame");

        // Assert
        assert_eq!(frame.format(), FrameFormat::Jpeg);
        assert_eq!(frame.data().as_ref(), img.as_slice());
        assert_eq!(pipeline.state(), StreamState::Running);
        pipeline.stop();
    }

    #[tokio::test]
    async fn test_start_while_running_does_not_spawn_second_producer() {
        // Arrange
        let capture = Arc::new(ScriptedCapture::with_turbo(vec![TurboScript::ChunksThenHang(
            vec![jpeg(&[7])],
        )]));
        let pipeline = pipeline(Arc::clone(&capture), CaptureMode::Turbo);
        let viewer = pipeline.subscribe();

        // Act
        assert!(pipeline.start_stream());
        viewer.get(Duration::from_secs(2)).await.expect("frame");
        let second = pipeline.start_stream();
        let third = pipeline.start_stream();
        tokio::time::sleep(Duration::from_millis(30)).await;

        // Assert
        assert!(!second);
        assert!(!third);
        assert_eq!(capture.video_opens.load(Ordering::SeqCst), 1);
        pipeline.stop();
    }

    #[tokio::test]
    async fn test_start_while_starting_is_a_no_op() {
        let capture = Arc::new(ScriptedCapture::with_turbo(vec![TurboScript::ChunksThenHang(
            vec![],
        )]));
        let pipeline = pipeline(Arc::clone(&capture), CaptureMode::Turbo);

        assert!(pipeline.start_stream());
        assert_eq!(pipeline.state(), StreamState::Starting);
        assert!(!pipeline.start_stream());
        pipeline.stop();
    }

    #[tokio::test]
    async fn test_turbo_failure_downgrades_to_compat_and_keeps_streaming() {
        // Arrange: the transcoder emits one image and exits.
        let capture = Arc::new(ScriptedCapture::with_turbo(vec![TurboScript::ChunksThenEnd(
            vec![jpeg(&[1])],
        )]));
        let pipeline = pipeline(Arc::clone(&capture), CaptureMode::Turbo);
        let viewer = pipeline.subscribe();

        // Act
        pipeline.start_stream();
        let mut formats = Vec::new();
        while formats.last() != Some(&FrameFormat::Png) {
            let frame = viewer.get(Duration::from_secs(2)).await.expect("frame");
            formats.push(frame.format());
        }

        // Assert
        assert_eq!(formats.first(), Some(&FrameFormat::Jpeg));
        assert_eq!(pipeline.mode(), CaptureMode::Compat);
        assert!(pipeline.is_downgraded());
        pipeline.stop();
    }

    #[tokio::test]
    async fn test_downgrade_survives_manual_restart() {
        // Arrange: Turbo fails at spawn time.
        let capture = Arc::new(ScriptedCapture::with_turbo(vec![TurboScript::SpawnFails]));
        let pipeline = pipeline(Arc::clone(&capture), CaptureMode::Turbo);
        let viewer = pipeline.subscribe();
        pipeline.start_stream();
        let first = viewer.get(Duration::from_secs(2)).await.expect("frame");
        assert_eq!(first.format(), FrameFormat::Png);

        // Act: stop, then start again manually.
        pipeline.stop();
        assert!(pipeline.start_stream());
        let frame = viewer.get(Duration::from_secs(2)).await.expect("frame");

        // Assert: still Compat, and Turbo was never retried.
        assert_eq!(frame.format(), FrameFormat::Png);
        assert_eq!(pipeline.mode(), CaptureMode::Compat);
        assert_eq!(capture.video_opens.load(Ordering::SeqCst), 1);
        pipeline.stop();
    }

    #[tokio::test]
    async fn test_explicit_turbo_request_upgrades_after_downgrade() {
        // Arrange
        let capture = Arc::new(ScriptedCapture::with_turbo(vec![
            TurboScript::SpawnFails,
            TurboScript::ChunksThenHang(vec![jpeg(&[4, 2])]),
        ]));
        let pipeline = pipeline(Arc::clone(&capture), CaptureMode::Turbo);
        let viewer = pipeline.subscribe();
        pipeline.start_stream();
        viewer.get(Duration::from_secs(2)).await.expect("compat frame");
        assert!(pipeline.is_downgraded());

        // Act
        pipeline.request_mode(CaptureMode::Turbo);
        let mut frame = viewer.get(Duration::from_secs(2)).await.expect("frame");
        while frame.format() != FrameFormat::Jpeg {
            frame = viewer.get(Duration::from_secs(2)).await.expect("frame");
        }

        // Assert
        assert_eq!(pipeline.mode(), CaptureMode::Turbo);
        assert!(!pipeline.is_downgraded());
        assert_eq!(capture.video_opens.load(Ordering::SeqCst), 2);
        pipeline.stop();
    }

    #[tokio::test]
    async fn test_compat_failures_back_off_and_retry_without_escalation() {
        // Arrange: the first three screenshots fail.
        let capture = Arc::new(ScriptedCapture {
            failing_stills: 3,
            ..ScriptedCapture::default()
        });
        let pipeline = pipeline(Arc::clone(&capture), CaptureMode::Compat);
        let viewer = pipeline.subscribe();

        // Act
        pipeline.start_stream();
        let frame = viewer.get(Duration::from_secs(2)).await.expect("frame");

        // Assert
        assert_eq!(frame.format(), FrameFormat::Png);
        assert!(capture.stills.load(Ordering::SeqCst) >= 4);
        assert_eq!(capture.video_opens.load(Ordering::SeqCst), 0);
        assert_eq!(pipeline.mode(), CaptureMode::Compat);
        assert!(!pipeline.is_downgraded());
        pipeline.stop();
    }

    #[tokio::test]
    async fn test_failed_connect_does_not_block_capture() {
        let capture = Arc::new(ScriptedCapture {
            connect_fails: true,
            ..ScriptedCapture::default()
        });
        let pipeline = pipeline(Arc::clone(&capture), CaptureMode::Compat);
        let viewer = pipeline.subscribe();

        pipeline.start_stream();
        let frame = viewer.get(Duration::from_secs(2)).await;

        assert!(frame.is_some());
        assert!(capture.connects.load(Ordering::SeqCst) >= 1);
        pipeline.stop();
    }

    #[tokio::test]
    async fn test_stop_marks_stopped_and_halts_production() {
        // Arrange
        let capture = Arc::new(ScriptedCapture::default());
        let pipeline = pipeline(Arc::clone(&capture), CaptureMode::Compat);
        let viewer = pipeline.subscribe();
        pipeline.start_stream();
        viewer.get(Duration::from_secs(2)).await.expect("frame");

        // Act
        pipeline.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let shots_after_stop = capture.stills.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Assert
        assert_eq!(pipeline.state(), StreamState::Stopped);
        assert!(!pipeline.is_running());
        assert_eq!(capture.stills.load(Ordering::SeqCst), shots_after_stop);
    }

    #[tokio::test]
    async fn test_needs_restart_spares_live_compat_worker() {
        // Arrange
        let capture = Arc::new(ScriptedCapture::default());
        let pipeline = pipeline(Arc::clone(&capture), CaptureMode::Compat);
        assert!(pipeline.needs_restart());

        // Act
        pipeline.start_stream();

        // Assert
        assert!(!pipeline.needs_restart());
        pipeline.stop();
        assert!(pipeline.needs_restart());
    }

    #[tokio::test]
    async fn test_needs_restart_for_live_turbo_worker() {
        let capture = Arc::new(ScriptedCapture::with_turbo(vec![TurboScript::ChunksThenHang(
            vec![],
        )]));
        let pipeline = pipeline(Arc::clone(&capture), CaptureMode::Turbo);

        pipeline.start_stream();

        assert!(pipeline.needs_restart());
        pipeline.stop();
    }

    #[tokio::test]
    async fn test_every_viewer_receives_frames() {
        let capture = Arc::new(ScriptedCapture::default());
        let pipeline = pipeline(Arc::clone(&capture), CaptureMode::Compat);
        let a = pipeline.subscribe();
        let b = pipeline.subscribe();

        pipeline.start_stream();

        assert!(a.get(Duration::from_secs(2)).await.is_some());
        assert!(b.get(Duration::from_secs(2)).await.is_some());
        assert_eq!(pipeline.viewer_count(), 2);
        pipeline.stop();
    }
}
