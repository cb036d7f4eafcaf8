//! RemoteSessionBridge: tunnel bootstrap, automation-session negotiation and
//! input for one iOS device.
//!
//! # Bootstrap
//!
//! [`RemoteSessionBridge::connect`] runs, in order:
//!
//! 1. best-effort kill of a stale tunnel helper,
//! 2. best-effort mount of the developer disk image,
//! 3. tunnel helper launch (the only fatal step),
//! 4. a background monitor that launches the runner app and retries session
//!    negotiation.  Every `relaunch_every` failures it launches the runner
//!    again, as long as attempts remain.  It stops at the first success and
//!    gives up quietly once `retry_attempts` are spent.
//!
//! # Lazy recovery
//!
//! The session identifier is dropped whenever a gesture fails.  The next
//! gesture negotiates a fresh one before it is sent.  Negotiation is
//! single-flight: concurrent callers wait on `init_gate` and reuse the
//! session the first one created.

use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use mirror_core::{DeviceGeometry, DevicePoint, IosButton, StreamState};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::device::{
    AutomationEndpoint, ChunkStream, DeviceError, IosDeviceTools, SessionError, TunnelHandle,
};
use crate::domain::config::SessionSettings;

/// Handle to one iOS device link.  Cheap to clone.
#[derive(Clone)]
pub struct RemoteSessionBridge {
    inner: Arc<Inner>,
}

struct Inner {
    device_id: String,
    tools: Arc<dyn IosDeviceTools>,
    endpoint: Arc<dyn AutomationEndpoint>,
    geometry: DeviceGeometry,
    settings: SessionSettings,
    session: Mutex<Option<String>>,
    /// Held for the whole of a session negotiation.
    init_gate: tokio::sync::Mutex<()>,
    tunnel: Mutex<Option<Box<dyn TunnelHandle>>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
    state: Mutex<StreamState>,
}

impl RemoteSessionBridge {
    pub fn new(
        device_id: impl Into<String>,
        tools: Arc<dyn IosDeviceTools>,
        endpoint: Arc<dyn AutomationEndpoint>,
        geometry: DeviceGeometry,
        settings: SessionSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                device_id: device_id.into(),
                tools,
                endpoint,
                geometry,
                settings,
                session: Mutex::new(None),
                init_gate: tokio::sync::Mutex::new(()),
                tunnel: Mutex::new(None),
                monitor: Mutex::new(None),
                state: Mutex::new(StreamState::Stopped),
            }),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.inner.device_id
    }

    /// Runs the bootstrap sequence.
    ///
    /// Succeeds as soon as the tunnel helper is running; session negotiation
    /// continues in the background.
    ///
    /// # Errors
    ///
    /// Returns the [`DeviceError`] of a failed tunnel launch.  The link is
    /// then in [`StreamState::Failed`].
    pub async fn connect(&self) -> Result<(), DeviceError> {
        let inner = &self.inner;
        *inner.lock_state() = StreamState::Starting;
        info!("{}: connecting automation bridge", inner.device_id);

        if let Err(e) = inner.tools.kill_stale_tunnel().await {
            debug!("{}: no stale tunnel killed: {e}", inner.device_id);
        }
        if let Err(e) = inner.tools.mount_developer_image().await {
            debug!("{}: developer image mount skipped: {e}", inner.device_id);
        }

        let tunnel = match inner.tools.spawn_tunnel().await {
            Ok(tunnel) => tunnel,
            Err(e) => {
                *inner.lock_state() = StreamState::Failed;
                return Err(e);
            }
        };
        // Replacing the old handle terminates its helper.
        *inner.lock_tunnel() = Some(tunnel);
        *inner.lock_session() = None;

        let monitor = tokio::spawn(run_monitor(Arc::clone(inner)));
        if let Some(previous) = inner.lock_monitor().replace(monitor) {
            previous.abort();
        }

        *inner.lock_state() = StreamState::Running;
        info!("{}: tunnel up, negotiating session in background", inner.device_id);
        Ok(())
    }

    /// Stops the monitor, terminates the tunnel helper and forgets the session.
    pub fn disconnect(&self) {
        let inner = &self.inner;
        if let Some(monitor) = inner.lock_monitor().take() {
            monitor.abort();
        }
        if inner.lock_tunnel().take().is_some() {
            info!("{}: tunnel closed", inner.device_id);
        }
        *inner.lock_session() = None;
        *inner.lock_state() = StreamState::Stopped;
    }

    /// Negotiates a new automation session.
    ///
    /// Every failure leaves the session unset.
    pub async fn init_session(&self) -> Result<String, SessionError> {
        self.inner.init_session().await
    }

    /// Taps at normalized coordinates, returning the logical point that was targeted.
    pub async fn tap(&self, x_ratio: f64, y_ratio: f64) -> Result<DevicePoint, SessionError> {
        let inner = &self.inner;
        let point = inner.geometry.to_device_point(x_ratio, y_ratio);
        let session = inner.ensure_session().await?;
        let sent = tokio::time::timeout(
            inner.settings.gesture_timeout(),
            inner.endpoint.tap(&session, point),
        )
        .await;
        inner.check_gesture(&session, sent)?;
        Ok(point)
    }

    /// Presses the home button.
    pub async fn home_button(&self) -> Result<(), SessionError> {
        let inner = &self.inner;
        let session = inner.ensure_session().await?;
        let sent = tokio::time::timeout(
            inner.settings.gesture_timeout(),
            inner.endpoint.press_button(&session, IosButton::Home),
        )
        .await;
        inner.check_gesture(&session, sent)
    }

    /// Presses the button for a symbolic action.  Unknown names yield `Ok(None)`.
    pub async fn key(&self, action: &str) -> Result<Option<IosButton>, SessionError> {
        match IosButton::from_action(action) {
            Some(IosButton::Home) => {
                self.home_button().await?;
                Ok(Some(IosButton::Home))
            }
            None => {
                debug!("ignoring unknown button action {action:?}");
                Ok(None)
            }
        }
    }

    /// Endless passthrough of the agent's live-image stream.
    ///
    /// Chunks are forwarded unchanged.  A failed request, a non-200 status, a
    /// broken stream or one silent for longer than `stream_read_timeout` is
    /// followed by a `proxy_retry` pause and a new request; the stream itself
    /// never ends.
    pub fn frame_proxy(&self) -> impl Stream<Item = Bytes> + Send + 'static {
        let endpoint = Arc::clone(&self.inner.endpoint);
        let device_id = self.inner.device_id.clone();
        let retry = self.inner.settings.proxy_retry();
        let read_timeout = self.inner.settings.stream_read_timeout();

        futures_util::stream::unfold(None, move |mut current: Option<ChunkStream<SessionError>>| {
            let endpoint = Arc::clone(&endpoint);
            let device_id = device_id.clone();
            async move {
                loop {
                    let next = match current.as_mut() {
                        Some(stream) => match tokio::time::timeout(read_timeout, stream.next()).await {
                            Ok(next) => next,
                            Err(_) => {
                                warn!("{device_id}: live-image stream silent for {read_timeout:?}, reopening");
                                current = None;
                                tokio::time::sleep(retry).await;
                                continue;
                            }
                        },
                        None => match endpoint.open_frame_stream().await {
                            Ok(stream) => {
                                debug!("{device_id}: live-image stream opened");
                                current = Some(stream);
                                continue;
                            }
                            Err(e) => {
                                warn!("{device_id}: live-image stream unavailable: {e}");
                                tokio::time::sleep(retry).await;
                                continue;
                            }
                        },
                    };

                    match next {
                        Some(Ok(chunk)) if chunk.is_empty() => continue,
                        Some(Ok(chunk)) => return Some((chunk, current)),
                        Some(Err(e)) => warn!("{device_id}: live-image stream broke: {e}"),
                        None => warn!("{device_id}: live-image stream ended"),
                    }
                    current = None;
                    tokio::time::sleep(retry).await;
                }
            }
        })
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner.lock_session().clone()
    }

    /// `true` while the tunnel helper process is running.
    pub fn bridge_alive(&self) -> bool {
        self.inner
            .lock_tunnel()
            .as_mut()
            .is_some_and(|tunnel| tunnel.is_alive())
    }

    pub fn state(&self) -> StreamState {
        *self.inner.lock_state()
    }
}

impl Inner {
    fn lock_session(&self) -> MutexGuard<'_, Option<String>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_tunnel(&self) -> MutexGuard<'_, Option<Box<dyn TunnelHandle>>> {
        self.tunnel.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_monitor(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.monitor.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_state(&self) -> MutexGuard<'_, StreamState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Negotiates a fresh session, replacing any held one.
    async fn init_session(&self) -> Result<String, SessionError> {
        let _negotiating = self.init_gate.lock().await;
        self.negotiate().await
    }

    /// Caller must hold `init_gate`.
    async fn negotiate(&self) -> Result<String, SessionError> {
        let timeout = self.settings.init_timeout();
        let result = match tokio::time::timeout(timeout, self.endpoint.create_session()).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Timeout(timeout)),
        };

        let mut session = self.lock_session();
        match result {
            Ok(id) => {
                info!("{}: automation session {id} created", self.device_id);
                *session = Some(id.clone());
                Ok(id)
            }
            Err(e) => {
                *session = None;
                Err(e)
            }
        }
    }

    async fn ensure_session(&self) -> Result<String, SessionError> {
        let held = self.lock_session().clone();
        if let Some(id) = held {
            return Ok(id);
        }

        let _negotiating = self.init_gate.lock().await;
        // Another caller may have finished negotiating while we waited.
        let held = self.lock_session().clone();
        match held {
            Some(id) => Ok(id),
            None => self.negotiate().await,
        }
    }

    /// Maps a gesture outcome, dropping `session` if the gesture failed.
    fn check_gesture(
        &self,
        session: &str,
        sent: Result<Result<(), SessionError>, tokio::time::error::Elapsed>,
    ) -> Result<(), SessionError> {
        let result = match sent {
            Ok(result) => result,
            Err(_) => Err(SessionError::Timeout(self.settings.gesture_timeout())),
        };
        if result.is_err() {
            let mut held = self.lock_session();
            if held.as_deref() == Some(session) {
                debug!("{}: dropping session {session} after failed gesture", self.device_id);
                *held = None;
            }
        }
        result
    }

    async fn launch_runner(&self) {
        if let Err(e) = self.tools.launch_runner().await {
            warn!("{}: runner launch failed: {e}", self.device_id);
        }
    }
}

async fn run_monitor(inner: Arc<Inner>) {
    let settings = inner.settings.clone();
    tokio::time::sleep(settings.settle_delay()).await;
    inner.launch_runner().await;

    let mut failures = 0u32;
    for attempt in 1..=settings.retry_attempts {
        match inner.ensure_session().await {
            Ok(_) => return,
            Err(e) => {
                failures += 1;
                debug!(
                    "{}: session attempt {attempt}/{} failed: {e}",
                    inner.device_id, settings.retry_attempts
                );
            }
        }

        if attempt == settings.retry_attempts {
            break;
        }
        if settings.relaunch_every > 0 && failures % settings.relaunch_every == 0 {
            info!("{}: relaunching runner after {failures} failures", inner.device_id);
            inner.launch_runner().await;
        }
        tokio::time::sleep(settings.retry_interval()).await;
    }

    warn!(
        "{}: no automation session after {} attempts; gestures will retry lazily",
        inner.device_id, settings.retry_attempts
    );
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use futures_util::stream;

    // ── Fakes ─────────────────────────────────────────────────────────────────

    struct FakeTunnel {
        alive: Arc<AtomicBool>,
    }

    impl TunnelHandle for FakeTunnel {
        fn is_alive(&mut self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }
    }

    impl Drop for FakeTunnel {
        fn drop(&mut self) {
            self.alive.store(false, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct FakeTools {
        kills: AtomicUsize,
        mounts: AtomicUsize,
        tunnels: AtomicUsize,
        launches: AtomicUsize,
        helpers_fail: bool,
        tunnel_fails: bool,
        tunnel_alive: Arc<AtomicBool>,
    }

    fn helper_error() -> DeviceError {
        DeviceError::Exit {
            program: "helper".into(),
            status: "exit status: 1".into(),
            stderr: String::new(),
        }
    }

    #[async_trait]
    impl IosDeviceTools for FakeTools {
        async fn kill_stale_tunnel(&self) -> Result<(), DeviceError> {
            self.kills.fetch_add(1, Ordering::SeqCst);
            if self.helpers_fail {
                return Err(helper_error());
            }
            Ok(())
        }

        async fn mount_developer_image(&self) -> Result<(), DeviceError> {
            self.mounts.fetch_add(1, Ordering::SeqCst);
            if self.helpers_fail {
                return Err(helper_error());
            }
            Ok(())
        }

        async fn spawn_tunnel(&self) -> Result<Box<dyn TunnelHandle>, DeviceError> {
            self.tunnels.fetch_add(1, Ordering::SeqCst);
            if self.tunnel_fails {
                return Err(DeviceError::Spawn {
                    program: "iproxy".into(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
                });
            }
            self.tunnel_alive.store(true, Ordering::SeqCst);
            Ok(Box::new(FakeTunnel {
                alive: Arc::clone(&self.tunnel_alive),
            }))
        }

        async fn launch_runner(&self) -> Result<(), DeviceError> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    enum ProxyScript {
        Status(u16),
        /// Chunks, then the stream stays open.
        Chunks(Vec<&'static [u8]>),
    }

    #[derive(Default)]
    struct FakeEndpoint {
        creates: AtomicUsize,
        /// `create_session` succeeds from this 1-based attempt on; 0 = never.
        succeed_from: usize,
        /// How long each `create_session` call takes.
        create_delay: Duration,
        taps: Mutex<Vec<(String, DevicePoint)>>,
        buttons: AtomicUsize,
        gestures_fail: bool,
        proxy: Mutex<VecDeque<ProxyScript>>,
        opens: AtomicUsize,
    }

    #[async_trait]
    impl AutomationEndpoint for FakeEndpoint {
        async fn create_session(&self) -> Result<String, SessionError> {
            let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.create_delay.is_zero() {
                tokio::time::sleep(self.create_delay).await;
            }
            if self.succeed_from != 0 && n >= self.succeed_from {
                Ok(format!("session-{n}"))
            } else {
                Err(SessionError::Status(500))
            }
        }

        async fn tap(&self, session_id: &str, point: DevicePoint) -> Result<(), SessionError> {
            self.taps.lock().unwrap().push((session_id.to_string(), point));
            if self.gestures_fail {
                return Err(SessionError::Status(404));
            }
            Ok(())
        }

        async fn press_button(&self, _session_id: &str, _button: IosButton) -> Result<(), SessionError> {
            self.buttons.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn open_frame_stream(&self) -> Result<ChunkStream<SessionError>, SessionError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let script = self.proxy.lock().unwrap().pop_front();
            match script {
                Some(ProxyScript::Status(code)) => Err(SessionError::Status(code)),
                Some(ProxyScript::Chunks(chunks)) => Ok(Box::pin(
                    stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from_static(c))))
                        .chain(stream::pending()),
                )),
                None => Err(SessionError::Transport("connection refused".into())),
            }
        }
    }

    fn bridge(tools: Arc<FakeTools>, endpoint: Arc<FakeEndpoint>) -> RemoteSessionBridge {
        RemoteSessionBridge::new(
            "iphone",
            tools,
            endpoint,
            DeviceGeometry::IOS,
            SessionSettings::default(),
        )
    }

    /// Lets the monitor run to completion under paused time.
    async fn let_monitor_finish() {
        tokio::time::sleep(Duration::from_secs(120)).await;
    }

    // ── Bootstrap ─────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_session_found_on_seventh_attempt_stops_retrying() {
        // Arrange
        let tools = Arc::new(FakeTools::default());
        let endpoint = Arc::new(FakeEndpoint {
            succeed_from: 7,
            ..FakeEndpoint::default()
        });
        let bridge = bridge(Arc::clone(&tools), Arc::clone(&endpoint));

        // Act
        bridge.connect().await.unwrap();
        let_monitor_finish().await;

        // Assert: one initial launch plus one relaunch after the 5th failure.
        assert_eq!(endpoint.creates.load(Ordering::SeqCst), 7);
        assert_eq!(tools.launches.load(Ordering::SeqCst), 2);
        assert_eq!(bridge.session_id().as_deref(), Some("session-7"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_gives_up_after_all_attempts() {
        // Arrange
        let tools = Arc::new(FakeTools::default());
        let endpoint = Arc::new(FakeEndpoint::default());
        let bridge = bridge(Arc::clone(&tools), Arc::clone(&endpoint));

        // Act
        bridge.connect().await.unwrap();
        let_monitor_finish().await;

        // Assert: relaunches after failures 5, 10 and 15, none after the last.
        assert_eq!(endpoint.creates.load(Ordering::SeqCst), 20);
        assert_eq!(tools.launches.load(Ordering::SeqCst), 4);
        assert_eq!(bridge.session_id(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_waits_for_tunnel_to_settle() {
        let tools = Arc::new(FakeTools::default());
        let endpoint = Arc::new(FakeEndpoint {
            succeed_from: 1,
            ..FakeEndpoint::default()
        });
        let bridge = bridge(Arc::clone(&tools), Arc::clone(&endpoint));

        bridge.connect().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2900)).await;
        assert_eq!(tools.launches.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(tools.launches.load(Ordering::SeqCst), 1);
        assert_eq!(endpoint.creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_helper_failures_before_tunnel_are_ignored() {
        let tools = Arc::new(FakeTools {
            helpers_fail: true,
            ..FakeTools::default()
        });
        let bridge = bridge(Arc::clone(&tools), Arc::new(FakeEndpoint::default()));

        let result = bridge.connect().await;

        assert!(result.is_ok());
        assert_eq!(tools.kills.load(Ordering::SeqCst), 1);
        assert_eq!(tools.mounts.load(Ordering::SeqCst), 1);
        assert_eq!(bridge.state(), StreamState::Running);
        assert!(bridge.bridge_alive());
        bridge.disconnect();
    }

    #[tokio::test(start_paused = true)]
    async fn test_tunnel_failure_is_reported_and_marks_failed() {
        // Arrange
        let tools = Arc::new(FakeTools {
            tunnel_fails: true,
            ..FakeTools::default()
        });
        let endpoint = Arc::new(FakeEndpoint::default());
        let bridge = bridge(Arc::clone(&tools), Arc::clone(&endpoint));

        // Act
        let result = bridge.connect().await;
        let_monitor_finish().await;

        // Assert: no monitor was started.
        assert!(matches!(result, Err(DeviceError::Spawn { .. })));
        assert_eq!(bridge.state(), StreamState::Failed);
        assert_eq!(endpoint.creates.load(Ordering::SeqCst), 0);
        assert!(!bridge.bridge_alive());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_terminates_tunnel_and_monitor() {
        // Arrange
        let tools = Arc::new(FakeTools::default());
        let endpoint = Arc::new(FakeEndpoint::default());
        let bridge = bridge(Arc::clone(&tools), Arc::clone(&endpoint));
        bridge.connect().await.unwrap();

        // Act
        bridge.disconnect();
        let_monitor_finish().await;

        // Assert
        assert!(!bridge.bridge_alive());
        assert!(!tools.tunnel_alive.load(Ordering::SeqCst));
        assert_eq!(endpoint.creates.load(Ordering::SeqCst), 0);
        assert_eq!(bridge.state(), StreamState::Stopped);
    }

    // ── Gestures ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_tap_without_session_initializes_lazily() {
        // Arrange
        let endpoint = Arc::new(FakeEndpoint {
            succeed_from: 1,
            ..FakeEndpoint::default()
        });
        let bridge = bridge(Arc::new(FakeTools::default()), Arc::clone(&endpoint));

        // Act
        let point = bridge.tap(0.5, 0.5).await.unwrap();

        // Assert
        assert_eq!(point, DevicePoint { x: 187, y: 406 });
        assert_eq!(endpoint.creates.load(Ordering::SeqCst), 1);
        let taps = endpoint.taps.lock().unwrap();
        assert_eq!(taps.as_slice(), &[("session-1".to_string(), point)]);
    }

    #[tokio::test]
    async fn test_held_session_is_reused() {
        let endpoint = Arc::new(FakeEndpoint {
            succeed_from: 1,
            ..FakeEndpoint::default()
        });
        let bridge = bridge(Arc::new(FakeTools::default()), Arc::clone(&endpoint));

        bridge.tap(0.1, 0.1).await.unwrap();
        bridge.tap(0.9, 0.9).await.unwrap();
        bridge.home_button().await.unwrap();

        assert_eq!(endpoint.creates.load(Ordering::SeqCst), 1);
        assert_eq!(endpoint.buttons.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_taps_negotiate_one_session() {
        // Arrange: negotiation is slow enough for both taps to find no session.
        let endpoint = Arc::new(FakeEndpoint {
            succeed_from: 1,
            create_delay: Duration::from_millis(500),
            ..FakeEndpoint::default()
        });
        let bridge = bridge(Arc::new(FakeTools::default()), Arc::clone(&endpoint));

        // Act
        let (first, second) = tokio::join!(bridge.tap(0.2, 0.2), bridge.tap(0.8, 0.8));

        // Assert
        assert!(first.is_ok());
        assert!(second.is_ok());
        assert_eq!(endpoint.creates.load(Ordering::SeqCst), 1);
        let taps = endpoint.taps.lock().unwrap();
        assert!(taps.iter().all(|(session, _)| session == "session-1"));
        assert_eq!(taps.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_gesture_invalidates_session() {
        // Arrange
        let endpoint = Arc::new(FakeEndpoint {
            succeed_from: 1,
            gestures_fail: true,
            ..FakeEndpoint::default()
        });
        let bridge = bridge(Arc::new(FakeTools::default()), Arc::clone(&endpoint));

        // Act
        let first = bridge.tap(0.5, 0.5).await;
        let held_after_failure = bridge.session_id();
        let _ = bridge.tap(0.5, 0.5).await;

        // Assert: the second tap had to negotiate a new session.
        assert!(first.is_err());
        assert_eq!(held_after_failure, None);
        assert_eq!(endpoint.creates.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_tap_fails_when_no_session_can_be_created() {
        let endpoint = Arc::new(FakeEndpoint::default());
        let bridge = bridge(Arc::new(FakeTools::default()), Arc::clone(&endpoint));

        let result = bridge.tap(0.5, 0.5).await;

        assert!(matches!(result, Err(SessionError::Status(500))));
        assert!(endpoint.taps.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_button_action_is_ignored() {
        let endpoint = Arc::new(FakeEndpoint::default());
        let bridge = bridge(Arc::new(FakeTools::default()), Arc::clone(&endpoint));

        let pressed = bridge.key("volume_up").await.unwrap();

        assert_eq!(pressed, None);
        assert_eq!(endpoint.creates.load(Ordering::SeqCst), 0);
    }

    // ── Frame proxy ───────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_proxy_retries_after_http_500_and_keeps_going() {
        // Arrange
        let endpoint = Arc::new(FakeEndpoint {
            proxy: Mutex::new(
                vec![
                    ProxyScript::Status(500),
                    ProxyScript::Chunks(vec![b"--BoundaryString\r\n", b"jpegdata"]),
                ]
                .into(),
            ),
            ..FakeEndpoint::default()
        });
        let bridge = bridge(Arc::new(FakeTools::default()), Arc::clone(&endpoint));
        let started = tokio::time::Instant::now();

        // Act
        let proxy = bridge.frame_proxy();
        tokio::pin!(proxy);
        let first = proxy.next().await;
        let second = proxy.next().await;

        // Assert
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert_eq!(first, Some(Bytes::from_static(b"--BoundaryString\r\n")));
        assert_eq!(second, Some(Bytes::from_static(b"jpegdata")));
        assert_eq!(endpoint.opens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_proxy_survives_repeated_transport_failures() {
        // Arrange: three refused connections before the stream comes up.
        let endpoint = Arc::new(FakeEndpoint {
            proxy: Mutex::new(
                vec![
                    ProxyScript::Status(503),
                    ProxyScript::Status(500),
                    ProxyScript::Status(502),
                    ProxyScript::Chunks(vec![b"data"]),
                ]
                .into(),
            ),
            ..FakeEndpoint::default()
        });
        let bridge = bridge(Arc::new(FakeTools::default()), Arc::clone(&endpoint));

        // Act
        let proxy = bridge.frame_proxy();
        tokio::pin!(proxy);
        let chunk = proxy.next().await;

        // Assert
        assert_eq!(chunk, Some(Bytes::from_static(b"data")));
        assert_eq!(endpoint.opens.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_stream_is_reopened_after_read_timeout() {
        // Arrange: each stream yields one chunk and then goes quiet.
        let endpoint = Arc::new(FakeEndpoint {
            proxy: Mutex::new(
                vec![ProxyScript::Chunks(vec![b"first"]), ProxyScript::Chunks(vec![b"second"])].into(),
            ),
            ..FakeEndpoint::default()
        });
        let bridge = bridge(Arc::new(FakeTools::default()), Arc::clone(&endpoint));
        let settings = SessionSettings::default();
        let started = tokio::time::Instant::now();

        // Act
        let proxy = bridge.frame_proxy();
        tokio::pin!(proxy);
        let first = proxy.next().await;
        let second = proxy.next().await;

        // Assert
        assert_eq!(first, Some(Bytes::from_static(b"first")));
        assert_eq!(second, Some(Bytes::from_static(b"second")));
        assert_eq!(endpoint.opens.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= settings.stream_read_timeout() + settings.proxy_retry());
    }
}
