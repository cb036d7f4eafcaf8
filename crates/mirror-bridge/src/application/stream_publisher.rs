//! StreamPublisher: turns a device link's frames into a viewer's HTTP body.
//!
//! - Android: each viewer subscribes its own [`FrameChannel`] and receives one
//!   multipart part per frame.  A viewer that sees no frame within the drain
//!   timeout restarts the pipeline when its worker is gone or stuck, which
//!   heals a producer that died silently.  A Compat screenshot still in
//!   progress is waited for instead.
//! - iOS: the agent already emits multipart framing, so its chunks pass
//!   through unchanged.
//!
//! [`FrameChannel`]: crate::application::frame_channel::FrameChannel

use bytes::Bytes;
use futures_util::Stream;
use mirror_core::encode_part;
use tracing::{debug, warn};

use crate::application::capture_pipeline::CapturePipeline;
use crate::application::remote_session::RemoteSessionBridge;

/// Endless multipart body for one Android viewer.
///
/// Starts the pipeline if it is not already running.  The stream ends only
/// when the viewer disconnects and the body is dropped.
pub fn android_stream(pipeline: CapturePipeline) -> impl Stream<Item = Bytes> + Send + 'static {
    let viewer = pipeline.subscribe();
    pipeline.start_stream();
    debug!(
        "{}: viewer attached ({} total)",
        pipeline.device_id(),
        pipeline.viewer_count()
    );

    futures_util::stream::unfold((pipeline, viewer), |(pipeline, viewer)| async move {
        let drain_timeout = pipeline.settings().drain_timeout();
        let restart_delay = pipeline.settings().drain_restart_delay();
        loop {
            match viewer.get(drain_timeout).await {
                Some(frame) => {
                    let part = encode_part(&frame);
                    return Some((part, (pipeline, viewer)));
                }
                None if !pipeline.needs_restart() => {
                    debug!(
                        "{}: no frame within {drain_timeout:?}, screenshot still in progress",
                        pipeline.device_id()
                    );
                }
                None => {
                    warn!(
                        "{}: no frame within {drain_timeout:?}, restarting capture",
                        pipeline.device_id()
                    );
                    pipeline.stop();
                    tokio::time::sleep(restart_delay).await;
                    pipeline.start_stream();
                }
            }
        }
    })
}

/// Endless passthrough body for one iOS viewer.
pub fn ios_stream(bridge: &RemoteSessionBridge) -> impl Stream<Item = Bytes> + Send + 'static {
    debug!("{}: viewer attached to live-image proxy", bridge.device_id());
    bridge.frame_proxy()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
