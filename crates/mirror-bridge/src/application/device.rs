//! Device-facing trait seams and their error types.
//!
//! The application layer never spawns processes or opens sockets itself.  It
//! talks to devices through these traits; the infrastructure layer provides
//! the adb, tunnel-helper and automation-agent implementations, and tests
//! provide recording mocks.

use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use mirror_core::{DevicePoint, IosButton};
use thiserror::Error;

/// A never-rewinding sequence of byte chunks read from a device.
pub type ChunkStream<E> = Pin<Box<dyn Stream<Item = Result<Bytes, E>> + Send>>;

/// Failure of an external device tool (adb, transcoder, tunnel helper).
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("{program} exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("{program} produced no output")]
    EmptyOutput { program: String },

    #[error("I/O error on {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("video stream ended")]
    StreamEnded,
}

/// Failure talking to the on-device automation agent.
///
/// Every variant is treated the same by callers: the session is dropped and
/// re-negotiated lazily on next use.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no automation session")]
    NoSession,

    #[error("automation endpoint returned HTTP {0}")]
    Status(u16),

    #[error("automation request failed: {0}")]
    Transport(String),

    #[error("automation request timed out after {0:?}")]
    Timeout(Duration),

    #[error("automation response carried no session id")]
    MissingSessionId,

    #[error("tunnel helper failed: {0}")]
    Tunnel(#[from] DeviceError),
}

// ── Android ───────────────────────────────────────────────────────────────────

/// Frame sources of an Android device.
#[async_trait]
pub trait AndroidCapture: Send + Sync {
    /// Establishes the logical connection to the device.  Best effort.
    async fn connect(&self) -> Result<(), DeviceError>;

    /// Starts the screen-record → transcoder process pair and returns the
    /// transcoder's JPEG output.  Dropping the stream terminates both processes.
    async fn open_video_stream(&self) -> Result<ChunkStream<DeviceError>, DeviceError>;

    /// Captures one full-screen PNG.
    async fn capture_still(&self) -> Result<Bytes, DeviceError>;
}

/// Input injection and package installation on an Android device.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AndroidInput: Send + Sync {
    /// Injects a tap at device pixel coordinates.
    async fn tap(&self, point: DevicePoint) -> Result<(), DeviceError>;

    /// Injects a key event with an Android key code.
    async fn key_event(&self, code: u32) -> Result<(), DeviceError>;

    /// Installs the package at `package`, returning the tool's output.
    async fn install(&self, package: &Path) -> Result<String, DeviceError>;
}

// ── iOS ───────────────────────────────────────────────────────────────────────

/// A running port-forwarding helper.  Dropping the handle terminates it.
pub trait TunnelHandle: Send {
    /// `true` while the helper process is still running.
    fn is_alive(&mut self) -> bool;
}

/// Host-side helper tools for an iOS device.
#[async_trait]
pub trait IosDeviceTools: Send + Sync {
    /// Terminates a tunnel helper left over from a previous run.
    async fn kill_stale_tunnel(&self) -> Result<(), DeviceError>;

    /// Mounts the developer disk image required by the automation agent.
    async fn mount_developer_image(&self) -> Result<(), DeviceError>;

    /// Launches the tunnel helper exposing the agent's ports locally.
    async fn spawn_tunnel(&self) -> Result<Box<dyn TunnelHandle>, DeviceError>;

    /// Launches the automation runner app on the device.
    async fn launch_runner(&self) -> Result<(), DeviceError>;
}

/// The on-device automation agent's HTTP API.
#[async_trait]
pub trait AutomationEndpoint: Send + Sync {
    /// Negotiates a new session and returns its identifier.
    async fn create_session(&self) -> Result<String, SessionError>;

    /// Taps at logical point coordinates within `session_id`.
    async fn tap(&self, session_id: &str, point: DevicePoint) -> Result<(), SessionError>;

    /// Presses a hardware button within `session_id`.
    async fn press_button(&self, session_id: &str, button: IosButton) -> Result<(), SessionError>;

    /// Opens the live-image stream.  Non-200 responses are errors.
    async fn open_frame_stream(&self) -> Result<ChunkStream<SessionError>, SessionError>;
}
