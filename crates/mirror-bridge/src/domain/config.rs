//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! It is read from an optional TOML file and completed from CLI flags in
//! `main.rs`; every field has a default so a minimal file (or no file at all)
//! yields a working single-device setup.
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:5000"
//!
//! [capture]
//! drain_timeout_ms = 2000
//!
//! [[android]]
//! id = "emulator"
//! address = "127.0.0.1:5555"
//!
//! [[ios]]
//! id = "iphone"
//! udid = "00008101-000000000000001E"
//! ```

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mirror_core::{CaptureMode, DeviceGeometry};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// Two devices share the same identifier.
    #[error("duplicate device id: {0:?}")]
    DuplicateDevice(String),

    /// A device entry has an empty identifier.
    #[error("device id must not be empty")]
    EmptyDeviceId,
}

// ── Schema ────────────────────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub capture: CaptureSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub android: Vec<AndroidDeviceConfig>,
    #[serde(default)]
    pub ios: Vec<IosDeviceConfig>,
}

/// HTTP listener and process-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Address the viewer-facing HTTP server binds to.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    /// `tracing` level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory uploaded packages are staged in before installation.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

/// Timing and sizing knobs for the Android capture pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureSettings {
    /// Size of each read from the transcoder's stdout.
    pub turbo_read_chunk: usize,
    /// Pause between two Compat screenshots.
    pub compat_interval_ms: u64,
    /// Upper bound on one Compat screenshot command.
    pub compat_timeout_ms: u64,
    /// Pause after a failed Compat screenshot.
    pub compat_backoff_ms: u64,
    /// Pause before the pipeline restarts after a producer exit.
    pub restart_delay_ms: u64,
    /// How long a viewer waits for a frame before declaring the producer dead.
    pub drain_timeout_ms: u64,
    /// Pause between a drain timeout and the pipeline restart.
    pub drain_restart_delay_ms: u64,
    /// Upper bound on one-shot adb commands (connect, input).
    pub command_timeout_ms: u64,
    /// Upper bound on a package installation.
    pub install_timeout_ms: u64,
}

/// Timing knobs for the iOS automation session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionSettings {
    /// Timeout of the session negotiation request.
    pub init_timeout_ms: u64,
    /// Timeout of tap and button requests.
    pub gesture_timeout_ms: u64,
    /// Number of session-init attempts made by the background monitor.
    pub retry_attempts: u32,
    /// Pause between two session-init attempts.
    pub retry_interval_ms: u64,
    /// Re-issue the launch command after every N failed attempts.
    pub relaunch_every: u32,
    /// Pause between tunnel launch and the first launch command.
    pub settle_delay_ms: u64,
    /// Pause before reopening the live-image stream after a failure.
    pub proxy_retry_ms: u64,
    /// Upper bound on the live-image response headers and on each body chunk.
    pub stream_read_timeout_ms: u64,
    /// Upper bound on helper commands (stale kill, image mount, app launch).
    pub helper_timeout_ms: u64,
}

/// One Android device reached through adb.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AndroidDeviceConfig {
    pub id: String,
    /// `host:port` passed to `adb connect` and `adb -s`.
    pub address: String,
    #[serde(default = "default_adb")]
    pub adb: String,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
    /// Initial capture mode.
    #[serde(default = "default_mode")]
    pub mode: CaptureMode,
    #[serde(default = "default_android_geometry")]
    pub geometry: DeviceGeometry,
}

/// One iOS device reached through a port-forwarding tunnel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IosDeviceConfig {
    pub id: String,
    /// Target device UDID; `None` lets the helpers pick the only attached device.
    #[serde(default)]
    pub udid: Option<String>,
    /// Base URL of the automation agent, as exposed by the tunnel.
    #[serde(default = "default_automation_url")]
    pub automation_url: String,
    /// URL of the agent's live-image (MJPEG) endpoint.
    #[serde(default = "default_mjpeg_url")]
    pub mjpeg_url: String,
    /// Content type served to viewers of the passed-through live-image stream.
    #[serde(default = "default_mjpeg_content_type")]
    pub mjpeg_content_type: String,
    /// Bundle identifier of the automation runner app.
    #[serde(default = "default_bundle_id")]
    pub bundle_id: String,
    /// `local:device` port pairs forwarded by the tunnel helper.
    #[serde(default = "default_forwards")]
    pub forwards: Vec<PortForward>,
    #[serde(default = "default_tunnel_program")]
    pub tunnel_program: String,
    /// Command (program + args) that mounts the developer disk image.
    #[serde(default = "default_mount_command")]
    pub mount_command: Vec<String>,
    /// Command (program + args) that launches an app; the bundle id is appended.
    #[serde(default = "default_launch_command")]
    pub launch_command: Vec<String>,
    #[serde(default = "default_ios_geometry")]
    pub geometry: DeviceGeometry,
}

/// A forwarded port pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortForward {
    pub local: u16,
    pub device: u16,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5000))
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_upload_dir() -> PathBuf {
    std::env::temp_dir().join("mirror-bridge")
}
fn default_adb() -> String {
    "adb".to_string()
}
fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}
fn default_mode() -> CaptureMode {
    CaptureMode::Turbo
}
fn default_android_geometry() -> DeviceGeometry {
    DeviceGeometry::ANDROID
}
fn default_ios_geometry() -> DeviceGeometry {
    DeviceGeometry::IOS
}
fn default_automation_url() -> String {
    "http://127.0.0.1:8100".to_string()
}
fn default_mjpeg_url() -> String {
    "http://127.0.0.1:9100".to_string()
}
fn default_mjpeg_content_type() -> String {
    "multipart/x-mixed-replace; boundary=--BoundaryString".to_string()
}
fn default_bundle_id() -> String {
    "com.facebook.WebDriverAgentRunner.xctrunner".to_string()
}
fn default_forwards() -> Vec<PortForward> {
    vec![
        PortForward {
            local: 8100,
            device: 8100,
        },
        PortForward {
            local: 9100,
            device: 9100,
        },
    ]
}
fn default_tunnel_program() -> String {
    "iproxy".to_string()
}
fn default_mount_command() -> Vec<String> {
    ["pymobiledevice3", "mounter", "auto-mount"]
        .map(String::from)
        .to_vec()
}
fn default_launch_command() -> Vec<String> {
    ["pymobiledevice3", "developer", "dvt", "launch"]
        .map(String::from)
        .to_vec()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            log_level: default_log_level(),
            upload_dir: default_upload_dir(),
        }
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            turbo_read_chunk: 4096,
            compat_interval_ms: 100,
            compat_timeout_ms: 5000,
            compat_backoff_ms: 1000,
            restart_delay_ms: 1000,
            drain_timeout_ms: 2000,
            drain_restart_delay_ms: 1000,
            command_timeout_ms: 5000,
            install_timeout_ms: 120_000,
        }
    }
}

impl CaptureSettings {
    pub fn compat_interval(&self) -> Duration {
        Duration::from_millis(self.compat_interval_ms)
    }
    pub fn compat_timeout(&self) -> Duration {
        Duration::from_millis(self.compat_timeout_ms)
    }
    pub fn compat_backoff(&self) -> Duration {
        Duration::from_millis(self.compat_backoff_ms)
    }
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
    pub fn drain_restart_delay(&self) -> Duration {
        Duration::from_millis(self.drain_restart_delay_ms)
    }
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
    pub fn install_timeout(&self) -> Duration {
        Duration::from_millis(self.install_timeout_ms)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            init_timeout_ms: 2000,
            gesture_timeout_ms: 1000,
            retry_attempts: 20,
            retry_interval_ms: 1000,
            relaunch_every: 5,
            settle_delay_ms: 3000,
            proxy_retry_ms: 1000,
            stream_read_timeout_ms: 5000,
            helper_timeout_ms: 10_000,
        }
    }
}

impl SessionSettings {
    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }
    pub fn gesture_timeout(&self) -> Duration {
        Duration::from_millis(self.gesture_timeout_ms)
    }
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
    pub fn proxy_retry(&self) -> Duration {
        Duration::from_millis(self.proxy_retry_ms)
    }
    pub fn stream_read_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_read_timeout_ms)
    }
    pub fn helper_timeout(&self) -> Duration {
        Duration::from_millis(self.helper_timeout_ms)
    }
}

impl AndroidDeviceConfig {
    /// An entry with default tooling for the given device address.
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            adb: default_adb(),
            ffmpeg: default_ffmpeg(),
            mode: default_mode(),
            geometry: default_android_geometry(),
        }
    }
}

impl IosDeviceConfig {
    /// An entry with default tooling and ports for the given device.
    pub fn new(id: impl Into<String>, udid: Option<String>) -> Self {
        Self {
            id: id.into(),
            udid,
            automation_url: default_automation_url(),
            mjpeg_url: default_mjpeg_url(),
            mjpeg_content_type: default_mjpeg_content_type(),
            bundle_id: default_bundle_id(),
            forwards: default_forwards(),
            tunnel_program: default_tunnel_program(),
            mount_command: default_mount_command(),
            launch_command: default_launch_command(),
            geometry: default_ios_geometry(),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl BridgeConfig {
    /// Parses and validates TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and the validation
    /// variants described on [`BridgeConfig::validate`].
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let cfg: BridgeConfig = toml::from_str(content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads and validates the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, plus every
    /// error [`BridgeConfig::from_toml_str`] can return.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Checks that device ids are non-empty and unique across both platforms.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyDeviceId`] or [`ConfigError::DuplicateDevice`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        let ids = self
            .android
            .iter()
            .map(|d| d.id.as_str())
            .chain(self.ios.iter().map(|d| d.id.as_str()));
        for id in ids {
            if id.trim().is_empty() {
                return Err(ConfigError::EmptyDeviceId);
            }
            if !seen.insert(id) {
                return Err(ConfigError::DuplicateDevice(id.to_string()));
            }
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
