//! Domain layer for mirror-bridge.
//!
//! Plain data with no I/O: the configuration schema and the JSON bodies of
//! the HTTP API.  Frame, mode and geometry types live in `mirror-core`.

pub mod config;
pub mod messages;

pub use config::{
    AndroidDeviceConfig, BridgeConfig, CaptureSettings, ConfigError, IosDeviceConfig,
    PortForward, ServerConfig, SessionSettings,
};
pub use messages::{
    Ack, DeviceStatus, DeviceSummary, KeyRequest, ModeRequest, OperationResult, Platform,
    TapRequest,
};
