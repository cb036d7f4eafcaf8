//! JSON request and response bodies of the viewer-facing HTTP API.
//!
//! ```json
//! POST /devices/emulator/tap     {"x":0.5,"y":0.25}
//! POST /devices/emulator/key     {"action":"back"}
//! POST /devices/emulator/mode    {"mode":"turbo"}
//! GET  /devices/emulator/status  {"id":"emulator","platform":"android","state":"running","mode":"turbo"}
//! ```

use mirror_core::{CaptureMode, StreamState};
use serde::{Deserialize, Serialize};

/// Device platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
}

/// Normalized tap position, each axis in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TapRequest {
    pub x: f64,
    pub y: f64,
}

/// Symbolic button press, e.g. `"home"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRequest {
    pub action: String,
}

/// Manual capture-mode request for an Android link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeRequest {
    pub mode: CaptureMode,
}

/// Acknowledgement returned by fire-and-forget endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub status: String,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// Success/failure result of install and bridge-connect calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
}

impl OperationResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Entry of `GET /devices`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub id: String,
    pub platform: Platform,
}

/// Body of `GET /devices/:id/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub id: String,
    pub platform: Platform,
    pub state: StreamState,
    /// Current capture mode (Android only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<CaptureMode>,
    /// Automation session identifier (iOS only, when held).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    /// Whether the tunnel helper process is alive (iOS only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge_alive: Option<bool>,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
