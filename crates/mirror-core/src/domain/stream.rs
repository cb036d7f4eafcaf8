//! Capture mode and stream state.
//!
//! # Capture modes
//!
//! Android links run one of two producer strategies:
//!
//! - [`CaptureMode::Turbo`] – a continuous encoded video stream transcoded to
//!   JPEG frames.  High throughput, but depends on an external transcoder.
//! - [`CaptureMode::Compat`] – repeated single-shot PNG screenshots.  Slow, but
//!   works wherever the device tooling itself works.
//!
//! A Turbo failure downgrades the link to Compat for the rest of the process
//! lifetime; only an explicit mode request moves it back.
//!
//! # Stream state
//!
//! ```text
//! Stopped ──start──▶ Starting ──first frame──▶ Running
//!    ▲                   │                        │
//!    └────── producer exit / stop ◀───────────────┘
//! ```
//!
//! `Failed` is reported for links whose bootstrap could not complete.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::frame::FrameFormat;

/// Producer strategy for an Android link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    Turbo,
    Compat,
}

impl CaptureMode {
    /// The image format frames are produced in under this mode.
    pub fn frame_format(self) -> FrameFormat {
        match self {
            CaptureMode::Turbo => FrameFormat::Jpeg,
            CaptureMode::Compat => FrameFormat::Png,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CaptureMode::Turbo => "turbo",
            CaptureMode::Compat => "compat",
        }
    }
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a mode name is neither `turbo` nor `compat`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown capture mode: {0:?}")]
pub struct ParseModeError(pub String);

impl FromStr for CaptureMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "turbo" => Ok(CaptureMode::Turbo),
            "compat" => Ok(CaptureMode::Compat),
            other => Err(ParseModeError(other.to_string())),
        }
    }
}

/// Lifecycle state of a device link's producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    Stopped,
    Starting,
    Running,
    Failed,
}

impl StreamState {
    /// `true` while a producer is (or is about to be) active.
    pub fn is_active(self) -> bool {
        matches!(self, StreamState::Starting | StreamState::Running)
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StreamState::Stopped => "stopped",
            StreamState::Starting => "starting",
            StreamState::Running => "running",
            StreamState::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
