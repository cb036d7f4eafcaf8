//! # mirror-core
//!
//! Shared library for the device mirror bridge containing the frame model,
//! capture-mode and stream-state enums, device geometry, key tables, and the
//! byte-level codecs used on the viewer stream.
//!
//! It has zero dependencies on OS APIs, child processes, or network sockets.
//!
//! # Architecture overview
//!
//! The bridge captures a live view of a remote mobile device (an Android
//! emulator over adb, or a physical iOS device through an automation agent),
//! pushes it to browsers as a `multipart/x-mixed-replace` stream, and relays
//! taps and button presses back to the device.
//!
//! - **`domain`** – Frames, capture modes, stream states, and the fixed
//!   screen geometry used to turn normalized taps into device pixels.
//!
//! - **`keymap`** – Symbolic action names (`"home"`, `"back"`, ...) mapped to
//!   platform key codes.
//!
//! - **`codec`** – Splitting a transcoder's byte stream into JPEG images and
//!   writing multipart parts for the viewer stream.

pub mod codec;
pub mod domain;
pub mod keymap;

pub use codec::jpeg::JpegSplitter;
pub use codec::multipart::{encode_part, BOUNDARY, STREAM_CONTENT_TYPE};
pub use domain::frame::{Frame, FrameFormat};
pub use domain::geometry::{DeviceGeometry, DevicePoint};
pub use domain::stream::{CaptureMode, ParseModeError, StreamState};
pub use keymap::{AndroidKey, IosButton};
