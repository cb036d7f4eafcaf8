//! mirror-bridge library: live screen streaming and input relay for Android
//! emulators and iOS devices.
//!
//! Browsers watch a device through an endless multipart HTTP response and
//! drive it with small JSON requests.  Behind each device sits a supervised
//! capture producer (Android) or an automation-agent bridge (iOS).
//!
//! # Layers
//!
//! - [`domain`]: configuration schema and HTTP message types.
//! - [`application`]: frame relay, capture supervision, input, iOS session
//!   handling and the per-device registry.
//! - [`infrastructure`]: adb and helper processes, the agent HTTP client and
//!   the axum server.

pub mod application;
pub mod domain;
pub mod infrastructure;
