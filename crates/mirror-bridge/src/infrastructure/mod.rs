//! Infrastructure layer for mirror-bridge.
//!
//! Everything that touches the outside world: child processes (`adb`,
//! `ffmpeg`, tunnel and launch helpers), the automation agent's HTTP API and
//! the viewer-facing HTTP server.
//!
//! [`build_registry`] wires the configured devices to these implementations.

pub mod adb;
pub mod automation;
pub mod http_server;
pub mod ios_tools;
pub mod process;

use std::sync::Arc;

use anyhow::Context;

use crate::application::capture_pipeline::CapturePipeline;
use crate::application::device_link::DeviceLink;
use crate::application::registry::{AndroidController, DeviceLinkHandle, DeviceRegistry, IosController};
use crate::application::remote_session::RemoteSessionBridge;
use crate::domain::config::BridgeConfig;

pub use adb::AdbDevice;
pub use automation::AgentClient;
pub use http_server::{router, run_server, ApiError};
pub use ios_tools::HostIosTools;

/// Creates one controller per configured device.
///
/// # Errors
///
/// Returns an error if a device id is duplicated or an HTTP client cannot be
/// built.
pub fn build_registry(config: &BridgeConfig) -> anyhow::Result<DeviceRegistry> {
    let mut registry = DeviceRegistry::new();

    for device in &config.android {
        let adb = Arc::new(AdbDevice::new(device, config.capture.clone()));
        let pipeline = CapturePipeline::new(
            device.id.clone(),
            Arc::clone(&adb) as _,
            device.mode,
            config.capture.clone(),
        );
        let link = DeviceLink::new(adb, device.geometry, config.server.upload_dir.clone());
        registry.insert(
            device.id.clone(),
            DeviceLinkHandle::Android(AndroidController { pipeline, link }),
        )?;
    }

    for device in &config.ios {
        let tools = Arc::new(HostIosTools::new(device.clone(), &config.session));
        let endpoint = Arc::new(
            AgentClient::new(device, &config.session)
                .with_context(|| format!("failed to build automation client for {}", device.id))?,
        );
        let bridge = RemoteSessionBridge::new(
            device.id.clone(),
            tools,
            endpoint,
            device.geometry,
            config.session.clone(),
        );
        registry.insert(
            device.id.clone(),
            DeviceLinkHandle::Ios(IosController {
                bridge,
                stream_content_type: device.mjpeg_content_type.clone(),
            }),
        )?;
    }

    Ok(registry)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
