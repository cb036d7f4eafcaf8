//! DeviceRegistry: the set of device links served by this process, keyed by id.
//!
//! Built once at startup and then shared read-only.  Each entry owns its
//! controller exclusively; the registry only routes calls to it.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::info;

use crate::application::capture_pipeline::CapturePipeline;
use crate::application::device::DeviceError;
use crate::application::device_link::DeviceLink;
use crate::application::remote_session::RemoteSessionBridge;
use crate::domain::messages::{DeviceStatus, DeviceSummary, Platform};

/// Error type for registry lookups and lifecycle calls.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("device already registered: {0}")]
    DuplicateDevice(String),

    #[error("unknown device: {0}")]
    UnknownDevice(String),

    #[error("device {id} is not an {expected:?} device")]
    WrongPlatform { id: String, expected: Platform },

    #[error("bridge bootstrap failed: {0}")]
    Bootstrap(#[from] DeviceError),
}

/// Everything needed to serve one Android device.
#[derive(Clone)]
pub struct AndroidController {
    pub pipeline: CapturePipeline,
    pub link: DeviceLink,
}

/// Everything needed to serve one iOS device.
#[derive(Clone)]
pub struct IosController {
    pub bridge: RemoteSessionBridge,
    /// Content type of the passed-through live-image stream.
    pub stream_content_type: String,
}

/// One registered device link.
#[derive(Clone)]
pub enum DeviceLinkHandle {
    Android(AndroidController),
    Ios(IosController),
}

impl DeviceLinkHandle {
    pub fn platform(&self) -> Platform {
        match self {
            Self::Android(_) => Platform::Android,
            Self::Ios(_) => Platform::Ios,
        }
    }
}

#[derive(Default)]
pub struct DeviceRegistry {
    links: BTreeMap<String, DeviceLinkHandle>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handle` under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateDevice`] if `id` is taken.
    pub fn insert(&mut self, id: impl Into<String>, handle: DeviceLinkHandle) -> Result<(), RegistryError> {
        let id = id.into();
        if self.links.contains_key(&id) {
            return Err(RegistryError::DuplicateDevice(id));
        }
        info!("registered {:?} device {id}", handle.platform());
        self.links.insert(id, handle);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&DeviceLinkHandle, RegistryError> {
        self.links
            .get(id)
            .ok_or_else(|| RegistryError::UnknownDevice(id.to_string()))
    }

    pub fn android(&self, id: &str) -> Result<&AndroidController, RegistryError> {
        match self.get(id)? {
            DeviceLinkHandle::Android(controller) => Ok(controller),
            DeviceLinkHandle::Ios(_) => Err(RegistryError::WrongPlatform {
                id: id.to_string(),
                expected: Platform::Android,
            }),
        }
    }

    pub fn ios(&self, id: &str) -> Result<&IosController, RegistryError> {
        match self.get(id)? {
            DeviceLinkHandle::Ios(controller) => Ok(controller),
            DeviceLinkHandle::Android(_) => Err(RegistryError::WrongPlatform {
                id: id.to_string(),
                expected: Platform::Ios,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// All registered devices, ordered by id.
    pub fn summaries(&self) -> Vec<DeviceSummary> {
        self.links
            .iter()
            .map(|(id, handle)| DeviceSummary {
                id: id.clone(),
                platform: handle.platform(),
            })
            .collect()
    }

    pub fn status(&self, id: &str) -> Result<DeviceStatus, RegistryError> {
        let status = match self.get(id)? {
            DeviceLinkHandle::Android(c) => DeviceStatus {
                id: id.to_string(),
                platform: Platform::Android,
                state: c.pipeline.state(),
                mode: Some(c.pipeline.mode()),
                session: None,
                bridge_alive: None,
            },
            DeviceLinkHandle::Ios(c) => DeviceStatus {
                id: id.to_string(),
                platform: Platform::Ios,
                state: c.bridge.state(),
                mode: None,
                session: c.bridge.session_id(),
                bridge_alive: Some(c.bridge.bridge_alive()),
            },
        };
        Ok(status)
    }

    /// Starts the device's stream.  Idempotent while it is already active.
    ///
    /// For iOS this runs the bridge bootstrap.  Returns `true` when something
    /// was started.
    pub async fn start_stream(&self, id: &str) -> Result<bool, RegistryError> {
        match self.get(id)? {
            DeviceLinkHandle::Android(c) => Ok(c.pipeline.start_stream()),
            DeviceLinkHandle::Ios(c) => {
                if c.bridge.state().is_active() && c.bridge.bridge_alive() {
                    return Ok(false);
                }
                c.bridge.connect().await?;
                Ok(true)
            }
        }
    }

    /// Stops the device's stream and terminates its helper processes.
    pub fn stop_stream(&self, id: &str) -> Result<(), RegistryError> {
        match self.get(id)? {
            DeviceLinkHandle::Android(c) => c.pipeline.stop(),
            DeviceLinkHandle::Ios(c) => c.bridge.disconnect(),
        }
        Ok(())
    }

    /// Stops every link.
    pub fn shutdown(&self) {
        info!("stopping {} device link(s)", self.links.len());
        for handle in self.links.values() {
            match handle {
                DeviceLinkHandle::Android(c) => c.pipeline.stop(),
                DeviceLinkHandle::Ios(c) => c.bridge.disconnect(),
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
