//! DeviceLink: input injection and package installation for one Android device.
//!
//! Tap and key calls are best effort.  They return a `Result` so callers and
//! tests can observe failures, but the HTTP layer only logs them: the live
//! frame stream is the feedback channel for whether an input took effect.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use mirror_core::{AndroidKey, DeviceGeometry, DevicePoint};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::device::{AndroidInput, DeviceError};

/// Failure of [`DeviceLink::install_package`].
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("uploaded package is empty")]
    EmptyPackage,

    #[error("failed to stage package at {path}: {source}")]
    Stage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("install rejected: {0}")]
    Rejected(String),
}

/// Input primitives for one Android device link.
#[derive(Clone)]
pub struct DeviceLink {
    input: Arc<dyn AndroidInput>,
    geometry: DeviceGeometry,
    upload_dir: PathBuf,
}

impl DeviceLink {
    pub fn new(input: Arc<dyn AndroidInput>, geometry: DeviceGeometry, upload_dir: PathBuf) -> Self {
        Self {
            input,
            geometry,
            upload_dir,
        }
    }

    pub fn geometry(&self) -> DeviceGeometry {
        self.geometry
    }

    /// Taps at normalized coordinates, returning the device pixel that was targeted.
    pub async fn tap(&self, x_ratio: f64, y_ratio: f64) -> Result<DevicePoint, DeviceError> {
        let point = self.geometry.to_device_point(x_ratio, y_ratio);
        debug!("tap ({x_ratio:.3}, {y_ratio:.3}) -> ({}, {})", point.x, point.y);
        self.input.tap(point).await?;
        Ok(point)
    }

    /// Sends the key event for a symbolic action.
    ///
    /// Unknown action names are ignored and yield `Ok(None)`.
    pub async fn key(&self, action: &str) -> Result<Option<AndroidKey>, DeviceError> {
        let Some(key) = AndroidKey::from_action(action) else {
            debug!("ignoring unknown key action {action:?}");
            return Ok(None);
        };
        self.input.key_event(key.key_code()).await?;
        Ok(Some(key))
    }

    /// Stages `package` in the upload directory and installs it.
    ///
    /// The staged file is removed whatever the outcome.
    pub async fn install_package(&self, package: Bytes) -> Result<String, InstallError> {
        if package.is_empty() {
            return Err(InstallError::EmptyPackage);
        }

        let path = self.upload_dir.join(format!("{}.apk", Uuid::new_v4()));
        stage(&self.upload_dir, &path, &package).await?;
        info!("installing {} byte package from {}", package.len(), path.display());

        let result = self.input.install(&path).await;

        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!("failed to remove staged package {}: {e}", path.display());
        }

        let output = result?;
        if output.contains("Failure") {
            return Err(InstallError::Rejected(output.trim().to_string()));
        }
        Ok(output.trim().to_string())
    }
}

async fn stage(dir: &Path, path: &Path, package: &[u8]) -> Result<(), InstallError> {
    let to_stage_error = |source: std::io::Error| InstallError::Stage {
        path: path.to_path_buf(),
        source,
    };
    tokio::fs::create_dir_all(dir).await.map_err(to_stage_error)?;
    tokio::fs::write(path, package).await.map_err(to_stage_error)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
