//! HostIosTools: host-side helper programs for an iOS device.
//!
//! - stale tunnel cleanup: `pkill -f "<tunnel> <local>:"`
//! - developer image: the configured mount command (default
//!   `pymobiledevice3 mounter auto-mount`)
//! - tunnel: `<tunnel> <local>:<device> ... [-u <udid>]`, kept running
//! - runner launch: the configured launch command plus the bundle id

use async_trait::async_trait;
use tokio::process::Child;
use tracing::{debug, info};

use crate::application::device::{DeviceError, IosDeviceTools, TunnelHandle};
use crate::domain::config::{IosDeviceConfig, SessionSettings};
use crate::infrastructure::process::{command, run_with_timeout, spawn, split_command};

#[derive(Debug, Clone)]
pub struct HostIosTools {
    config: IosDeviceConfig,
    timeout: std::time::Duration,
}

/// A running tunnel helper.  Dropping it kills the process.
pub struct TunnelProcess {
    child: Child,
}

impl TunnelHandle for TunnelProcess {
    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

impl HostIosTools {
    pub fn new(config: IosDeviceConfig, settings: &SessionSettings) -> Self {
        Self {
            config,
            timeout: settings.helper_timeout(),
        }
    }

    /// Arguments of the tunnel helper.
    pub fn tunnel_args(&self) -> Vec<String> {
        let mut args: Vec<String> = self
            .config
            .forwards
            .iter()
            .map(|f| format!("{}:{}", f.local, f.device))
            .collect();
        if let Some(udid) = &self.config.udid {
            args.push("-u".to_string());
            args.push(udid.clone());
        }
        args
    }

    /// Full launch command line for the runner app.
    pub fn launch_args(&self) -> Vec<String> {
        let mut parts = self.config.launch_command.clone();
        if let Some(udid) = &self.config.udid {
            parts.push("--udid".to_string());
            parts.push(udid.clone());
        }
        parts.push(self.config.bundle_id.clone());
        parts
    }

    async fn run_configured(&self, parts: &[String]) -> Result<(), DeviceError> {
        let (program, args) = split_command(parts).ok_or_else(|| DeviceError::EmptyOutput {
            program: "<empty command>".to_string(),
        })?;
        run_with_timeout(program, args, self.timeout).await?;
        Ok(())
    }
}

#[async_trait]
impl IosDeviceTools for HostIosTools {
    async fn kill_stale_tunnel(&self) -> Result<(), DeviceError> {
        let Some(first) = self.config.forwards.first() else {
            return Ok(());
        };
        let pattern = format!("{} {}:", self.config.tunnel_program, first.local);
        debug!("killing stale tunnel matching {pattern:?}");
        run_with_timeout("pkill", ["-f", pattern.as_str()], self.timeout).await?;
        Ok(())
    }

    async fn mount_developer_image(&self) -> Result<(), DeviceError> {
        self.run_configured(&self.config.mount_command).await
    }

    async fn spawn_tunnel(&self) -> Result<Box<dyn TunnelHandle>, DeviceError> {
        let program = self.config.tunnel_program.as_str();
        let mut cmd = command(program, self.tunnel_args());
        // Nothing reads the helper's output while it runs.
        cmd.stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());
        let child = spawn(program, &mut cmd)?;
        info!("{program} started (pid {:?})", child.id());
        Ok(Box::new(TunnelProcess { child }))
    }

    async fn launch_runner(&self) -> Result<(), DeviceError> {
        debug!("launching {}", self.config.bundle_id);
        self.run_configured(&self.launch_args()).await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
