//! mirror-bridge: entry point.
//!
//! Serves live device screens to browsers and relays their taps and button
//! presses back to the devices.
//!
//! # Usage
//!
//! ```text
//! mirror-bridge [OPTIONS]
//!
//! Options:
//!   --config <PATH>            TOML configuration file
//!   --bind <ADDR>              HTTP listen address [default: 0.0.0.0:5000]
//!   --android-address <ADDR>   Add an Android device with id "android"
//!   --ios                      Add an iOS device with id "ios"
//!   --ios-udid <UDID>          Add an iOS device with id "ios" and this UDID
//!   --log-level <LEVEL>        Log level when RUST_LOG is unset [default: info]
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable                  | Flag                |
//! |---------------------------|---------------------|
//! | `MIRROR_CONFIG`           | `--config`          |
//! | `MIRROR_BIND`             | `--bind`            |
//! | `MIRROR_ANDROID_ADDRESS`  | `--android-address` |
//! | `MIRROR_IOS`              | `--ios`             |
//! | `MIRROR_IOS_UDID`         | `--ios-udid`        |
//! | `MIRROR_LOG_LEVEL`        | `--log-level`       |
//!
//! CLI flags take precedence over values in the configuration file.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mirror_bridge::domain::{AndroidDeviceConfig, BridgeConfig, IosDeviceConfig};
use mirror_bridge::infrastructure::{build_registry, run_server};

/// Id given to the device declared with `--android-address`.
const CLI_ANDROID_ID: &str = "android";
/// Id given to the device declared with `--ios` / `--ios-udid`.
const CLI_IOS_ID: &str = "ios";

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Live screen streaming and touch relay for Android emulators and iOS devices.
#[derive(Debug, Parser)]
#[command(
    name = "mirror-bridge",
    about = "Live screen streaming and touch relay for Android emulators and iOS devices",
    version
)]
struct Cli {
    /// TOML configuration file.  Without one, devices come from the flags below.
    #[arg(long, env = "MIRROR_CONFIG")]
    config: Option<PathBuf>,

    /// Address the HTTP server binds to.  Overrides `server.bind`.
    #[arg(long, env = "MIRROR_BIND")]
    bind: Option<SocketAddr>,

    /// `host:port` of an Android device reachable with `adb connect`.
    #[arg(long, env = "MIRROR_ANDROID_ADDRESS")]
    android_address: Option<String>,

    /// Serve the single attached iOS device.
    #[arg(long, env = "MIRROR_IOS")]
    ios: bool,

    /// UDID of the iOS device to serve (implies `--ios`).
    #[arg(long, env = "MIRROR_IOS_UDID")]
    ios_udid: Option<String>,

    /// Log level used when `RUST_LOG` is not set.  Overrides `server.log_level`.
    #[arg(long, env = "MIRROR_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    /// Loads the configuration file (if any) and applies the CLI overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded, or if a CLI device
    /// clashes with a configured device id.
    fn into_bridge_config(self) -> anyhow::Result<BridgeConfig> {
        let mut config = match &self.config {
            Some(path) => BridgeConfig::load(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => BridgeConfig::default(),
        };

        if let Some(bind) = self.bind {
            config.server.bind = bind;
        }
        if let Some(level) = self.log_level {
            config.server.log_level = level;
        }
        if let Some(address) = self.android_address {
            config
                .android
                .push(AndroidDeviceConfig::new(CLI_ANDROID_ID, address));
        }
        if self.ios || self.ios_udid.is_some() {
            config.ios.push(IosDeviceConfig::new(CLI_IOS_ID, self.ios_udid));
        }

        config.validate().context("invalid device configuration")?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.into_bridge_config()?;

    // RUST_LOG wins; otherwise the configured level applies.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    if config.android.is_empty() && config.ios.is_empty() {
        tracing::warn!("no devices configured; use --config, --android-address or --ios");
    }

    let registry = Arc::new(build_registry(&config)?);
    info!(
        "mirror-bridge starting on {} with {} device(s)",
        config.server.bind,
        registry.len()
    );

    // ── Graceful shutdown flag ─────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    let served = run_server(config.server.bind, Arc::clone(&registry), running).await;
    registry.shutdown();
    served?;

    info!("mirror-bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
