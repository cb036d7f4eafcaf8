//! Application layer for mirror-bridge.
//!
//! Device-independent orchestration: frame relay, capture supervision, input
//! primitives, iOS session management and the per-device registry.  All
//! device access goes through the traits in [`device`].

pub mod capture_pipeline;
pub mod device;
pub mod device_link;
pub mod frame_channel;
pub mod registry;
pub mod remote_session;
pub mod stream_publisher;

pub use capture_pipeline::CapturePipeline;
pub use device::{
    AndroidCapture, AndroidInput, AutomationEndpoint, ChunkStream, DeviceError, IosDeviceTools,
    SessionError, TunnelHandle,
};
pub use device_link::{DeviceLink, InstallError};
pub use frame_channel::{FrameChannel, FrameHub, FRAME_CHANNEL_SLOTS};
pub use registry::{AndroidController, DeviceLinkHandle, DeviceRegistry, IosController, RegistryError};
pub use remote_session::RemoteSessionBridge;
pub use stream_publisher::{android_stream, ios_stream};
