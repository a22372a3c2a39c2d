//! The acquisition runtime interface and its configuration object.

mod simulated;

pub use simulated::{SimulatedPattern, SimulatedRuntime};

use serde::{Deserialize, Serialize};

use crate::{
    Result,
    camera::{CameraSettings, SampleType},
    device::{DeviceIdentifier, DeviceManager},
    dimension::AcquisitionDimensions,
    metadata::Compression,
};

/// Number of independent video streams a runtime drives.
pub const VIDEO_STREAMS: usize = 2;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraProperties {
    pub identifier: Option<DeviceIdentifier>,
    pub settings: CameraSettings,
}

/// Where and how a stream's frames are stored.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// `file://` URI, bare filesystem path, or `http(s)://endpoint/bucket/prefix` object-store URI.
    pub uri: String,
    pub s3_access_key_id: Option<String>,
    pub s3_secret_access_key: Option<String>,
    pub acquisition_dimensions: Option<AcquisitionDimensions>,
}

impl std::fmt::Debug for StorageSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageSettings")
            .field("uri", &self.uri)
            .field("s3_access_key_id", &self.s3_access_key_id)
            .field(
                "s3_secret_access_key",
                &self.s3_secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .field("acquisition_dimensions", &self.acquisition_dimensions)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageProperties {
    pub identifier: Option<DeviceIdentifier>,
    pub settings: StorageSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoStream {
    pub camera: CameraProperties,
    pub storage: StorageProperties,
    /// Frames to acquire before stopping; 0 streams until stopped.
    pub max_frame_count: u64,
}

impl VideoStream {
    /// A stream is active once both its camera and storage devices are selected.
    pub fn is_active(&self) -> bool {
        self.camera.identifier.is_some() && self.storage.identifier.is_some()
    }
}

/// Configuration of every video stream of a runtime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Properties {
    pub video: [VideoStream; VIDEO_STREAMS],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraCapabilities {
    /// Largest supported `(width_px, height_px)`.
    pub max_shape: (u32, u32),
    pub pixel_types: Vec<SampleType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageCapabilities {
    pub sharding: bool,
    pub object_store: bool,
    pub compression: Compression,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoCapabilities {
    pub camera: Option<CameraCapabilities>,
    pub storage: Option<StorageCapabilities>,
}

/// Capabilities of the devices currently selected on each stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    pub video: [VideoCapabilities; VIDEO_STREAMS],
}

/// Outcome of an acquisition run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionSummary {
    pub frames_written: [u64; VIDEO_STREAMS],
}

/// A camera/storage acquisition runtime.
///
/// Configuration is read and written as a whole [`Properties`] value; `set_configuration`
/// validates and returns what was actually applied.
pub trait AcquisitionRuntime {
    fn device_manager(&self) -> &DeviceManager;

    fn get_configuration(&self) -> Properties;

    /// # Errors
    /// Returns an error if the configuration is invalid for the selected devices,
    /// or the runtime is running.
    fn set_configuration(&mut self, properties: Properties) -> Result<Properties>;

    fn get_capabilities(&self) -> Capabilities;

    /// Start acquiring on every active stream.
    ///
    /// Blocks until each stream with a frame budget has acquired it.
    ///
    /// # Errors
    /// Returns an error if no stream is active, the runtime is already running,
    /// or storage cannot be opened or written.
    fn start(&mut self) -> Result<()>;

    /// Stop acquiring and finalise storage.
    ///
    /// # Errors
    /// Returns an error if the runtime is not running or storage cannot be finalised.
    fn stop(&mut self) -> Result<AcquisitionSummary>;
}
