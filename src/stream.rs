//! The configure, acquire, validate and clean up sequence for one video stream.

use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::{
    Error, Result,
    camera::{CameraSettings, SampleType},
    config::{DEFAULT_DATASET_ROOT, S3Settings},
    device::DeviceKind,
    dimension::AcquisitionDimensions,
    geometry::{ChunkLayout, map_acquisition_dimensions, validate_geometry},
    runtime::{AcquisitionRuntime, Properties, VideoStream},
    storage::{DatasetReader, StorageLocation},
};

/// Everything needed to configure a stream, apart from where it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamPlan {
    /// Video stream to configure, `0` or `1`.
    pub stream: usize,
    /// Regular expression matched in full against camera names.
    pub camera_pattern: String,
    /// Regular expression matched in full against storage device names.
    pub storage_pattern: String,
    pub camera: CameraSettings,
    pub layout: ChunkLayout,
    /// Frames to acquire; 0 streams until stopped.
    pub frame_budget: u64,
    pub dataset_root: String,
}

impl StreamPlan {
    /// 64 frames of 1920x1200 `u8` from a Blackfly camera, written with plain Zarr storage.
    pub fn hackathon_demo() -> Self {
        Self {
            stream: 0,
            camera_pattern: ".*Blackfly.*".to_string(),
            storage_pattern: "Zarr".to_string(),
            camera: CameraSettings::new(1920, 1200, SampleType::U8).with_exposure_time_us(2e7),
            layout: ChunkLayout::hackathon_demo(),
            frame_budget: 64,
            dataset_root: DEFAULT_DATASET_ROOT.to_string(),
        }
    }

    /// Same plan with a different camera name pattern.
    #[must_use]
    pub fn with_camera_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.camera_pattern = pattern.into();
        self
    }

    #[must_use]
    pub fn with_storage_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.storage_pattern = pattern.into();
        self
    }
}

/// Where a stream's dataset is written.
#[derive(Debug, Clone, Copy)]
pub enum StorageTarget<'a> {
    /// `{endpoint}/{bucket}/{dataset_root}` on an S3-compatible store.
    S3(&'a S3Settings),
    /// `{base}/{dataset_root}`, for a `file://` URI or a local directory.
    Uri(&'a str),
    /// The store the runtime was built with; no URI is recorded.
    Runtime,
}

/// Log every device the runtime exposes.
pub fn list_devices(runtime: &impl AcquisitionRuntime) {
    for device in runtime.device_manager().devices() {
        log::info!("{device}");
    }
}

/// Select the camera and apply the plan's camera settings.
///
/// # Errors
/// Returns [`Error::DeviceNotFound`] if no camera matches, and propagates
/// configuration errors from the runtime.
pub fn configure_camera(runtime: &mut impl AcquisitionRuntime, plan: &StreamPlan) -> Result<()> {
    let identifier = runtime
        .device_manager()
        .select(DeviceKind::Camera, &plan.camera_pattern)?;
    let mut properties = runtime.get_configuration();
    let camera = &mut stream_mut(&mut properties, plan.stream)?.camera;
    camera.identifier = Some(identifier);
    camera.settings = plan.camera;
    runtime.set_configuration(properties)?;
    Ok(())
}

/// Select the storage device, derive the acquisition dimensions from the configured
/// camera and point the stream at `target`.
///
/// # Errors
/// Returns [`Error::DeviceNotFound`] if no storage device matches,
/// [`Error::InvalidGeometry`] if the chunk layout does not fit the camera,
/// and propagates configuration errors from the runtime.
pub fn configure_storage(
    runtime: &mut impl AcquisitionRuntime,
    plan: &StreamPlan,
    target: StorageTarget<'_>,
) -> Result<AcquisitionDimensions> {
    let identifier = runtime
        .device_manager()
        .select(DeviceKind::Storage, &plan.storage_pattern)?;
    let mut properties = runtime.get_configuration();
    let video = stream_mut(&mut properties, plan.stream)?;
    let dimensions =
        map_acquisition_dimensions(&video.camera.settings, plan.frame_budget, &plan.layout)?;

    let storage = &mut video.storage;
    storage.identifier = Some(identifier);
    storage.settings.acquisition_dimensions = Some(dimensions.clone());
    let root = plan.dataset_root.trim_matches('/');
    match target {
        StorageTarget::S3(s3) => {
            storage.settings.uri = s3.dataset_uri(root);
            storage.settings.s3_access_key_id = Some(s3.access_key_id.clone());
            storage.settings.s3_secret_access_key = Some(s3.secret_access_key.clone());
        }
        StorageTarget::Uri(base) => {
            storage.settings.uri = format!("{}/{root}", base.trim_end_matches('/'));
            storage.settings.s3_access_key_id = None;
            storage.settings.s3_secret_access_key = None;
        }
        StorageTarget::Runtime => storage.settings.uri.clear(),
    }
    log::info!(
        "storage for stream {}: {:?} with dimensions {:?}",
        plan.stream,
        storage.settings.uri,
        dimensions.names()
    );
    runtime.set_configuration(properties)?;
    Ok(dimensions)
}

/// Configure camera and storage, then apply the frame budget.
///
/// Returns the configuration the runtime applied.
///
/// # Errors
/// Propagates errors from [`configure_camera`], [`configure_storage`] and the runtime.
pub fn configure_stream(
    runtime: &mut impl AcquisitionRuntime,
    plan: &StreamPlan,
    target: StorageTarget<'_>,
) -> Result<Properties> {
    configure_camera(runtime, plan)?;
    configure_storage(runtime, plan, target)?;
    let mut properties = runtime.get_configuration();
    stream_mut(&mut properties, plan.stream)?.max_frame_count = plan.frame_budget;
    runtime.set_configuration(properties)
}

/// Result of [`acquire_to_store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionReport {
    pub dimensions: AcquisitionDimensions,
    pub frames_written: u64,
    pub uri: String,
}

/// Configure the stream, run the acquisition to its frame budget and stop.
///
/// # Errors
/// Propagates configuration, runtime and storage errors.
pub fn acquire_to_store(
    runtime: &mut impl AcquisitionRuntime,
    plan: &StreamPlan,
    target: StorageTarget<'_>,
) -> Result<AcquisitionReport> {
    let properties = configure_stream(runtime, plan, target)?;
    let video = &properties.video[plan.stream];
    let Some(dimensions) = video.storage.settings.acquisition_dimensions.clone() else {
        return Err(Error::configuration("runtime dropped the acquisition dimensions"));
    };

    runtime.start()?;
    let summary = runtime.stop()?;
    let frames_written = summary.frames_written[plan.stream];
    log::info!(
        "acquired {frames_written} frames to {:?}",
        video.storage.settings.uri
    );
    Ok(AcquisitionReport {
        dimensions,
        frames_written,
        uri: video.storage.settings.uri.clone(),
    })
}

/// Read object-store settings from `figment`, then acquire `plan` into that store.
///
/// The settings are extracted before any device is selected, so a missing
/// `ZARR_S3_*` value leaves the runtime untouched.
///
/// # Errors
/// Returns [`Error::Configuration`] for incomplete settings and propagates
/// errors from [`acquire_to_store`].
pub fn acquire_to_object_store(
    runtime: &mut impl AcquisitionRuntime,
    figment: &Figment,
    plan: &StreamPlan,
) -> Result<(S3Settings, AcquisitionReport)> {
    let settings = S3Settings::from_figment(figment)?;
    list_devices(runtime);
    let report = acquire_to_store(runtime, plan, StorageTarget::S3(&settings))?;
    Ok((settings, report))
}

/// Reopen the frames array at `location` and check its geometry.
///
/// # Errors
/// Returns [`Error::ShapeMismatch`] if the stored geometry is not the one
/// `dimensions` and `frames_written` imply, and propagates storage errors.
pub fn load_and_validate(
    location: &StorageLocation,
    dimensions: &AcquisitionDimensions,
    frames_written: u64,
) -> Result<DatasetReader> {
    let reader = DatasetReader::open(location.store.clone(), &location.array_path())?;
    let geometry = reader.geometry()?;
    log::info!(
        "{}: shape {:?}, chunk shape {:?}, {} chunks",
        location.array_path(),
        geometry.shape,
        geometry.chunk_shape,
        geometry.chunk_count
    );
    validate_geometry(&geometry, dimensions, frames_written)?;
    Ok(reader)
}

/// Delete the dataset at `location`.
///
/// # Errors
/// Propagates storage errors.
pub fn cleanup(location: &StorageLocation) -> Result<()> {
    location.remove()
}

fn stream_mut(properties: &mut Properties, stream: usize) -> Result<&mut VideoStream> {
    let count = properties.video.len();
    properties
        .video
        .get_mut(stream)
        .ok_or_else(|| Error::configuration(format!("stream {stream} out of range 0..{count}")))
}
