use std::f64::consts::TAU;

use rand::{Rng, SeedableRng, rngs::StdRng};
use zarrs::storage::ReadableWritableListableStorage;

use super::{
    AcquisitionRuntime, AcquisitionSummary, CameraCapabilities, Capabilities, Properties,
    StorageCapabilities, VIDEO_STREAMS, VideoStream,
};
use crate::{
    Error, Result,
    camera::{CameraSettings, SampleType},
    device::{DeviceIdentifier, DeviceKind, DeviceManager},
    metadata::{AcquisitionAttributes, BloscCompressor, Compression},
    storage::{StorageLocation, ZarrStreamWriter, open_store},
};

const MAX_SHAPE: (u32, u32) = (8192, 8192);

/// Image content produced by a simulated camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedPattern {
    /// Concentric rings drifting outwards from the frame centre.
    RadialSin,
    UniformRandom,
    /// All-zero frames.
    Empty,
}

const CAMERAS: [(&str, SimulatedPattern); 3] = [
    ("simulated: radial sin", SimulatedPattern::RadialSin),
    ("simulated: uniform random", SimulatedPattern::UniformRandom),
    ("simulated: empty", SimulatedPattern::Empty),
];

const STORAGE: [&str; 3] = ["Zarr", "ZarrBlosc1ZstdByteShuffle", "ZarrBlosc1Lz4ByteShuffle"];

fn pattern_for(name: &str) -> Option<SimulatedPattern> {
    CAMERAS.iter().find(|(n, _)| *n == name).map(|(_, p)| *p)
}

fn compression_for(name: &str) -> Option<Compression> {
    let blosc = |compressor| Compression::Blosc {
        compressor,
        level: 1,
        byte_shuffle: true,
    };
    match name {
        "Zarr" => Some(Compression::Raw),
        "ZarrBlosc1ZstdByteShuffle" => Some(blosc(BloscCompressor::Zstd)),
        "ZarrBlosc1Lz4ByteShuffle" => Some(blosc(BloscCompressor::Lz4)),
        _ => None,
    }
}

struct SimulatedCamera {
    pattern: SimulatedPattern,
    settings: CameraSettings,
    frame_id: u64,
    rng: StdRng,
}

impl SimulatedCamera {
    fn new(pattern: SimulatedPattern, settings: CameraSettings) -> Self {
        Self {
            pattern,
            settings,
            frame_id: 0,
            rng: StdRng::seed_from_u64(0),
        }
    }

    fn next_frame(&mut self) -> Vec<u8> {
        let (width, height) = self.settings.shape;
        let sample_type = self.settings.pixel_type;
        let mut frame = Vec::with_capacity(self.settings.frame_bytes());
        let (cx, cy) = (f64::from(width) / 2.0, f64::from(height) / 2.0);
        let period = f64::from(width.max(height)) / 8.0;
        let phase = self.frame_id as f64 * 0.1;
        for y in 0..height {
            for x in 0..width {
                let intensity = match self.pattern {
                    SimulatedPattern::RadialSin => {
                        let r = (f64::from(x) - cx).hypot(f64::from(y) - cy);
                        0.5 + 0.5 * (TAU * r / period - phase).sin()
                    }
                    SimulatedPattern::UniformRandom => self.rng.r#gen::<f64>(),
                    SimulatedPattern::Empty => 0.0,
                };
                sample_type.encode_intensity(intensity, &mut frame);
            }
        }
        self.frame_id += 1;
        frame
    }
}

struct ActiveStream {
    stream: usize,
    camera: SimulatedCamera,
    writer: ZarrStreamWriter,
    budget: Option<u64>,
}

impl ActiveStream {
    fn remaining(&self) -> Option<u64> {
        self.budget
            .map(|budget| budget.saturating_sub(self.writer.frames_written()))
    }

    fn capture(&mut self, frames: u64) -> Result<()> {
        let frames = self.remaining().map_or(frames, |r| r.min(frames));
        for _ in 0..frames {
            let frame = self.camera.next_frame();
            self.writer.append(&frame)?;
        }
        Ok(())
    }
}

/// An in-process runtime backed by simulated cameras and Zarr storage.
///
/// Frames are generated synchronously: [`start`](AcquisitionRuntime::start) captures each
/// stream's whole frame budget before returning, while unbounded streams are driven with
/// [`capture`](SimulatedRuntime::capture).
pub struct SimulatedRuntime {
    devices: DeviceManager,
    properties: Properties,
    storage: Option<ReadableWritableListableStorage>,
    running: Option<Vec<ActiveStream>>,
}

impl Default for SimulatedRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedRuntime {
    pub fn new() -> Self {
        let cameras = CAMERAS
            .iter()
            .map(|(name, _)| DeviceIdentifier::new(DeviceKind::Camera, *name));
        let storage = STORAGE
            .iter()
            .map(|name| DeviceIdentifier::new(DeviceKind::Storage, *name));
        Self {
            devices: DeviceManager::new(cameras.chain(storage)),
            properties: Properties::default(),
            storage: None,
            running: None,
        }
    }

    /// Write to `store` instead of resolving each stream's storage URI.
    ///
    /// Stream 0 is written at the store root, stream `i > 0` under `/stream{i}`.
    #[must_use]
    pub fn with_storage(mut self, store: ReadableWritableListableStorage) -> Self {
        self.storage = Some(store);
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Frames appended on `stream` during the current run.
    pub fn frames_written(&self, stream: usize) -> Option<u64> {
        self.running
            .as_ref()?
            .iter()
            .find(|s| s.stream == stream)
            .map(|s| s.writer.frames_written())
    }

    /// Capture up to `frames` more frames on every running stream.
    ///
    /// Streams with a frame budget stop at their budget.
    ///
    /// # Errors
    /// Returns [`Error::Runtime`] if the runtime is not running, and propagates storage errors.
    pub fn capture(&mut self, frames: u64) -> Result<()> {
        let Some(running) = self.running.as_mut() else {
            return Err(Error::runtime("cannot capture: runtime is not running"));
        };
        for stream in running.iter_mut() {
            stream.capture(frames)?;
        }
        Ok(())
    }

    fn check_device(&self, identifier: &DeviceIdentifier, kind: DeviceKind) -> Result<()> {
        if identifier.kind != kind || !self.devices.contains(identifier) {
            return Err(Error::DeviceNotFound {
                kind,
                pattern: identifier.name.clone(),
            });
        }
        Ok(())
    }

    fn check_stream(&self, stream: &VideoStream) -> Result<()> {
        let camera = &stream.camera;
        if let Some(identifier) = &camera.identifier {
            self.check_device(identifier, DeviceKind::Camera)?;
        }
        let (width, height) = camera.settings.shape;
        if width > MAX_SHAPE.0 || height > MAX_SHAPE.1 {
            return Err(Error::configuration(format!(
                "camera shape {width}x{height} exceeds the maximum {}x{}",
                MAX_SHAPE.0, MAX_SHAPE.1
            )));
        }
        if camera.settings.exposure_time_us < 0.0 {
            return Err(Error::configuration("exposure time must not be negative"));
        }
        if let Some(identifier) = &stream.storage.identifier {
            self.check_device(identifier, DeviceKind::Storage)?;
        }
        if let Some(dimensions) = &stream.storage.settings.acquisition_dimensions
            && width > 0
            && height > 0
        {
            dimensions.check_camera(&camera.settings)?;
        }
        Ok(())
    }

    fn location(&self, index: usize, stream: &VideoStream) -> Result<StorageLocation> {
        match &self.storage {
            Some(store) if index == 0 => Ok(StorageLocation::root(store.clone())),
            Some(store) => Ok(StorageLocation::new(store.clone(), &format!("stream{index}"))),
            None => open_store(&stream.storage.settings),
        }
    }

    fn open_stream(&self, index: usize, stream: &VideoStream) -> Result<ActiveStream> {
        let (Some(camera_id), Some(storage_id)) =
            (&stream.camera.identifier, &stream.storage.identifier)
        else {
            return Err(Error::runtime(format!("stream {index} is not active")));
        };
        let pattern = pattern_for(&camera_id.name).ok_or_else(|| Error::DeviceNotFound {
            kind: DeviceKind::Camera,
            pattern: camera_id.name.clone(),
        })?;
        let compression =
            compression_for(&storage_id.name).ok_or_else(|| Error::DeviceNotFound {
                kind: DeviceKind::Storage,
                pattern: storage_id.name.clone(),
            })?;
        let Some(dimensions) = stream.storage.settings.acquisition_dimensions.clone() else {
            return Err(Error::configuration(format!(
                "stream {index} has no acquisition dimensions"
            )));
        };

        let time = dimensions.time();
        let budget = [stream.max_frame_count, time.array_size_px]
            .into_iter()
            .filter(|&n| n > 0)
            .min();

        let attributes = AcquisitionAttributes {
            camera: stream.camera.settings,
            acquisition_dimensions: dimensions,
            storage_device: storage_id.name.clone(),
        };
        let location = self.location(index, stream)?;
        let writer = ZarrStreamWriter::create(location, attributes, compression)?;
        log::info!(
            "stream {index}: {camera_id} -> {storage_id}, frame budget {}",
            budget.map_or_else(|| "unbounded".to_string(), |b| b.to_string())
        );
        Ok(ActiveStream {
            stream: index,
            camera: SimulatedCamera::new(pattern, stream.camera.settings),
            writer,
            budget,
        })
    }
}

impl AcquisitionRuntime for SimulatedRuntime {
    fn device_manager(&self) -> &DeviceManager {
        &self.devices
    }

    fn get_configuration(&self) -> Properties {
        self.properties.clone()
    }

    fn set_configuration(&mut self, properties: Properties) -> Result<Properties> {
        if self.is_running() {
            return Err(Error::runtime("cannot configure a running runtime"));
        }
        for stream in &properties.video {
            self.check_stream(stream)?;
        }
        log::debug!("applied configuration: {properties:?}");
        self.properties = properties;
        Ok(self.properties.clone())
    }

    fn get_capabilities(&self) -> Capabilities {
        let mut capabilities = Capabilities::default();
        for (caps, stream) in capabilities.video.iter_mut().zip(&self.properties.video) {
            caps.camera = stream.camera.identifier.as_ref().map(|_| CameraCapabilities {
                max_shape: MAX_SHAPE,
                pixel_types: vec![
                    SampleType::U8,
                    SampleType::U16,
                    SampleType::I8,
                    SampleType::I16,
                    SampleType::F32,
                    SampleType::U10,
                    SampleType::U12,
                    SampleType::U14,
                ],
            });
            caps.storage = stream
                .storage
                .identifier
                .as_ref()
                .and_then(|id| compression_for(&id.name))
                .map(|compression| StorageCapabilities {
                    sharding: true,
                    object_store: cfg!(feature = "s3"),
                    compression,
                });
        }
        capabilities
    }

    fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(Error::runtime("runtime is already running"));
        }
        let mut running = Vec::with_capacity(VIDEO_STREAMS);
        for (index, stream) in self.properties.video.iter().enumerate() {
            if stream.is_active() {
                running.push(self.open_stream(index, stream)?);
            }
        }
        if running.is_empty() {
            return Err(Error::runtime("no video stream has a camera and storage selected"));
        }
        log::info!("acquisition started on {} stream(s)", running.len());

        for stream in running.iter_mut() {
            if let Some(remaining) = stream.remaining() {
                stream.capture(remaining)?;
            }
        }
        self.running = Some(running);
        Ok(())
    }

    fn stop(&mut self) -> Result<AcquisitionSummary> {
        let Some(running) = self.running.take() else {
            return Err(Error::runtime("runtime is not running"));
        };
        let mut summary = AcquisitionSummary::default();
        let mut first_error = None;
        for mut stream in running {
            match stream.writer.finish() {
                Ok(frames) => summary.frames_written[stream.stream] = frames,
                Err(e) => {
                    log::error!("stream {} could not be finished: {e}", stream.stream);
                    first_error.get_or_insert(e);
                }
            }
        }
        log::info!("acquisition stopped: {:?} frames", summary.frames_written);
        match first_error {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }
}
