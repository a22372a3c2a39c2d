use serde::{Deserialize, Serialize};
use zarrs::array::{DataType, data_type};

/// Pixel sample type produced by a camera.
///
/// The packed high-bit-depth types (`U10`, `U12`, `U14`) are stored in 16-bit containers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleType {
    #[default]
    U8,
    U16,
    I8,
    I16,
    F32,
    U10,
    U12,
    U14,
}

impl SampleType {
    /// Zarr data type used to store samples of this type.
    pub fn data_type(&self) -> DataType {
        match self {
            SampleType::U8 => data_type::uint8(),
            SampleType::U16 | SampleType::U10 | SampleType::U12 | SampleType::U14 => {
                data_type::uint16()
            }
            SampleType::I8 => data_type::int8(),
            SampleType::I16 => data_type::int16(),
            SampleType::F32 => data_type::float32(),
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleType::U8 | SampleType::I8 => 1,
            SampleType::U16
            | SampleType::I16
            | SampleType::U10
            | SampleType::U12
            | SampleType::U14 => 2,
            SampleType::F32 => 4,
        }
    }

    /// Number of significant bits in a sample.
    pub fn bit_depth(&self) -> u32 {
        match self {
            SampleType::U8 | SampleType::I8 => 8,
            SampleType::U10 => 10,
            SampleType::U12 => 12,
            SampleType::U14 => 14,
            SampleType::U16 | SampleType::I16 => 16,
            SampleType::F32 => 32,
        }
    }

    /// Encode an intensity in `0.0..=1.0` as native-endian sample bytes, appending to `out`.
    pub(crate) fn encode_intensity(&self, intensity: f64, out: &mut Vec<u8>) {
        let intensity = intensity.clamp(0.0, 1.0);
        match self {
            SampleType::U8 => out.push((intensity * f64::from(u8::MAX)).round() as u8),
            SampleType::I8 => out.extend_from_slice(
                &((intensity * f64::from(i8::MAX)).round() as i8).to_ne_bytes(),
            ),
            SampleType::I16 => out.extend_from_slice(
                &((intensity * f64::from(i16::MAX)).round() as i16).to_ne_bytes(),
            ),
            SampleType::F32 => out.extend_from_slice(&(intensity as f32).to_ne_bytes()),
            SampleType::U16 | SampleType::U10 | SampleType::U12 | SampleType::U14 => {
                let max = (1u32 << self.bit_depth()) - 1;
                let value = (intensity * f64::from(max)).round() as u16;
                out.extend_from_slice(&value.to_ne_bytes());
            }
        }
    }
}

/// Camera frame geometry and exposure.
///
/// `shape` is `(width_px, height_px)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraSettings {
    pub shape: (u32, u32),
    pub pixel_type: SampleType,
    pub exposure_time_us: f64,
}

impl CameraSettings {
    pub fn new(width_px: u32, height_px: u32, pixel_type: SampleType) -> Self {
        Self {
            shape: (width_px, height_px),
            pixel_type,
            exposure_time_us: 0.0,
        }
    }

    #[must_use]
    pub fn with_exposure_time_us(mut self, exposure_time_us: f64) -> Self {
        self.exposure_time_us = exposure_time_us;
        self
    }

    pub fn width_px(&self) -> u32 {
        self.shape.0
    }

    pub fn height_px(&self) -> u32 {
        self.shape.1
    }

    /// Size in bytes of one frame.
    pub fn frame_bytes(&self) -> usize {
        self.width_px() as usize * self.height_px() as usize * self.pixel_type.bytes_per_sample()
    }
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self::new(0, 0, SampleType::U8)
    }
}
