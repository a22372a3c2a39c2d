use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    Error, Result,
    camera::{CameraSettings, SampleType},
};

/// Largest decoded size of one shard, in bytes.
///
/// Zarr encodes and decodes a whole grid cell at a time, so every write of a
/// partial shard holds one shard in memory.
pub const MAX_SHARD_BYTES: u64 = 1 << 32;

/// Classification of an array axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DimensionKind {
    Space,
    Time,
    Channel,
}

impl fmt::Display for DimensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DimensionKind::Space => "Space",
            DimensionKind::Time => "Time",
            DimensionKind::Channel => "Channel",
        };
        f.write_str(s)
    }
}

/// One axis of the stored array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDimension {
    pub name: String,
    pub kind: DimensionKind,
    /// Extent of the axis; 0 means unbounded, which only a time axis may be.
    pub array_size_px: u64,
    pub chunk_size_px: u64,
    /// Number of chunks grouped into one shard along this axis.
    pub shard_size_chunks: u64,
}

impl StorageDimension {
    pub fn new(
        name: impl Into<String>,
        kind: DimensionKind,
        array_size_px: u64,
        chunk_size_px: u64,
        shard_size_chunks: u64,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            array_size_px,
            chunk_size_px,
            shard_size_chunks,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.array_size_px == 0
    }

    /// Extent of one shard along this axis, in pixels.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGeometry`] if the extent does not fit in a `u64`.
    pub fn shard_size_px(&self) -> Result<u64> {
        self.chunk_size_px
            .checked_mul(self.shard_size_chunks)
            .ok_or_else(|| {
                Error::invalid_geometry(format!(
                    "dimension {:?}: {} chunks of {} px overflow the shard extent",
                    self.name, self.shard_size_chunks, self.chunk_size_px
                ))
            })
    }

    fn check(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::invalid_geometry("dimension name must not be empty"));
        }
        if self.chunk_size_px == 0 {
            return Err(Error::invalid_geometry(format!(
                "dimension {:?} has zero chunk size",
                self.name
            )));
        }
        if self.shard_size_chunks == 0 {
            return Err(Error::invalid_geometry(format!(
                "dimension {:?} has zero shard size",
                self.name
            )));
        }
        self.shard_size_px()?;
        if self.is_unbounded() && self.kind != DimensionKind::Time {
            return Err(Error::invalid_geometry(format!(
                "{} dimension {:?} cannot be unbounded",
                self.kind, self.name
            )));
        }
        if !self.is_unbounded()
            && self.kind != DimensionKind::Time
            && self.chunk_size_px > self.array_size_px
        {
            return Err(Error::invalid_geometry(format!(
                "dimension {:?} has chunk size {} larger than its extent {}",
                self.name, self.chunk_size_px, self.array_size_px
            )));
        }
        Ok(())
    }
}

/// Ordered storage dimensions, outermost first.
///
/// The order is the axis order of the stored array: the time axis comes first,
/// followed by the remaining axes in decreasing stride order (`y` before `x`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<StorageDimension>", into = "Vec<StorageDimension>")]
pub struct AcquisitionDimensions {
    dimensions: Vec<StorageDimension>,
}

impl AcquisitionDimensions {
    /// Validate and wrap a sequence of dimensions.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGeometry`] unless there is exactly one time dimension,
    /// it is outermost, and every dimension has a positive chunk and shard size.
    pub fn new(dimensions: Vec<StorageDimension>) -> Result<Self> {
        let n_time = dimensions
            .iter()
            .filter(|d| d.kind == DimensionKind::Time)
            .count();
        if n_time != 1 {
            return Err(Error::invalid_geometry(format!(
                "expected exactly one time dimension, found {n_time}"
            )));
        }
        if dimensions[0].kind != DimensionKind::Time {
            return Err(Error::invalid_geometry(
                "time dimension must be the outermost dimension",
            ));
        }
        for (idx, dim) in dimensions.iter().enumerate() {
            dim.check()?;
            if dimensions[..idx].iter().any(|d| d.name == dim.name) {
                return Err(Error::invalid_geometry(format!(
                    "duplicate dimension name {:?}",
                    dim.name
                )));
            }
        }
        Ok(Self { dimensions })
    }

    pub fn as_slice(&self) -> &[StorageDimension] {
        &self.dimensions
    }

    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    pub fn time(&self) -> &StorageDimension {
        &self.dimensions[0]
    }

    pub fn names(&self) -> Vec<&str> {
        self.dimensions.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn chunk_shape(&self) -> Vec<u64> {
        self.dimensions.iter().map(|d| d.chunk_size_px).collect()
    }

    /// # Errors
    /// Returns [`Error::InvalidGeometry`] if a shard extent overflows.
    pub fn shard_shape(&self) -> Result<Vec<u64>> {
        self.dimensions
            .iter()
            .map(StorageDimension::shard_size_px)
            .collect()
    }

    /// Decoded size in bytes of one shard of `sample_type` samples.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGeometry`] if the size does not fit in a `u64`.
    pub fn shard_bytes(&self, sample_type: SampleType) -> Result<u64> {
        self.shard_shape()?
            .into_iter()
            .try_fold(sample_type.bytes_per_sample() as u64, u64::checked_mul)
            .ok_or_else(|| Error::invalid_geometry("shard size in bytes overflows"))
    }

    /// Whether any axis groups more than one chunk per shard.
    pub fn is_sharded(&self) -> bool {
        self.dimensions.iter().any(|d| d.shard_size_chunks > 1)
    }

    /// Array shape once `frames` frames have been written.
    pub fn array_shape(&self, frames: u64) -> Vec<u64> {
        std::iter::once(frames)
            .chain(self.dimensions[1..].iter().map(|d| d.array_size_px))
            .collect()
    }

    /// Check that these dimensions describe frames of `camera`.
    ///
    /// The layout must be exactly `[time, y, x]` with the spatial extents
    /// equal to the camera's height and width, and one shard of the camera's
    /// samples must not exceed [`MAX_SHARD_BYTES`].
    ///
    /// # Errors
    /// Returns [`Error::InvalidGeometry`] if the dimensions do not match the camera.
    pub fn check_camera(&self, camera: &CameraSettings) -> Result<()> {
        let [_, y, x] = self.dimensions.as_slice() else {
            return Err(Error::invalid_geometry(format!(
                "camera frames need 3 dimensions (t, y, x), got {}",
                self.dimensions.len()
            )));
        };
        for (dim, extent, label) in [
            (y, camera.height_px(), "height"),
            (x, camera.width_px(), "width"),
        ] {
            if dim.kind != DimensionKind::Space {
                return Err(Error::invalid_geometry(format!(
                    "dimension {:?} must be a Space dimension, got {}",
                    dim.name, dim.kind
                )));
            }
            if dim.array_size_px != u64::from(extent) {
                return Err(Error::invalid_geometry(format!(
                    "dimension {:?} has extent {}, camera {label} is {extent}",
                    dim.name, dim.array_size_px
                )));
            }
        }
        let shard_bytes = self.shard_bytes(camera.pixel_type)?;
        if shard_bytes > MAX_SHARD_BYTES {
            return Err(Error::invalid_geometry(format!(
                "one shard of {:?} holds {shard_bytes} bytes, more than {MAX_SHARD_BYTES}",
                self.shard_shape()?
            )));
        }
        Ok(())
    }
}

impl TryFrom<Vec<StorageDimension>> for AcquisitionDimensions {
    type Error = Error;

    fn try_from(value: Vec<StorageDimension>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AcquisitionDimensions> for Vec<StorageDimension> {
    fn from(value: AcquisitionDimensions) -> Self {
        value.dimensions
    }
}
