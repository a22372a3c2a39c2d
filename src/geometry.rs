//! Mapping from camera frame geometry to the chunked storage layout, and
//! validation of the layout an acquisition actually produced.

use serde::{Deserialize, Serialize};

use crate::{
    Error, Result,
    camera::CameraSettings,
    dimension::{AcquisitionDimensions, DimensionKind, StorageDimension},
    error::{GeometryMismatch, GeometryQuantity},
};

/// Chunk and shard sizing along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisChunking {
    pub chunk_size_px: u64,
    pub shard_size_chunks: u64,
}

impl AxisChunking {
    pub fn new(chunk_size_px: u64, shard_size_chunks: u64) -> Self {
        Self {
            chunk_size_px,
            shard_size_chunks,
        }
    }
}

/// Caller-supplied chunk and shard sizes for a `[t, y, x]` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkLayout {
    pub t: AxisChunking,
    pub y: AxisChunking,
    pub x: AxisChunking,
}

impl ChunkLayout {
    /// The layout used by the hackathon demo for a 1920x1200 camera:
    /// 64-frame time chunks, and 2x2 spatial chunks of 960x600 grouped into a single shard.
    pub fn hackathon_demo() -> Self {
        Self {
            t: AxisChunking::new(64, 1),
            y: AxisChunking::new(600, 2),
            x: AxisChunking::new(960, 2),
        }
    }
}

/// Derive the storage dimensions for streaming frames of `camera`.
///
/// The result is ordered `[t, y, x]`. `frame_budget` becomes the extent of the
/// time axis; 0 leaves it unbounded.
///
/// # Errors
/// Returns [`Error::InvalidGeometry`] if the camera shape is empty, a chunk or shard size is zero,
/// a spatial chunk is larger than the corresponding camera extent, or one shard would exceed
/// [`MAX_SHARD_BYTES`](crate::dimension::MAX_SHARD_BYTES).
pub fn map_acquisition_dimensions(
    camera: &CameraSettings,
    frame_budget: u64,
    layout: &ChunkLayout,
) -> Result<AcquisitionDimensions> {
    let (width_px, height_px) = camera.shape;
    if width_px == 0 || height_px == 0 {
        return Err(Error::invalid_geometry(format!(
            "camera shape {width_px}x{height_px} must be non-empty"
        )));
    }
    let dimension = |name: &str, kind, size, chunking: &AxisChunking| {
        StorageDimension::new(
            name,
            kind,
            size,
            chunking.chunk_size_px,
            chunking.shard_size_chunks,
        )
    };
    let dimensions = AcquisitionDimensions::new(vec![
        dimension("t", DimensionKind::Time, frame_budget, &layout.t),
        dimension("y", DimensionKind::Space, u64::from(height_px), &layout.y),
        dimension("x", DimensionKind::Space, u64::from(width_px), &layout.x),
    ])?;
    dimensions.check_camera(camera)?;
    Ok(dimensions)
}

/// Number of chunks needed to cover `shape` with chunks of `chunk_shape`.
///
/// # Errors
/// Returns [`Error::InvalidGeometry`] if the shapes have different lengths,
/// a chunk extent is zero, or the count overflows.
pub fn chunk_count(shape: &[u64], chunk_shape: &[u64]) -> Result<u64> {
    if shape.len() != chunk_shape.len() {
        return Err(Error::invalid_geometry(format!(
            "chunk shape {chunk_shape:?} does not match array shape {shape:?}"
        )));
    }
    shape
        .iter()
        .zip(chunk_shape)
        .try_fold(1u64, |count, (&size, &chunk)| {
            if chunk == 0 {
                return Err(Error::invalid_geometry(format!(
                    "chunk shape {chunk_shape:?} has a zero extent"
                )));
            }
            count
                .checked_mul(size.div_ceil(chunk))
                .ok_or_else(|| Error::invalid_geometry("chunk count overflows"))
        })
}

/// Shape, chunk shape and chunk count of a stored array.
///
/// For a sharded array the chunk shape is that of the inner chunks, not the shards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayGeometry {
    pub shape: Vec<u64>,
    pub chunk_shape: Vec<u64>,
    pub chunk_count: u64,
}

impl ArrayGeometry {
    /// Geometry of an array holding `frames_written` frames laid out as `dimensions`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGeometry`] if the chunk count overflows.
    pub fn expected(dimensions: &AcquisitionDimensions, frames_written: u64) -> Result<Self> {
        let shape = dimensions.array_shape(frames_written);
        let chunk_shape = dimensions.chunk_shape();
        let chunk_count = chunk_count(&shape, &chunk_shape)?;
        Ok(Self {
            shape,
            chunk_shape,
            chunk_count,
        })
    }
}

/// Check a stored array's reported geometry against the requested dimensions.
///
/// # Errors
/// Returns [`Error::ShapeMismatch`] for the first of chunk shape, shape or chunk count
/// that differs from what `dimensions` and `frames_written` imply.
pub fn validate_geometry(
    reported: &ArrayGeometry,
    dimensions: &AcquisitionDimensions,
    frames_written: u64,
) -> Result<()> {
    let expected = ArrayGeometry::expected(dimensions, frames_written)?;
    let mismatch = |quantity, expected: &[u64], actual: &[u64]| {
        Error::ShapeMismatch(GeometryMismatch {
            quantity,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        })
    };

    if reported.chunk_shape != expected.chunk_shape {
        return Err(mismatch(
            GeometryQuantity::ChunkShape,
            &expected.chunk_shape,
            &reported.chunk_shape,
        ));
    }
    if reported.shape != expected.shape {
        return Err(mismatch(
            GeometryQuantity::Shape,
            &expected.shape,
            &reported.shape,
        ));
    }
    if reported.chunk_count != expected.chunk_count {
        return Err(mismatch(
            GeometryQuantity::ChunkCount,
            &[expected.chunk_count],
            &[reported.chunk_count],
        ));
    }
    log::debug!(
        "validated geometry: shape {:?}, chunks {:?}, {} chunks",
        reported.shape,
        reported.chunk_shape,
        reported.chunk_count
    );
    Ok(())
}
