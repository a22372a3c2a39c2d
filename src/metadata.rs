use std::{num::NonZeroU64, sync::Arc};

use serde::{Deserialize, Serialize};
use zarrs::{
    array::{
        Array, ArrayBuilder, ArrayShardedExt, BytesToBytesCodecTraits, chunk_shape_to_array_shape,
        codec::{
            BloscCodec,
            array_to_bytes::sharding::ShardingCodecBuilder,
        },
    },
    metadata_ext::codec::blosc,
    storage::ReadableStorageTraits,
};

use crate::{
    Error, Result,
    camera::{CameraSettings, SampleType},
    dimension::AcquisitionDimensions,
    geometry::ArrayGeometry,
};

/// Attribute key under which acquisition settings are recorded on the array.
pub const ACQUISITION_ATTRIBUTE: &str = "acquisition";

/// Highest blosc compression level.
pub const MAX_BLOSC_LEVEL: u8 = 9;

/// Blosc compressor backing a compressed storage device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BloscCompressor {
    Zstd,
    Lz4,
}

impl From<BloscCompressor> for blosc::BloscCompressor {
    fn from(value: BloscCompressor) -> Self {
        match value {
            BloscCompressor::Zstd => blosc::BloscCompressor::Zstd,
            BloscCompressor::Lz4 => blosc::BloscCompressor::LZ4,
        }
    }
}

/// Chunk compression applied after the bytes codec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum Compression {
    /// Uncompressed.
    #[default]
    Raw,
    Blosc {
        compressor: BloscCompressor,
        level: u8,
        byte_shuffle: bool,
    },
}

impl Compression {
    /// Bytes-to-bytes codecs applied to every chunk.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] for a blosc level above [`MAX_BLOSC_LEVEL`]
    /// or a compressor the blosc build does not support.
    pub fn codecs(&self, sample_type: SampleType) -> Result<Vec<Arc<dyn BytesToBytesCodecTraits>>> {
        let Compression::Blosc {
            compressor,
            level,
            byte_shuffle,
        } = *self
        else {
            return Ok(Vec::new());
        };
        if level > MAX_BLOSC_LEVEL {
            return Err(Error::configuration(format!(
                "blosc level {level} is above {MAX_BLOSC_LEVEL}"
            )));
        }
        let clevel = blosc::BloscCompressionLevel::try_from(level)
            .map_err(|_| Error::configuration(format!("invalid blosc level {level}")))?;
        let shuffle = if byte_shuffle {
            blosc::BloscShuffleMode::Shuffle
        } else {
            blosc::BloscShuffleMode::NoShuffle
        };
        let codec = BloscCodec::new(
            compressor.into(),
            clevel,
            None,
            shuffle,
            Some(sample_type.bytes_per_sample()),
        )
        .map_err(|e| Error::configuration(format!("blosc {compressor:?}: {e}")))?;
        Ok(vec![Arc::new(codec)])
    }
}

/// Acquisition settings recorded alongside the array data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionAttributes {
    pub camera: CameraSettings,
    pub acquisition_dimensions: AcquisitionDimensions,
    pub storage_device: String,
}

impl AcquisitionAttributes {
    /// Settings recorded on `array`, if any.
    ///
    /// # Errors
    /// Returns an error if the attribute is present but malformed.
    pub fn from_array<TStorage: ?Sized>(array: &Array<TStorage>) -> Result<Option<Self>> {
        array
            .attributes()
            .get(ACQUISITION_ATTRIBUTE)
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .map_err(Error::from)
    }
}

/// Builder for the frames array once `frames` frames have been written.
///
/// The chunk grid is regular with one grid cell per shard. When any axis groups
/// more than one chunk per shard the chunks are wrapped in a sharding codec,
/// otherwise every grid cell is a plain chunk.
///
/// # Errors
/// Returns [`Error::InvalidGeometry`] if the shard shape overflows and
/// [`Error::Configuration`] for unusable compression settings.
pub fn array_builder(
    attributes: &AcquisitionAttributes,
    compression: &Compression,
    frames: u64,
) -> Result<ArrayBuilder> {
    let dimensions = &attributes.acquisition_dimensions;
    let sample_type = attributes.camera.pixel_type;
    let data_type = sample_type.data_type();
    let shape = dimensions.array_shape(frames);
    let grid_shape = if dimensions.is_sharded() {
        dimensions.shard_shape()?
    } else {
        dimensions.chunk_shape()
    };

    let mut builder = match sample_type {
        SampleType::U8 => ArrayBuilder::new(shape, grid_shape, data_type.clone(), 0u8),
        SampleType::I8 => ArrayBuilder::new(shape, grid_shape, data_type.clone(), 0i8),
        SampleType::I16 => ArrayBuilder::new(shape, grid_shape, data_type.clone(), 0i16),
        SampleType::F32 => ArrayBuilder::new(shape, grid_shape, data_type.clone(), 0f32),
        SampleType::U16 | SampleType::U10 | SampleType::U12 | SampleType::U14 => {
            ArrayBuilder::new(shape, grid_shape, data_type.clone(), 0u16)
        }
    };

    let compressors = compression.codecs(sample_type)?;
    if dimensions.is_sharded() {
        let subchunk_shape = dimensions
            .chunk_shape()
            .into_iter()
            .map(|c| {
                NonZeroU64::new(c).ok_or_else(|| Error::invalid_geometry("zero chunk extent"))
            })
            .collect::<Result<Vec<_>>>()?;
        let mut sharding = ShardingCodecBuilder::new(subchunk_shape, &data_type);
        sharding.bytes_to_bytes_codecs(compressors);
        builder.array_to_bytes_codec(Arc::new(sharding.build()));
    } else {
        builder.bytes_to_bytes_codecs(compressors);
    }

    let mut attrs = serde_json::Map::new();
    attrs.insert(
        ACQUISITION_ATTRIBUTE.to_string(),
        serde_json::to_value(attributes)?,
    );
    builder
        .attributes(attrs)
        .dimension_names(Some(dimensions.names()));
    Ok(builder)
}

impl<TStorage: ?Sized> TryFrom<&Array<TStorage>> for ArrayGeometry {
    type Error = crate::Error;

    /// Shape, inner chunk shape and inner chunk count reported by `array`.
    fn try_from(array: &Array<TStorage>) -> Result<Self, Self::Error> {
        let shape = array.shape().to_vec();
        let chunk_shape = match array.subchunk_shape() {
            Some(inner) => inner,
            None => array.chunk_shape(&vec![0; shape.len()])?,
        };
        Ok(Self {
            chunk_count: array.subchunk_grid_shape().iter().product(),
            chunk_shape: chunk_shape_to_array_shape(&chunk_shape),
            shape,
        })
    }
}

/// Read the geometry reported by the array stored at `array_path`.
///
/// # Errors
/// Returns an error if no array can be opened at `array_path`.
pub fn read_array_geometry<TStorage: ?Sized + ReadableStorageTraits + 'static>(
    storage: Arc<TStorage>,
    array_path: &str,
) -> Result<ArrayGeometry> {
    ArrayGeometry::try_from(&Array::open(storage, array_path)?)
}

/// Read the acquisition settings recorded on the array at `array_path`, if any.
///
/// # Errors
/// Returns an error if no array can be opened at `array_path` or the attribute is malformed.
pub fn read_acquisition_attributes<TStorage: ?Sized + ReadableStorageTraits + 'static>(
    storage: Arc<TStorage>,
    array_path: &str,
) -> Result<Option<AcquisitionAttributes>> {
    AcquisitionAttributes::from_array(&Array::open(storage, array_path)?)
}
