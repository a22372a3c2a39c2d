use std::{path::PathBuf, sync::Arc};

use zarrs::{
    array::{
        Array, ArraySubset, CodecOptions,
        chunk_cache::{ChunkCache, ChunkCacheDecodedLruSizeLimit},
        convert_from_bytes_slice, transmute_to_bytes_vec,
    },
    filesystem::FilesystemStore,
    group::GroupBuilder,
    storage::{
        ReadableStorage, ReadableStorageTraits, ReadableWritableListableStorage,
        ReadableWritableListableStorageTraits, StorePrefix,
    },
};

use crate::{
    Error, Result,
    camera::SampleType,
    geometry::ArrayGeometry,
    metadata::{AcquisitionAttributes, Compression, array_builder},
    runtime::StorageSettings,
};

#[cfg(feature = "s3")]
mod s3;

/// Name of the array holding the frames, relative to the dataset root group.
pub const FRAMES_ARRAY: &str = "0";

/// A dataset root inside a store.
#[derive(Clone)]
pub struct StorageLocation {
    pub store: ReadableWritableListableStorage,
    /// Path of the root group, e.g. `/` or `/hello-hackathon.zarr`.
    pub group_path: String,
}

impl std::fmt::Debug for StorageLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageLocation")
            .field("group_path", &self.group_path)
            .finish_non_exhaustive()
    }
}

impl StorageLocation {
    /// Dataset rooted at the top of `store`.
    pub fn root(store: ReadableWritableListableStorage) -> Self {
        Self {
            store,
            group_path: "/".to_string(),
        }
    }

    pub fn new(store: ReadableWritableListableStorage, group_path: &str) -> Self {
        let trimmed = group_path.trim_matches('/');
        Self {
            store,
            group_path: format!("/{trimmed}"),
        }
    }

    /// Path of the frames array.
    pub fn array_path(&self) -> String {
        let trimmed = self.group_path.trim_end_matches('/');
        format!("{trimmed}/{FRAMES_ARRAY}")
    }

    fn prefix(&self) -> Result<StorePrefix> {
        let trimmed = self.group_path.trim_matches('/');
        let prefix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("{trimmed}/")
        };
        StorePrefix::new(prefix).map_err(Error::wrap)
    }

    /// Recursively delete everything under the dataset root.
    pub fn remove(&self) -> Result<()> {
        let prefix = self.prefix()?;
        log::info!("removing dataset at {}", self.group_path);
        self.store.erase_prefix(&prefix)?;
        Ok(())
    }
}

/// Resolve the store named by `settings.uri`.
///
/// - `http://` and `https://` URIs name an S3-compatible endpoint, bucket and dataset path,
///   and require both S3 credentials.
/// - `file://` URIs and bare paths name a dataset directory on the local filesystem.
///
/// # Errors
/// Returns [`Error::Configuration`] for unsupported schemes or missing credentials,
/// and propagates store construction errors.
pub fn open_store(settings: &StorageSettings) -> Result<StorageLocation> {
    let uri = settings.uri.trim();
    if uri.is_empty() {
        return Err(Error::configuration("storage uri is empty"));
    }
    if !uri.contains("://") {
        return open_filesystem(PathBuf::from(uri));
    }
    let url = url::Url::parse(uri)?;
    match url.scheme() {
        "file" => {
            let path = url
                .to_file_path()
                .map_err(|()| Error::configuration(format!("invalid file uri {uri}")))?;
            open_filesystem(path)
        }
        "http" | "https" => open_object_store(&url, settings),
        scheme => Err(Error::configuration(format!(
            "unsupported storage uri scheme {scheme:?}"
        ))),
    }
}

fn open_filesystem(path: PathBuf) -> Result<StorageLocation> {
    log::debug!("opening filesystem store at {}", path.display());
    let store = FilesystemStore::new(&path).map_err(Error::wrap)?;
    Ok(StorageLocation::root(Arc::new(store)))
}

#[cfg(feature = "s3")]
fn open_object_store(url: &url::Url, settings: &StorageSettings) -> Result<StorageLocation> {
    let (Some(access_key_id), Some(secret_access_key)) = (
        settings.s3_access_key_id.as_deref(),
        settings.s3_secret_access_key.as_deref(),
    ) else {
        return Err(Error::configuration(format!(
            "object store uri {url} needs an access key id and secret access key"
        )));
    };
    let mut segments = url
        .path_segments()
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty());
    let Some(bucket) = segments.next() else {
        return Err(Error::configuration(format!("no bucket in uri {url}")));
    };
    let group_path = segments.collect::<Vec<_>>().join("/");
    let endpoint = url[..url::Position::BeforePath].to_string();

    log::debug!("opening object store {endpoint}, bucket {bucket}, dataset /{group_path}");
    let store = s3::object_store(&endpoint, bucket, access_key_id, secret_access_key)?;
    Ok(StorageLocation::new(store, &group_path))
}

#[cfg(not(feature = "s3"))]
fn open_object_store(url: &url::Url, _settings: &StorageSettings) -> Result<StorageLocation> {
    Err(Error::configuration(format!(
        "object store uri {url} requires the s3 feature"
    )))
}

/// Store a slab of whole frames of native-endian samples.
fn store_frames<TStorage>(
    array: &Array<TStorage>,
    subset: &ArraySubset,
    sample_type: SampleType,
    data: Vec<u8>,
) -> Result<()>
where
    TStorage: ?Sized + ReadableWritableListableStorageTraits + 'static,
{
    match sample_type {
        SampleType::U8 => array.store_array_subset(subset, data)?,
        SampleType::I8 => {
            array.store_array_subset(subset, convert_from_bytes_slice::<i8>(&data))?;
        }
        SampleType::I16 => {
            array.store_array_subset(subset, convert_from_bytes_slice::<i16>(&data))?;
        }
        SampleType::F32 => {
            array.store_array_subset(subset, convert_from_bytes_slice::<f32>(&data))?;
        }
        SampleType::U16 | SampleType::U10 | SampleType::U12 | SampleType::U14 => {
            array.store_array_subset(subset, convert_from_bytes_slice::<u16>(&data))?;
        }
    }
    Ok(())
}

/// Appends frames to a `[t, y, x]` Zarr array.
///
/// Frames are buffered until a full shard along time is available; each flush grows
/// the time extent, writes the buffered frames and rewrites the array metadata.
pub struct ZarrStreamWriter {
    location: StorageLocation,
    attributes: AcquisitionAttributes,
    compression: Compression,
    /// Frames covered by stored metadata.
    frames_flushed: u64,
    buffer: Vec<u8>,
    buffered_frames: u64,
    finished: bool,
}

impl ZarrStreamWriter {
    /// Create the root group and an empty frames array.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGeometry`] if the acquisition dimensions do not describe the camera,
    /// and propagates store errors.
    pub fn create(
        location: StorageLocation,
        attributes: AcquisitionAttributes,
        compression: Compression,
    ) -> Result<Self> {
        attributes
            .acquisition_dimensions
            .check_camera(&attributes.camera)?;

        GroupBuilder::new()
            .build(location.store.clone(), &location.group_path)?
            .store_metadata()?;

        let writer = Self {
            location,
            attributes,
            compression,
            frames_flushed: 0,
            buffer: Vec::new(),
            buffered_frames: 0,
            finished: false,
        };
        writer.array(0)?.store_metadata()?;
        log::info!(
            "created array {} with dimensions {:?}",
            writer.location.array_path(),
            writer.attributes.acquisition_dimensions.names()
        );
        Ok(writer)
    }

    fn array(&self, frames: u64) -> Result<Array<dyn ReadableWritableListableStorageTraits>> {
        Ok(
            array_builder(&self.attributes, &self.compression, frames)?
                .build(self.location.store.clone(), &self.location.array_path())?,
        )
    }

    fn frame_bytes(&self) -> usize {
        self.attributes.camera.frame_bytes()
    }

    fn frames_per_shard(&self) -> Result<u64> {
        self.attributes.acquisition_dimensions.time().shard_size_px()
    }

    /// Frames appended so far, including buffered ones.
    pub fn frames_written(&self) -> u64 {
        self.frames_flushed + self.buffered_frames
    }

    pub fn location(&self) -> &StorageLocation {
        &self.location
    }

    /// Append one frame of native-endian samples.
    ///
    /// # Errors
    /// Returns an error if the frame has the wrong size, the time axis is bounded and full,
    /// or the writer has been finished.
    pub fn append(&mut self, frame: &[u8]) -> Result<()> {
        if self.finished {
            return Err(Error::runtime("cannot append to a finished stream"));
        }
        if frame.len() != self.frame_bytes() {
            return Err(Error::general(format!(
                "frame has {} bytes, expected {}",
                frame.len(),
                self.frame_bytes()
            )));
        }
        let time = self.attributes.acquisition_dimensions.time();
        if !time.is_unbounded() && self.frames_written() >= time.array_size_px {
            return Err(Error::runtime(format!(
                "time axis {:?} is full at {} frames",
                time.name, time.array_size_px
            )));
        }
        self.buffer.extend_from_slice(frame);
        self.buffered_frames += 1;
        if self.buffered_frames == self.frames_per_shard()? {
            self.flush()?;
        }
        Ok(())
    }

    /// Write buffered frames as one slab along time.
    fn flush(&mut self) -> Result<()> {
        if self.buffered_frames == 0 {
            return Ok(());
        }
        let camera = &self.attributes.camera;
        let total = self.frames_flushed + self.buffered_frames;
        let array = self.array(total)?;
        let subset = ArraySubset::new_with_ranges(&[
            self.frames_flushed..total,
            0..u64::from(camera.height_px()),
            0..u64::from(camera.width_px()),
        ]);
        store_frames(
            &array,
            &subset,
            camera.pixel_type,
            std::mem::take(&mut self.buffer),
        )?;
        array.store_metadata()?;
        log::debug!(
            "flushed {} frames to {} ({} total)",
            self.buffered_frames,
            self.location.array_path(),
            total
        );

        self.frames_flushed = total;
        self.buffered_frames = 0;
        Ok(())
    }

    /// Flush any partial shard and return the number of frames written.
    ///
    /// A partially filled shard can only be written once, so no frames can be
    /// appended afterwards.
    pub fn finish(&mut self) -> Result<u64> {
        if !self.finished {
            self.flush()?;
            self.finished = true;
            log::info!(
                "finished {} with {} frames",
                self.location.array_path(),
                self.frames_flushed
            );
        }
        Ok(self.frames_flushed)
    }
}

/// One frame read back from storage, as native-endian samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub index: u64,
    pub width_px: u32,
    pub height_px: u32,
    pub pixel_type: SampleType,
    pub data: Vec<u8>,
}

impl Frame {
    /// Sample at row `y`, column `x`, as a float.
    pub fn sample(&self, y: u32, x: u32) -> Option<f64> {
        if y >= self.height_px || x >= self.width_px {
            return None;
        }
        let bps = self.pixel_type.bytes_per_sample();
        let offset = (y as usize * self.width_px as usize + x as usize) * bps;
        let b = &self.data[offset..offset + bps];
        let value = match self.pixel_type {
            SampleType::U8 => f64::from(b[0]),
            SampleType::I8 => f64::from(b[0] as i8),
            SampleType::I16 => f64::from(i16::from_ne_bytes([b[0], b[1]])),
            SampleType::F32 => f64::from(f32::from_ne_bytes([b[0], b[1], b[2], b[3]])),
            SampleType::U16 | SampleType::U10 | SampleType::U12 | SampleType::U14 => {
                f64::from(u16::from_ne_bytes([b[0], b[1]]))
            }
        };
        Some(value)
    }

    /// Mean of all samples.
    pub fn mean(&self) -> f64 {
        let n = u64::from(self.width_px) * u64::from(self.height_px);
        if n == 0 {
            return 0.0;
        }
        let mut sum = 0.0;
        for y in 0..self.height_px {
            for x in 0..self.width_px {
                sum += self.sample(y, x).unwrap_or_default();
            }
        }
        sum / n as f64
    }
}

/// Capacity of the decoded chunk cache kept by a [`DatasetReader`], in bytes.
pub const DEFAULT_CACHE_BYTES: u64 = 1 << 28;

/// Read access to a streamed frames array.
///
/// Reads go through a size-limited LRU cache of decoded chunks, so reading
/// consecutive frames of one chunk decodes it once.
pub struct DatasetReader {
    array: Arc<Array<dyn ReadableStorageTraits>>,
    cache: ChunkCacheDecodedLruSizeLimit,
    attributes: AcquisitionAttributes,
}

impl DatasetReader {
    /// Open the frames array at `array_path` with a [`DEFAULT_CACHE_BYTES`] cache.
    ///
    /// # Errors
    /// Returns an error if the array cannot be opened or carries no acquisition attributes.
    pub fn open(storage: ReadableStorage, array_path: &str) -> Result<Self> {
        Self::with_cache_bytes(storage, array_path, DEFAULT_CACHE_BYTES)
    }

    /// Open the frames array at `array_path` with a cache of `cache_bytes`.
    ///
    /// # Errors
    /// Returns an error if the array cannot be opened or carries no acquisition attributes.
    pub fn with_cache_bytes(
        storage: ReadableStorage,
        array_path: &str,
        cache_bytes: u64,
    ) -> Result<Self> {
        let array = Arc::new(Array::open(storage, array_path)?);
        let Some(attributes) = AcquisitionAttributes::from_array(array.as_ref())? else {
            return Err(Error::general(format!(
                "array {array_path} has no acquisition attributes"
            )));
        };
        let cache = ChunkCacheDecodedLruSizeLimit::new(array.clone(), cache_bytes);
        log::debug!("opened {array_path} with a {cache_bytes} byte chunk cache");
        Ok(Self {
            array,
            cache,
            attributes,
        })
    }

    pub fn attributes(&self) -> &AcquisitionAttributes {
        &self.attributes
    }

    pub fn array(&self) -> &Array<dyn ReadableStorageTraits> {
        &self.array
    }

    /// Geometry reported by the array metadata.
    pub fn geometry(&self) -> Result<ArrayGeometry> {
        ArrayGeometry::try_from(self.array.as_ref())
    }

    pub fn frame_count(&self) -> u64 {
        self.array.shape().first().copied().unwrap_or_default()
    }

    /// Number of decoded chunks held in the cache.
    pub fn cached_chunks(&self) -> usize {
        self.cache.len()
    }

    /// Read frame `index`.
    ///
    /// # Errors
    /// Returns an error if `index` is out of range or the frame cannot be decoded.
    pub fn read_frame(&self, index: u64) -> Result<Frame> {
        let count = self.frame_count();
        if index >= count {
            return Err(Error::general(format!(
                "frame {index} out of range for {count} frames"
            )));
        }
        let camera = &self.attributes.camera;
        let (width_px, height_px) = camera.shape;
        let subset = ArraySubset::new_with_ranges(&[
            index..index + 1,
            0..u64::from(height_px),
            0..u64::from(width_px),
        ]);
        let options = CodecOptions::default();
        let cache = &self.cache;
        let data = match camera.pixel_type {
            SampleType::U8 => cache.retrieve_array_subset_elements::<u8>(&subset, &options)?,
            SampleType::I8 => transmute_to_bytes_vec(
                cache.retrieve_array_subset_elements::<i8>(&subset, &options)?,
            ),
            SampleType::I16 => transmute_to_bytes_vec(
                cache.retrieve_array_subset_elements::<i16>(&subset, &options)?,
            ),
            SampleType::F32 => transmute_to_bytes_vec(
                cache.retrieve_array_subset_elements::<f32>(&subset, &options)?,
            ),
            SampleType::U16 | SampleType::U10 | SampleType::U12 | SampleType::U14 => {
                transmute_to_bytes_vec(
                    cache.retrieve_array_subset_elements::<u16>(&subset, &options)?,
                )
            }
        };
        Ok(Frame {
            index,
            width_px,
            height_px,
            pixel_type: camera.pixel_type,
            data,
        })
    }
}
