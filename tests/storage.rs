use std::sync::Arc;

use zarrs::storage::store::MemoryStore;
use zarrs_acquire::{
    Error,
    camera::{CameraSettings, SampleType},
    dimension::AcquisitionDimensions,
    geometry::{ArrayGeometry, AxisChunking, ChunkLayout, map_acquisition_dimensions},
    metadata::{
        AcquisitionAttributes, BloscCompressor, Compression, array_builder,
        read_acquisition_attributes, read_array_geometry,
    },
    storage::{DatasetReader, StorageLocation, ZarrStreamWriter},
};

fn init() {
    env_logger::try_init().ok();
}

/// 13x10 frames, chunks of 2x3x5, shards of 2 chunks along t and y.
fn ragged_layout() -> ChunkLayout {
    ChunkLayout {
        t: AxisChunking::new(2, 2),
        y: AxisChunking::new(3, 2),
        x: AxisChunking::new(5, 1),
    }
}

fn attributes(camera: CameraSettings, dims: AcquisitionDimensions) -> AcquisitionAttributes {
    AcquisitionAttributes {
        camera,
        acquisition_dimensions: dims,
        storage_device: "Zarr".to_string(),
    }
}

fn expected_u16(frame: u64, y: u32, x: u32) -> u16 {
    (frame * 1000 + u64::from(y) * 13 + u64::from(x)) as u16
}

fn frame_u16(camera: &CameraSettings, frame: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(camera.frame_bytes());
    for y in 0..camera.height_px() {
        for x in 0..camera.width_px() {
            out.extend_from_slice(&expected_u16(frame, y, x).to_ne_bytes());
        }
    }
    out
}

fn write_frames(
    store: &Arc<MemoryStore>,
    camera: CameraSettings,
    dims: &AcquisitionDimensions,
    compression: Compression,
    frames: u64,
) -> u64 {
    let mut writer = ZarrStreamWriter::create(
        StorageLocation::root(store.clone()),
        attributes(camera, dims.clone()),
        compression,
    )
    .expect("create writer");
    for f in 0..frames {
        writer.append(&frame_u16(&camera, f)).expect("append frame");
    }
    writer.finish().expect("finish")
}

fn check_frames(store: &Arc<MemoryStore>, camera: &CameraSettings, frames: u64) {
    let reader = DatasetReader::open(store.clone(), "/0").expect("open dataset");
    assert_eq!(reader.frame_count(), frames);
    for f in 0..frames {
        let frame = reader.read_frame(f).expect("read frame");
        assert_eq!(frame.index, f);
        for y in 0..camera.height_px() {
            for x in 0..camera.width_px() {
                assert_eq!(
                    frame.sample(y, x),
                    Some(f64::from(expected_u16(f, y, x))),
                    "frame {f} at ({y}, {x})"
                );
            }
        }
    }
}

#[test]
fn test_ragged_sharded_roundtrip() {
    init();
    let store = Arc::new(MemoryStore::new());
    let camera = CameraSettings::new(13, 10, SampleType::U16);
    let dims = map_acquisition_dimensions(&camera, 0, &ragged_layout()).expect("valid");

    let written = write_frames(&store, camera, &dims, Compression::Raw, 7);
    assert_eq!(written, 7);
    check_frames(&store, &camera, 7);

    let geometry = read_array_geometry(store.clone(), "/0").expect("read geometry");
    assert_eq!(geometry.shape, vec![7, 10, 13]);
    assert_eq!(geometry.chunk_shape, vec![2, 3, 5]);
    assert_eq!(geometry.chunk_count, 4 * 4 * 3);
    assert_eq!(
        geometry,
        ArrayGeometry::expected(&dims, 7).expect("expected geometry")
    );
}

#[test]
fn test_unsharded_blosc_roundtrip() {
    init();
    let store = Arc::new(MemoryStore::new());
    let camera = CameraSettings::new(13, 10, SampleType::U16);
    let layout = ChunkLayout {
        t: AxisChunking::new(3, 1),
        y: AxisChunking::new(4, 1),
        x: AxisChunking::new(13, 1),
    };
    let dims = map_acquisition_dimensions(&camera, 5, &layout).expect("valid");
    assert!(!dims.is_sharded());

    let compression = Compression::Blosc {
        compressor: BloscCompressor::Zstd,
        level: 1,
        byte_shuffle: true,
    };
    assert_eq!(write_frames(&store, camera, &dims, compression, 5), 5);
    check_frames(&store, &camera, 5);

    let reader = DatasetReader::open(store.clone(), "/0").expect("open dataset");
    assert_eq!(
        reader.geometry().expect("geometry"),
        ArrayGeometry::expected(&dims, 5).expect("expected geometry")
    );
}

#[test]
fn test_attributes_are_stored() {
    let store = Arc::new(MemoryStore::new());
    let camera = CameraSettings::new(13, 10, SampleType::U16).with_exposure_time_us(150.0);
    let dims = map_acquisition_dimensions(&camera, 0, &ragged_layout()).expect("valid");
    write_frames(&store, camera, &dims, Compression::Raw, 2);

    let stored = read_acquisition_attributes(store.clone(), "/0")
        .expect("read metadata")
        .expect("attributes present");
    assert_eq!(stored, attributes(camera, dims));

    let reader = DatasetReader::open(store.clone(), "/0").expect("open dataset");
    assert_eq!(reader.attributes(), &stored);
}

fn stored_metadata(
    attributes: &AcquisitionAttributes,
    compression: &Compression,
    frames: u64,
) -> serde_json::Value {
    let array = array_builder(attributes, compression, frames)
        .expect("builder")
        .build(Arc::new(MemoryStore::new()), "/0")
        .expect("build array");
    serde_json::from_str(&array.metadata().to_string_pretty()).expect("metadata json")
}

#[test]
fn test_metadata_codecs() {
    let camera = CameraSettings::new(1920, 1200, SampleType::U8);
    let sharded = map_acquisition_dimensions(&camera, 64, &ChunkLayout::hackathon_demo())
        .expect("valid");
    let json = stored_metadata(&attributes(camera, sharded), &Compression::Raw, 64);
    assert_eq!(json["shape"], serde_json::json!([64, 1200, 1920]));
    assert_eq!(
        json["chunk_grid"]["configuration"]["chunk_shape"],
        serde_json::json!([64, 1200, 1920])
    );
    assert_eq!(json["codecs"][0]["name"], "sharding_indexed");
    assert_eq!(
        json["codecs"][0]["configuration"]["chunk_shape"],
        serde_json::json!([64, 600, 960])
    );
    assert_eq!(json["dimension_names"], serde_json::json!(["t", "y", "x"]));
    assert!(json["attributes"]["acquisition"].is_object());

    let layout = ChunkLayout {
        t: AxisChunking::new(64, 1),
        y: AxisChunking::new(600, 1),
        x: AxisChunking::new(960, 1),
    };
    let plain = map_acquisition_dimensions(&camera, 64, &layout).expect("valid");
    let compression = Compression::Blosc {
        compressor: BloscCompressor::Lz4,
        level: 1,
        byte_shuffle: true,
    };
    let json = stored_metadata(&attributes(camera, plain), &compression, 64);
    assert_eq!(json["codecs"][0]["name"], "bytes");
    assert_eq!(json["codecs"][1]["name"], "blosc");
    assert_eq!(
        json["chunk_grid"]["configuration"]["chunk_shape"],
        serde_json::json!([64, 600, 960])
    );
}

#[test]
fn test_blosc_level_above_nine_is_configuration_error() {
    let compression = Compression::Blosc {
        compressor: BloscCompressor::Zstd,
        level: 10,
        byte_shuffle: true,
    };
    assert!(matches!(
        compression.codecs(SampleType::U16),
        Err(Error::Configuration(_))
    ));

    let store = Arc::new(MemoryStore::new());
    let camera = CameraSettings::new(13, 10, SampleType::U16);
    let dims = map_acquisition_dimensions(&camera, 0, &ragged_layout()).expect("valid");
    let result = ZarrStreamWriter::create(
        StorageLocation::root(store),
        attributes(camera, dims),
        compression,
    );
    assert!(matches!(result, Err(Error::Configuration(_))));
}

#[test]
fn test_long_time_chunk_writes_only_acquired_frames() {
    init();
    let store = Arc::new(MemoryStore::new());
    let camera = CameraSettings::new(32, 24, SampleType::U16);
    let layout = ChunkLayout {
        t: AxisChunking::new(4096, 1),
        y: AxisChunking::new(24, 1),
        x: AxisChunking::new(32, 1),
    };
    let dims = map_acquisition_dimensions(&camera, 2, &layout).expect("valid");
    assert_eq!(write_frames(&store, camera, &dims, Compression::Raw, 2), 2);
    check_frames(&store, &camera, 2);

    let geometry = read_array_geometry(store.clone(), "/0").expect("read geometry");
    assert_eq!(geometry.shape, vec![2, 24, 32]);
    assert_eq!(geometry.chunk_shape, vec![4096, 24, 32]);
    assert_eq!(geometry.chunk_count, 1);
}

#[test]
fn test_reader_caches_decoded_chunks() {
    init();
    let store = Arc::new(MemoryStore::new());
    let camera = CameraSettings::new(13, 10, SampleType::U16);
    let dims = map_acquisition_dimensions(&camera, 0, &ragged_layout()).expect("valid");
    write_frames(&store, camera, &dims, Compression::Raw, 4);

    let reader = DatasetReader::open(store.clone(), "/0").expect("open dataset");
    assert_eq!(reader.cached_chunks(), 0);
    let first = reader.read_frame(0).expect("read frame");
    let cached = reader.cached_chunks();
    assert!(cached > 0);
    // frame 1 lies in the same chunks as frame 0
    reader.read_frame(1).expect("read frame");
    assert_eq!(reader.cached_chunks(), cached);
    assert_eq!(reader.read_frame(0).expect("read frame again"), first);

    let small = DatasetReader::with_cache_bytes(store.clone(), "/0", 1).expect("open dataset");
    assert_eq!(small.read_frame(0).expect("read frame"), first);
}

#[test]
fn test_bounded_time_axis_is_enforced() {
    let store = Arc::new(MemoryStore::new());
    let camera = CameraSettings::new(13, 10, SampleType::U16);
    let dims = map_acquisition_dimensions(&camera, 2, &ragged_layout()).expect("valid");
    let mut writer = ZarrStreamWriter::create(
        StorageLocation::root(store.clone()),
        attributes(camera, dims),
        Compression::Raw,
    )
    .expect("create writer");
    writer.append(&frame_u16(&camera, 0)).expect("first frame");
    writer.append(&frame_u16(&camera, 1)).expect("second frame");
    assert!(matches!(
        writer.append(&frame_u16(&camera, 2)),
        Err(Error::Runtime(_))
    ));
    assert_eq!(writer.finish().expect("finish"), 2);
}

#[test]
fn test_append_rejects_bad_frames() {
    let store = Arc::new(MemoryStore::new());
    let camera = CameraSettings::new(13, 10, SampleType::U16);
    let dims = map_acquisition_dimensions(&camera, 0, &ragged_layout()).expect("valid");
    let mut writer = ZarrStreamWriter::create(
        StorageLocation::root(store.clone()),
        attributes(camera, dims),
        Compression::Raw,
    )
    .expect("create writer");
    assert!(writer.append(&[0u8; 3]).is_err());

    writer.append(&frame_u16(&camera, 0)).expect("append");
    assert_eq!(writer.finish().expect("finish"), 1);
    assert!(matches!(
        writer.append(&frame_u16(&camera, 1)),
        Err(Error::Runtime(_))
    ));
}

#[test]
fn test_writer_rejects_mismatched_camera() {
    let store = Arc::new(MemoryStore::new());
    let camera = CameraSettings::new(13, 10, SampleType::U16);
    let dims = map_acquisition_dimensions(&camera, 0, &ragged_layout()).expect("valid");
    let other = CameraSettings::new(10, 13, SampleType::U16);
    let result = ZarrStreamWriter::create(
        StorageLocation::root(store),
        attributes(other, dims),
        Compression::Raw,
    );
    assert!(matches!(result, Err(Error::InvalidGeometry(_))));
}

#[test]
fn test_read_frame_out_of_range() {
    let store = Arc::new(MemoryStore::new());
    let camera = CameraSettings::new(13, 10, SampleType::U16);
    let dims = map_acquisition_dimensions(&camera, 0, &ragged_layout()).expect("valid");
    write_frames(&store, camera, &dims, Compression::Raw, 3);
    let reader = DatasetReader::open(store, "/0").expect("open dataset");
    assert!(reader.read_frame(3).is_err());
}

#[test]
fn test_remove_nested_dataset() {
    let store = Arc::new(MemoryStore::new());
    let camera = CameraSettings::new(13, 10, SampleType::U16);
    let dims = map_acquisition_dimensions(&camera, 0, &ragged_layout()).expect("valid");
    let keep = StorageLocation::new(store.clone(), "keep.zarr");
    let removed = StorageLocation::new(store.clone(), "/drop.zarr/");
    assert_eq!(removed.array_path(), "/drop.zarr/0");

    for location in [&keep, &removed] {
        let mut writer = ZarrStreamWriter::create(
            location.clone(),
            attributes(camera, dims.clone()),
            Compression::Raw,
        )
        .expect("create writer");
        writer.append(&frame_u16(&camera, 0)).expect("append");
        writer.finish().expect("finish");
    }

    removed.remove().expect("remove");
    assert!(read_array_geometry(store.clone(), &removed.array_path()).is_err());
    assert_eq!(
        read_array_geometry(store.clone(), &keep.array_path())
            .expect("untouched")
            .shape,
        vec![1, 10, 13]
    );
}
