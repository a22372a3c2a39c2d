use zarrs_acquire::{
    Error,
    device::{DeviceIdentifier, DeviceKind, DeviceManager},
    runtime::{AcquisitionRuntime, SimulatedRuntime},
};

fn manager() -> DeviceManager {
    env_logger::try_init().ok();
    DeviceManager::new([
        DeviceIdentifier::new(DeviceKind::Camera, "Blackfly S BFS-U3-23S3M"),
        DeviceIdentifier::new(DeviceKind::Camera, "simulated: empty"),
        DeviceIdentifier::new(DeviceKind::Storage, "Zarr"),
        DeviceIdentifier::new(DeviceKind::Storage, "ZarrBlosc1ZstdByteShuffle"),
    ])
}

#[test]
fn test_select_by_pattern() {
    let device = manager()
        .select(DeviceKind::Camera, ".*Blackfly.*")
        .expect("camera exists");
    assert_eq!(device.name, "Blackfly S BFS-U3-23S3M");
    assert_eq!(device.kind, DeviceKind::Camera);
}

#[test]
fn test_select_matches_whole_name() {
    let manager = manager();
    let zarr = manager
        .select(DeviceKind::Storage, "Zarr")
        .expect("storage exists");
    assert_eq!(zarr.name, "Zarr");

    let blosc = manager
        .select(DeviceKind::Storage, "ZarrBlosc1.*")
        .expect("storage exists");
    assert_eq!(blosc.name, "ZarrBlosc1ZstdByteShuffle");

    assert!(matches!(
        manager.select(DeviceKind::Camera, "Blackfly"),
        Err(Error::DeviceNotFound { .. })
    ));
}

#[test]
fn test_select_filters_by_kind() {
    let Err(Error::DeviceNotFound { kind, pattern }) =
        manager().select(DeviceKind::Storage, ".*Blackfly.*")
    else {
        panic!("a camera must not satisfy a storage selection");
    };
    assert_eq!(kind, DeviceKind::Storage);
    assert_eq!(pattern, ".*Blackfly.*");
}

#[test]
fn test_empty_pattern_selects_first() {
    let device = manager()
        .select(DeviceKind::Storage, "")
        .expect("storage exists");
    assert_eq!(device.name, "Zarr");
}

#[test]
fn test_invalid_pattern() {
    assert!(matches!(
        manager().select(DeviceKind::Camera, "(unclosed"),
        Err(Error::Regex(_))
    ));
}

#[test]
fn test_simulated_devices() {
    let runtime = SimulatedRuntime::new();
    let dm = runtime.device_manager();
    assert_eq!(dm.devices().len(), 6);
    dm.select(DeviceKind::Camera, "simulated: radial sin")
        .expect("simulated camera");
    dm.select(DeviceKind::Storage, "ZarrBlosc1Lz4ByteShuffle")
        .expect("compressed storage");
    assert!(dm.select(DeviceKind::Camera, ".*Blackfly.*").is_err());
}
