//! Stream 64 simulated 1920x1200 frames to an S3-compatible bucket, read them back,
//! check the stored geometry and delete the dataset.
//!
//! Requires `ZARR_S3_ENDPOINT`, `ZARR_S3_BUCKET_NAME`, `ZARR_S3_ACCESS_KEY_ID` and
//! `ZARR_S3_SECRET_ACCESS_KEY`, in the environment or a `.env` file.
//! Set `RUST_LOG=debug` for the full log.

use zarrs_acquire::{
    config::S3Settings,
    runtime::{SimulatedRuntime, StorageSettings},
    storage::open_store,
    stream::{StreamPlan, acquire_to_object_store, cleanup, load_and_validate},
};

fn run() -> zarrs_acquire::Result<()> {
    let mut runtime = SimulatedRuntime::new();
    let plan = StreamPlan::hackathon_demo().with_camera_pattern("simulated: radial sin");
    let (s3, report) = acquire_to_object_store(&mut runtime, &S3Settings::figment()?, &plan)?;

    let location = open_store(&StorageSettings {
        uri: report.uri.clone(),
        s3_access_key_id: Some(s3.access_key_id.clone()),
        s3_secret_access_key: Some(s3.secret_access_key.clone()),
        acquisition_dimensions: None,
    })?;
    let reader = load_and_validate(&location, &report.dimensions, report.frames_written)?;

    for index in 0..reader.frame_count() {
        let frame = reader.read_frame(index)?;
        log::info!("frame {index}: mean intensity {:.2}", frame.mean());
    }

    cleanup(&location)
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        log::error!("{err}");
        std::process::exit(1);
    }
}
