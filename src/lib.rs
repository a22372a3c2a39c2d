//! Stream camera frames into chunked, sharded Zarr V3 arrays and check that the stored
//! geometry is the one that was requested.
//!
//! The [`geometry`] module maps camera settings and a frame budget onto
//! [`dimension::AcquisitionDimensions`], and validates a stored array against them.
//! The remaining modules provide an acquisition [`runtime`], Zarr [`storage`] on the
//! local filesystem or an S3-compatible object store, and the [`stream`] sequence tying
//! them together.

pub mod camera;
pub mod config;
pub mod device;
pub mod dimension;
mod error;
pub mod geometry;
pub mod metadata;
pub mod runtime;
pub mod storage;
pub mod stream;

pub use zarrs;

pub use error::{Error, GeometryMismatch, GeometryQuantity, Result};
