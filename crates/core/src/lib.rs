//! # ErosGIS Core
//!
//! Core types and I/O shared by every ErosGIS crate.
//!
//! This crate provides:
//! - `Raster<T>`: Generic georeferenced raster grid
//! - `Extent` / `PixelGrid`: bounding boxes and the pixel grids snapped to them
//! - `GeoTransform`: Affine transformation for georeferencing
//! - `CRS`: Coordinate Reference System identifiers
//! - `Region`: named polygons used as zones for statistics
//! - `Period` / `TimeRange`: monthly layers and year windows
//! - Native GeoTIFF I/O

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;
pub mod temporal;
pub mod vector;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{Extent, GeoTransform, PixelGrid, Raster, RasterElement};
pub use temporal::{Layer, Period, TimeRange};
pub use vector::Region;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{Extent, GeoTransform, PixelGrid, Raster, RasterElement};
    pub use crate::temporal::{Layer, Period, TimeRange};
    pub use crate::vector::Region;
}
