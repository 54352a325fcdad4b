//! # ErosGIS Algorithms
//!
//! Per-tile raster kernels. Every kernel takes whole in-memory rasters and
//! returns a new raster on the same grid (or on a requested grid for
//! resampling); tiling and scheduling live in `erosgis-parallel`.
//!
//! ## Categories
//!
//! - **imagery**: band math, lookup tables, interval classification
//! - **terrain**: Horn slope, per-pixel ground area
//! - **resample**: nearest / bilinear sampling onto another grid
//! - **statistics**: temporal aggregation and zonal partial states

pub mod imagery;
mod maybe_rayon;
pub mod resample;
pub mod statistics;
pub mod terrain;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::imagery::{
        band_math, binary, classify, lookup, mask, select, unary, BinaryOp, ClassBin,
        ClassificationScheme, LookupTable, Operand, UnaryOp,
    };
    pub use crate::resample::{resample, ResampleMethod};
    pub use crate::statistics::{
        accumulate, accumulate_classes, region_mask, temporal_sum, ClassAreas, Histogram,
        Moments, Statistic, ZonalPartial,
    };
    pub use crate::terrain::{pixel_area, slope, SlopeParams, SLOPE_HALO};
    pub use erosgis_core::prelude::*;
}
