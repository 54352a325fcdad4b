//! Statistical reductions of raster data
//!
//! - **temporal**: aggregation of monthly layers
//! - **zonal**: mergeable per-region partial statistics

pub mod temporal;
pub mod zonal;

pub use temporal::temporal_sum;
pub use zonal::{
    accumulate, accumulate_classes, region_mask, ClassAreas, Histogram, Moments, Statistic,
    ZonalPartial,
};
