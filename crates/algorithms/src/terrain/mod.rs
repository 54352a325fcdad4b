//! Terrain analysis algorithms
//!
//! - Slope: Horn (1981) gradient in degrees
//! - Pixel area: ground area per cell, projected or on the spheroid

mod pixel_area;
mod slope;
mod spheroid;

pub use pixel_area::pixel_area;
pub use slope::{slope, SlopeParams, SLOPE_HALO};
pub use spheroid::{CellDimensions, Spheroid};
