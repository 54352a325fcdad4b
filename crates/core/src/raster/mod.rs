//! Raster data structures: cells, extents, pixel grids and transforms

mod element;
mod extent;
mod geotransform;
mod grid;
mod pixel_grid;

pub use element::RasterElement;
pub use extent::Extent;
pub use geotransform::GeoTransform;
pub use grid::Raster;
pub use pixel_grid::PixelGrid;
