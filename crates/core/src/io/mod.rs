//! Reading and writing GeoTIFF rasters

mod native;

pub use native::{
    read_geotiff, read_geotiff_from_buffer, read_geotiff_header, read_geotiff_window, write_geotiff,
    write_geotiff_to_buffer, GeoTiffHeader, GeoTiffOptions,
};
