//! # ErosGIS Algebra
//!
//! Lazily-evaluated raster algebra for ErosGIS.
//!
//! - [`RasterHandle`]: immutable graph nodes built from provider loads and
//!   raster operations, validated when composed
//! - [`Evaluator`]: request-scoped, memoizing evaluation on a pixel grid
//! - [`DataProvider`]: the source contract, with in-memory and GeoTIFF
//!   directory implementations

pub mod evaluator;
pub mod geotiff;
pub mod handle;
pub mod memory;
pub mod provider;

pub use evaluator::{Evaluator, Value};
pub use geotiff::{Catalog, CatalogBand, CatalogDataset, CatalogFile, GeoTiffProvider, CATALOG_FILE};
pub use handle::{DataType, HandleMeta, Operand, Operation, RasterHandle};
pub use memory::MemoryProvider;
pub use provider::{BandInfo, DataProvider, DatasetInfo, FetchRequest};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::evaluator::Evaluator;
    pub use crate::handle::{DataType, Operand, RasterHandle};
    pub use crate::memory::MemoryProvider;
    pub use crate::provider::{BandInfo, DataProvider, DatasetInfo};
    pub use erosgis_algorithms::imagery::{ClassificationScheme, LookupTable};
    pub use erosgis_algorithms::resample::ResampleMethod;
}
