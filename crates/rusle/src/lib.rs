//! # ErosGIS RUSLE
//!
//! Annual soil loss `A = R * K * LS * C * P` built as a lazy raster-algebra
//! graph, classified into severity classes and summarized per region.
//!
//! - [`factors`]: erosivity, erodibility, topography, cover and practice
//! - [`composition`]: the factor product and its classification
//! - [`pipeline`]: the driver wiring inputs, factors and reductions
//! - [`boundary`], [`report`], [`export`]: region sources, statistics sinks
//!   and raster exporters
//!
//! ```ignore
//! use std::sync::Arc;
//! use erosgis_algebra::GeoTiffProvider;
//! use erosgis_rusle::{CollectingReporter, JsonBoundaryProvider, Pipeline, RunConfig};
//!
//! let provider = Arc::new(GeoTiffProvider::open("catalog")?);
//! let pipeline = Pipeline::new(RunConfig::default(), provider)?;
//! let boundaries = JsonBoundaryProvider::open("districts.json", 0.0)?;
//! let mut reporter = CollectingReporter::default();
//! let outcome = pipeline.run_boundaries(&boundaries, 1, None, &mut reporter, None)?;
//! ```

pub mod boundary;
pub mod composition;
pub mod config;
pub mod export;
pub mod factors;
pub mod pipeline;
pub mod report;

pub use boundary::{BoundaryProvider, BoundaryRecord, JsonBoundaryProvider};
pub use composition::{classify_severity, soil_loss, ClassificationConfig};
pub use config::{Coefficients, DatasetRef, Datasets, RunConfig};
pub use export::{BandStack, ExportedBand, GeoTiffExporter, RasterExporter};
pub use pipeline::{FactorStack, Pipeline, RunOutcome};
pub use report::{CollectingReporter, JsonLinesReporter, StatisticsReporter};
