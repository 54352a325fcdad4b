//! Raster export of named bands

use std::path::{Path, PathBuf};

use tracing::info;

use erosgis_algebra::RasterHandle;
use erosgis_core::io::{write_geotiff, GeoTiffOptions};
use erosgis_core::{Error, Extent, Result, CRS};
use erosgis_parallel::{Precision, TileExecutor};

/// Ordered named bands sharing one CRS
#[derive(Debug, Clone, Default)]
pub struct BandStack {
    bands: Vec<(String, RasterHandle)>,
}

impl BandStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, handle: RasterHandle) {
        self.bands.push((name.into(), handle));
    }

    pub fn with(mut self, name: impl Into<String>, handle: RasterHandle) -> Self {
        self.push(name, handle);
        self
    }

    pub fn get(&self, name: &str) -> Option<&RasterHandle> {
        self.bands.iter().find(|(n, _)| n == name).map(|(_, h)| h)
    }

    pub fn names(&self) -> Vec<&str> {
        self.bands.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RasterHandle)> {
        self.bands.iter().map(|(n, h)| (n.as_str(), h))
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// CRS of the first band
    pub fn crs(&self) -> Option<&CRS> {
        self.bands.first().map(|(_, h)| h.crs())
    }
}

/// A written band
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedBand {
    pub name: String,
    pub path: PathBuf,
    pub precision: Precision,
}

pub trait RasterExporter {
    fn export(&mut self, stack: &BandStack, export_scale: f64, crs: &CRS) -> Result<Vec<ExportedBand>>;
}

/// One GeoTIFF per band, materialized over `extent` through the executor
#[derive(Debug, Clone)]
pub struct GeoTiffExporter {
    dir: PathBuf,
    executor: TileExecutor,
    extent: Extent,
}

impl GeoTiffExporter {
    pub fn new(dir: impl AsRef<Path>, executor: TileExecutor, extent: Extent) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            executor,
            extent,
        }
    }
}

impl RasterExporter for GeoTiffExporter {
    fn export(&mut self, stack: &BandStack, export_scale: f64, crs: &CRS) -> Result<Vec<ExportedBand>> {
        // reprojection is not supported
        for (name, handle) in stack.iter() {
            if !handle.crs().is_equivalent(crs) {
                return Err(Error::incompatible(format!(
                    "band '{}' is in {}, export requested {}",
                    name,
                    handle.crs().identifier(),
                    crs.identifier()
                )));
            }
        }
        std::fs::create_dir_all(&self.dir)?;

        let mut written = Vec::with_capacity(stack.len());
        for (name, handle) in stack.iter() {
            let materialized = self.executor.materialize(handle, &self.extent, export_scale)?;
            let path = self.dir.join(format!("{}.tif", name));
            write_geotiff(
                &materialized.raster,
                &path,
                Some(GeoTiffOptions {
                    crs: Some(crs.clone()),
                }),
            )?;
            info!(band = name, path = %path.display(), "exported band");
            written.push(ExportedBand {
                name: name.to_string(),
                path,
                precision: materialized.precision,
            });
        }
        Ok(written)
    }
}
