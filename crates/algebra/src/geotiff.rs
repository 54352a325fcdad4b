//! Data provider backed by a directory of GeoTIFF files
//!
//! The directory holds a `catalog.json` listing datasets, their bands and
//! the file (or monthly files) behind each band:
//!
//! ```json
//! {
//!   "datasets": [
//!     {
//!       "name": "chirps",
//!       "crs": "EPSG:4326",
//!       "bands": [
//!         {
//!           "name": "precipitation",
//!           "files": [{ "path": "chirps/2001-01.tif", "year": 2001, "month": 1 }]
//!         }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! A dataset covers the area shared by all of its files, at the coarsest
//! file resolution; `crs` overrides the CRS stored in the files. Fetches
//! decode only the window of each file under the requested grid.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::provider::{BandInfo, DataProvider, DatasetInfo, FetchRequest};
use erosgis_algorithms::resample::resample;
use erosgis_core::io::{read_geotiff_header, read_geotiff_window, GeoTiffHeader};
use erosgis_core::{Error, Extent, Layer, Period, PixelGrid, Raster, Result, TimeRange, CRS};

/// File name of the catalog inside a provider directory
pub const CATALOG_FILE: &str = "catalog.json";

const DEFAULT_CACHE_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub datasets: Vec<CatalogDataset>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogDataset {
    pub name: String,
    #[serde(default)]
    pub crs: Option<String>,
    pub bands: Vec<CatalogBand>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogBand {
    pub name: String,
    #[serde(default)]
    pub categorical: bool,
    pub files: Vec<CatalogFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogFile {
    /// Path relative to the catalog directory
    pub path: PathBuf,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub month: Option<u8>,
}

impl CatalogFile {
    fn period(&self) -> Result<Option<Period>> {
        match (self.year, self.month) {
            (Some(y), Some(m)) => Ok(Some(Period::new(y, m)?)),
            (None, None) => Ok(None),
            _ => Err(Error::InvalidParameter {
                name: "catalog",
                value: self.path.display().to_string(),
                reason: "year and month must be given together".into(),
            }),
        }
    }
}

/// GeoTIFF directory provider with an LRU cache of file headers
#[derive(Debug)]
pub struct GeoTiffProvider {
    root: PathBuf,
    catalog: Catalog,
    headers: Mutex<LruCache<PathBuf, Arc<GeoTiffHeader>>>,
    decoded: AtomicU64,
}

impl GeoTiffProvider {
    /// Open `dir/catalog.json`
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Self::with_cache_capacity(dir, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(dir: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        let root = dir.as_ref().to_path_buf();
        let text = std::fs::read_to_string(root.join(CATALOG_FILE))?;
        let catalog: Catalog = serde_json::from_str(&text)
            .map_err(|e| Error::Other(format!("invalid {}: {}", CATALOG_FILE, e)))?;
        Ok(Self::from_catalog(root, catalog, capacity))
    }

    pub fn from_catalog(root: PathBuf, catalog: Catalog, capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            root,
            catalog,
            headers: Mutex::new(LruCache::new(cap)),
            decoded: AtomicU64::new(0),
        }
    }

    /// Pixels decoded by fetches so far
    pub fn decoded_pixels(&self) -> u64 {
        self.decoded.load(Ordering::Relaxed)
    }

    fn entry(&self, dataset: &str) -> Result<&CatalogDataset> {
        self.catalog
            .datasets
            .iter()
            .find(|d| d.name == dataset)
            .ok_or_else(|| Error::data_unavailable(dataset, "not in catalog"))
    }

    /// Header of a catalog file, from the cache when possible
    fn header(&self, dataset: &str, relative: &Path) -> Result<Arc<GeoTiffHeader>> {
        let path = self.root.join(relative);
        {
            let mut cache = self
                .headers
                .lock()
                .map_err(|_| Error::Other("header cache lock poisoned".into()))?;
            if let Some(hit) = cache.get(&path) {
                return Ok(Arc::clone(hit));
            }
        }
        if !path.is_file() {
            return Err(Error::data_unavailable(
                dataset,
                format!("missing file {}", path.display()),
            ));
        }

        debug!(path = %path.display(), "header cache miss");
        let header = Arc::new(read_geotiff_header(&path)?);
        let mut cache = self
            .headers
            .lock()
            .map_err(|_| Error::Other("header cache lock poisoned".into()))?;
        cache.put(path, Arc::clone(&header));
        Ok(header)
    }

    /// Pixels of one file under `grid`, decoding only the window it needs
    fn read(&self, dataset: &str, file: &CatalogFile, grid: &PixelGrid) -> Result<Option<Raster<f64>>> {
        let header = self.header(dataset, &file.path)?;
        // one extra source pixel for interpolation at the border
        let wanted = grid.extent().buffer(header.cell_size());
        let (row_off, col_off, rows, cols) = match header.pixel_grid().window_of(&wanted) {
            Some(window) => window,
            None => return Ok(None),
        };
        let raster = read_geotiff_window::<f64, _>(self.root.join(&file.path), row_off, col_off, rows, cols)?;
        self.decoded.fetch_add(raster.len() as u64, Ordering::Relaxed);
        Ok(Some(raster))
    }

    fn dataset_crs(&self, entry: &CatalogDataset, sample: &GeoTiffHeader) -> Result<CRS> {
        match (&entry.crs, &sample.crs) {
            (Some(text), _) => text.parse(),
            (None, Some(crs)) => Ok(crs.clone()),
            (None, None) => Err(Error::data_unavailable(
                &entry.name,
                "no CRS in catalog or GeoTIFF keys",
            )),
        }
    }
}

impl DataProvider for GeoTiffProvider {
    fn datasets(&self) -> Vec<String> {
        self.catalog.datasets.iter().map(|d| d.name.clone()).collect()
    }

    fn describe(&self, dataset: &str) -> Result<DatasetInfo> {
        let entry = self.entry(dataset)?;
        let mut files = entry.bands.iter().flat_map(|b| &b.files).peekable();
        let first = match files.peek() {
            Some(file) => self.header(dataset, &file.path)?,
            None => return Err(Error::data_unavailable(dataset, "catalog lists no files")),
        };

        let mut extent: Option<Extent> = Some(first.extent());
        let mut scale = first.cell_size();
        let mut years: Option<(i32, i32)> = None;
        for file in files {
            let header = self.header(dataset, &file.path)?;
            extent = extent.and_then(|e| e.intersection(&header.extent()));
            scale = scale.max(header.cell_size());
            if let Some(p) = file.period()? {
                years = Some(match years {
                    Some((lo, hi)) => (lo.min(p.year), hi.max(p.year)),
                    None => (p.year, p.year),
                });
            }
        }
        let extent = extent.ok_or_else(|| Error::data_unavailable(dataset, "files share no common extent"))?;
        let time_range = years.map(|(a, b)| TimeRange::new(a, b)).transpose()?;

        Ok(DatasetInfo {
            name: entry.name.clone(),
            extent,
            crs: self.dataset_crs(entry, &first)?,
            scale,
            bands: entry
                .bands
                .iter()
                .map(|b| BandInfo {
                    name: b.name.clone(),
                    categorical: b.categorical,
                })
                .collect(),
            time_range,
        })
    }

    fn fetch(&self, request: &FetchRequest) -> Result<Vec<Layer>> {
        let entry = self.entry(&request.dataset)?;
        let band = entry
            .bands
            .iter()
            .find(|b| b.name == request.band)
            .ok_or_else(|| {
                Error::data_unavailable(&request.dataset, format!("no band named '{}'", request.band))
            })?;
        let method = BandInfo {
            name: band.name.clone(),
            categorical: band.categorical,
        }
        .resample_method();

        let mut layers = Vec::new();
        for file in &band.files {
            let period = file.period()?;
            if !request.wants(period.as_ref()) {
                continue;
            }
            let mut raster = match self.read(&request.dataset, file, &request.grid)? {
                Some(source) => resample(&source, &request.grid, method)?,
                None => {
                    let mut empty = Raster::on_grid(&request.grid, f64::NAN);
                    empty.set_nodata(Some(f64::NAN));
                    empty
                }
            };
            if entry.crs.is_some() || raster.crs().is_none() {
                let header = self.header(&request.dataset, &file.path)?;
                raster.set_crs(Some(self.dataset_crs(entry, &header)?));
            }
            layers.push(Layer::new(period, raster));
        }
        layers.sort_by_key(|l| l.period);

        if layers.is_empty() {
            return Err(Error::data_unavailable(
                &request.dataset,
                "no files in the requested time range",
            ));
        }
        Ok(layers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use erosgis_core::io::write_geotiff;

    fn write_catalog(dir: &Path) {
        let grid = PixelGrid::new(0.0, 100.0, 10.0, 10, 10);
        for (name, value) in [("jan.tif", 10.0), ("feb.tif", 20.0), ("lc.tif", 40.0)] {
            let mut r = Raster::on_grid(&grid, value);
            r.set_crs(Some(CRS::from_epsg(32633)));
            write_geotiff(&r, dir.join(name), None).unwrap();
        }
        let catalog = r#"{
            "datasets": [
                { "name": "rain", "bands": [{ "name": "precipitation", "files": [
                    { "path": "jan.tif", "year": 2001, "month": 1 },
                    { "path": "feb.tif", "year": 2001, "month": 2 }
                ]}]},
                { "name": "cover", "bands": [{ "name": "map", "categorical": true, "files": [
                    { "path": "lc.tif" }
                ]}]}
            ]
        }"#;
        std::fs::write(dir.join(CATALOG_FILE), catalog).unwrap();
    }

    #[test]
    fn test_describe_from_files() {
        let dir = tempfile::tempdir().unwrap();
        write_catalog(dir.path());
        let provider = GeoTiffProvider::open(dir.path()).unwrap();

        assert_eq!(provider.datasets(), vec!["rain".to_string(), "cover".to_string()]);
        let info = provider.describe("rain").unwrap();
        assert_eq!(info.scale, 10.0);
        assert_eq!(info.crs.epsg(), Some(32633));
        assert_eq!(info.time_range, Some(TimeRange::new(2001, 2001).unwrap()));
        assert!(provider.describe("cover").unwrap().band("map").unwrap().categorical);
        assert!(provider.describe("elevation").is_err());
    }

    #[test]
    fn test_fetch_resamples_onto_grid() {
        let dir = tempfile::tempdir().unwrap();
        write_catalog(dir.path());
        let provider = GeoTiffProvider::with_cache_capacity(dir.path(), 1).unwrap();

        let grid = PixelGrid::new(0.0, 100.0, 20.0, 5, 5);
        let layers = provider
            .fetch(&FetchRequest {
                dataset: "rain".into(),
                band: "precipitation".into(),
                time_range: None,
                grid,
            })
            .unwrap();
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[1].period, Some(Period::new(2001, 2).unwrap()));
        assert_eq!(layers[1].raster.shape(), (5, 5));
        assert_eq!(layers[1].raster.get(2, 2).unwrap(), 20.0);
    }

    fn write_tif(dir: &Path, name: &str, grid: &PixelGrid, value: f64) {
        let mut r = Raster::on_grid(grid, value);
        r.set_crs(Some(CRS::from_epsg(32633)));
        write_geotiff(&r, dir.join(name), None).unwrap();
    }

    #[test]
    fn test_describe_intersects_files() {
        let dir = tempfile::tempdir().unwrap();
        write_tif(dir.path(), "a.tif", &PixelGrid::new(0.0, 100.0, 10.0, 10, 10), 1.0);
        write_tif(dir.path(), "b.tif", &PixelGrid::new(50.0, 120.0, 20.0, 5, 5), 2.0);
        let catalog = r#"{ "datasets": [
            { "name": "rain", "bands": [{ "name": "precipitation", "files": [
                { "path": "a.tif", "year": 2001, "month": 1 },
                { "path": "b.tif", "year": 2002, "month": 1 }
            ]}]},
            { "name": "gap", "bands": [{ "name": "v", "files": [{ "path": "absent.tif" }] }]}
        ]}"#;
        std::fs::write(dir.path().join(CATALOG_FILE), catalog).unwrap();
        let provider = GeoTiffProvider::open(dir.path()).unwrap();

        let info = provider.describe("rain").unwrap();
        assert_eq!(info.extent, Extent::new(50.0, 20.0, 100.0, 100.0));
        assert_eq!(info.scale, 20.0);
        assert_eq!(info.time_range, Some(TimeRange::new(2001, 2002).unwrap()));
        assert!(matches!(provider.describe("gap"), Err(Error::DataUnavailable { .. })));
    }

    #[test]
    fn test_fetch_decodes_only_the_tile_window() {
        let dir = tempfile::tempdir().unwrap();
        let source = PixelGrid::new(0.0, 1000.0, 10.0, 100, 100);
        let mut files = Vec::new();
        for month in 1..=3 {
            let name = format!("m{}.tif", month);
            write_tif(dir.path(), &name, &source, month as f64);
            files.push(format!(r#"{{ "path": "{}", "year": 2001, "month": {} }}"#, name, month));
        }
        let catalog = format!(
            r#"{{ "datasets": [{{ "name": "rain", "bands": [{{ "name": "precipitation", "files": [{}] }}] }}] }}"#,
            files.join(",")
        );
        std::fs::write(dir.path().join(CATALOG_FILE), catalog).unwrap();
        let provider = GeoTiffProvider::with_cache_capacity(dir.path(), 1).unwrap();

        let fetch = |grid: PixelGrid| {
            provider
                .fetch(&FetchRequest {
                    dataset: "rain".into(),
                    band: "precipitation".into(),
                    time_range: None,
                    grid,
                })
                .unwrap()
        };
        // 2 x 2 tile in the interior: a 4 x 4 window per file with the border pixel
        let layers = fetch(source.window(40, 40, 2, 2));
        assert_eq!(layers.len(), 3);
        assert_eq!(layers[2].raster.get(1, 1).unwrap(), 3.0);
        assert_eq!(provider.decoded_pixels(), 3 * 16);

        fetch(source.window(60, 10, 2, 2));
        assert_eq!(provider.decoded_pixels(), 2 * 3 * 16);

        // outside the files: empty layers, nothing decoded
        let outside = fetch(PixelGrid::new(5000.0, 5000.0, 10.0, 2, 2));
        assert!(outside[0].raster.get(0, 0).unwrap().is_nan());
        assert_eq!(provider.decoded_pixels(), 2 * 3 * 16);
    }
}
