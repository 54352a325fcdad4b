//! In-memory data provider

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

use crate::provider::{BandInfo, DataProvider, DatasetInfo, FetchRequest};
use erosgis_algorithms::resample::resample;
use erosgis_core::{Error, Layer, Period, Raster, Result, TimeRange};

#[derive(Debug)]
struct MemoryDataset {
    info: DatasetInfo,
    layers: HashMap<String, Vec<Layer>>,
}

/// Provider serving rasters held in memory.
///
/// All bands of a dataset must share CRS and scale. Layers are resampled
/// onto each requested grid with the band's method.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    datasets: BTreeMap<String, MemoryDataset>,
    fetches: AtomicUsize,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a static band
    pub fn insert_static(
        &mut self,
        dataset: &str,
        band: BandInfo,
        raster: Raster<f64>,
    ) -> Result<&mut Self> {
        self.insert_layers(dataset, band, vec![Layer::new(None, raster)], None)?;
        Ok(self)
    }

    /// Add a monthly band; the dataset's time range is widened to cover it
    pub fn insert_series(
        &mut self,
        dataset: &str,
        band: BandInfo,
        series: Vec<(Period, Raster<f64>)>,
    ) -> Result<&mut Self> {
        let (first, last) = match (
            series.iter().map(|(p, _)| p.year).min(),
            series.iter().map(|(p, _)| p.year).max(),
        ) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(Error::InvalidParameter {
                    name: "series",
                    value: dataset.to_string(),
                    reason: "a temporal band needs at least one layer".into(),
                })
            }
        };
        let mut layers: Vec<Layer> = series
            .into_iter()
            .map(|(p, r)| Layer::new(Some(p), r))
            .collect();
        layers.sort_by_key(|l| l.period);
        self.insert_layers(dataset, band, layers, Some(TimeRange::new(first, last)?))?;
        Ok(self)
    }

    fn insert_layers(
        &mut self,
        dataset: &str,
        band: BandInfo,
        layers: Vec<Layer>,
        time_range: Option<TimeRange>,
    ) -> Result<()> {
        let reference = match layers.first() {
            Some(layer) => &layer.raster,
            None => return Ok(()),
        };
        let crs = reference.crs().cloned().ok_or_else(|| Error::InvalidParameter {
            name: "crs",
            value: dataset.to_string(),
            reason: "rasters served by a provider must carry a CRS".into(),
        })?;
        let grid = reference.pixel_grid();
        for layer in &layers {
            if layer.raster.pixel_grid() != grid {
                return Err(Error::InvalidParameter {
                    name: "layers",
                    value: format!("{}/{}", dataset, band.name),
                    reason: "all layers of a band must share one grid".into(),
                });
            }
        }

        match self.datasets.get_mut(dataset) {
            Some(existing) => {
                let info = &mut existing.info;
                if !info.crs.is_equivalent(&crs) || info.scale != grid.scale {
                    return Err(Error::CrsMismatch(
                        format!("{} @ {}", info.crs, info.scale),
                        format!("{} @ {}", crs, grid.scale),
                    ));
                }
                info.extent = info.extent.union(&grid.extent());
                info.time_range = match (info.time_range, time_range) {
                    (Some(a), Some(b)) => Some(TimeRange::new(
                        a.start_year.min(b.start_year),
                        a.end_year.max(b.end_year),
                    )?),
                    (a, b) => a.or(b),
                };
                info.bands.retain(|b| b.name != band.name);
                existing.layers.insert(band.name.clone(), layers);
                info.bands.push(band);
            }
            None => {
                let info = DatasetInfo {
                    name: dataset.to_string(),
                    extent: grid.extent(),
                    crs,
                    scale: grid.scale,
                    bands: vec![band.clone()],
                    time_range,
                };
                let mut map = HashMap::new();
                map.insert(band.name, layers);
                self.datasets.insert(
                    dataset.to_string(),
                    MemoryDataset { info, layers: map },
                );
            }
        }
        Ok(())
    }

    /// Number of `fetch` calls served so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl DataProvider for MemoryProvider {
    fn datasets(&self) -> Vec<String> {
        self.datasets.keys().cloned().collect()
    }

    fn describe(&self, dataset: &str) -> Result<DatasetInfo> {
        self.datasets
            .get(dataset)
            .map(|d| d.info.clone())
            .ok_or_else(|| Error::data_unavailable(dataset, "unknown dataset"))
    }

    fn fetch(&self, request: &FetchRequest) -> Result<Vec<Layer>> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let entry = self
            .datasets
            .get(&request.dataset)
            .ok_or_else(|| Error::data_unavailable(&request.dataset, "unknown dataset"))?;
        let band = entry.info.require_band(&request.band)?;
        let method = band.resample_method();
        let stored = entry.layers.get(&band.name).ok_or_else(|| {
            Error::data_unavailable(&request.dataset, format!("no layers for '{}'", band.name))
        })?;

        debug!(
            dataset = %request.dataset,
            band = %request.band,
            rows = request.grid.rows,
            cols = request.grid.cols,
            "memory fetch"
        );

        let layers = stored
            .iter()
            .filter(|l| request.wants(l.period.as_ref()))
            .map(|l| Ok(Layer::new(l.period, resample(&l.raster, &request.grid, method)?)))
            .collect::<Result<Vec<_>>>()?;

        if layers.is_empty() {
            return Err(Error::data_unavailable(
                &request.dataset,
                "no layers in the requested time range",
            ));
        }
        Ok(layers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use erosgis_core::{PixelGrid, CRS};

    fn raster(value: f64) -> Raster<f64> {
        let grid = PixelGrid::new(0.0, 100.0, 10.0, 10, 10);
        let mut r = Raster::on_grid(&grid, value);
        r.set_crs(Some(CRS::from_epsg(32633)));
        r
    }

    #[test]
    fn test_describe_and_fetch_static() {
        let mut p = MemoryProvider::new();
        p.insert_static("soil", BandInfo::continuous("sand"), raster(300.0))
            .unwrap();
        let info = p.describe("soil").unwrap();
        assert_eq!(info.scale, 10.0);
        assert!(!info.is_temporal());
        assert!(p.describe("nope").is_err());

        let grid = PixelGrid::new(50.0, 100.0, 10.0, 2, 8);
        let layers = p
            .fetch(&FetchRequest {
                dataset: "soil".into(),
                band: "sand".into(),
                time_range: None,
                grid,
            })
            .unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].raster.pixel_grid(), grid);
        assert_eq!(layers[0].raster.get(0, 0).unwrap(), 300.0);
        // cols 5.. fall outside the dataset
        assert!(layers[0].raster.get(0, 6).unwrap().is_nan());
        assert_eq!(p.fetch_count(), 1);
    }

    #[test]
    fn test_fetch_series_filters_years() {
        let mut p = MemoryProvider::new();
        let series = (2000..2003)
            .flat_map(|y| (1..=12).map(move |m| (y, m)))
            .map(|(y, m)| (Period::new(y, m).unwrap(), raster(m as f64)))
            .collect();
        p.insert_series("rain", BandInfo::continuous("precipitation"), series)
            .unwrap();
        assert_eq!(
            p.describe("rain").unwrap().time_range,
            Some(TimeRange::new(2000, 2002).unwrap())
        );

        let request = FetchRequest {
            dataset: "rain".into(),
            band: "precipitation".into(),
            time_range: Some(TimeRange::new(2001, 2001).unwrap()),
            grid: PixelGrid::new(0.0, 100.0, 10.0, 10, 10),
        };
        let layers = p.fetch(&request).unwrap();
        assert_eq!(layers.len(), 12);
        assert!(layers.iter().all(|l| l.period.unwrap().year == 2001));

        let missing = FetchRequest {
            band: "temperature".into(),
            ..request
        };
        assert!(matches!(
            p.fetch(&missing),
            Err(Error::DataUnavailable { .. })
        ));
    }

    #[test]
    fn test_rasters_need_crs() {
        let mut p = MemoryProvider::new();
        let r: Raster<f64> = Raster::filled(2, 2, 1.0);
        assert!(p.insert_static("x", BandInfo::continuous("b"), r).is_err());
    }
}
