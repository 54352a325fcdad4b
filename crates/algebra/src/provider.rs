//! Data provider contract
//!
//! A provider knows a set of named datasets, each with one or more bands
//! and optionally a monthly time axis. It serves them resampled onto any
//! requested pixel grid.

use std::fmt;

use serde::{Deserialize, Serialize};

use erosgis_algorithms::resample::ResampleMethod;
use erosgis_core::{Error, Extent, Layer, Period, PixelGrid, Result, TimeRange, CRS};

/// One band of a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandInfo {
    pub name: String,
    /// Cells are codes (land cover, classes) rather than measurements
    #[serde(default)]
    pub categorical: bool,
}

impl BandInfo {
    pub fn continuous(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            categorical: false,
        }
    }

    pub fn categorical(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            categorical: true,
        }
    }

    /// Method used to bring the band onto a requested grid
    pub fn resample_method(&self) -> ResampleMethod {
        if self.categorical {
            ResampleMethod::Nearest
        } else {
            ResampleMethod::Bilinear
        }
    }
}

/// Spatial, spectral and temporal coverage of a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub name: String,
    pub extent: Extent,
    pub crs: CRS,
    /// Native ground sample distance in CRS units
    pub scale: f64,
    pub bands: Vec<BandInfo>,
    /// Years covered; `None` for static datasets
    pub time_range: Option<TimeRange>,
}

impl DatasetInfo {
    pub fn band(&self, name: &str) -> Option<&BandInfo> {
        self.bands.iter().find(|b| b.name == name)
    }

    /// Band named `name`, or `DataUnavailable`
    pub fn require_band(&self, name: &str) -> Result<&BandInfo> {
        self.band(name).ok_or_else(|| {
            Error::data_unavailable(&self.name, format!("no band named '{}'", name))
        })
    }

    pub fn is_temporal(&self) -> bool {
        self.time_range.is_some()
    }
}

/// A request for one band of a dataset on an exact pixel grid
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub dataset: String,
    pub band: String,
    /// Only layers whose period falls in this range are returned
    pub time_range: Option<TimeRange>,
    pub grid: PixelGrid,
}

impl FetchRequest {
    /// Whether a layer with `period` belongs to the response
    pub fn wants(&self, period: Option<&Period>) -> bool {
        match (period, &self.time_range) {
            (Some(p), Some(range)) => range.contains(p),
            _ => true,
        }
    }
}

/// Source of gridded datasets.
///
/// `fetch` returns layers on exactly `request.grid`: same shape and
/// georeference, `NaN` wherever the dataset has no coverage. Temporal
/// datasets return one layer per period, ordered by period.
pub trait DataProvider: Send + Sync + fmt::Debug {
    /// Names of all datasets this provider can serve
    fn datasets(&self) -> Vec<String>;

    /// Coverage of `dataset`, or `DataUnavailable` if it is unknown
    fn describe(&self, dataset: &str) -> Result<DatasetInfo>;

    fn fetch(&self, request: &FetchRequest) -> Result<Vec<Layer>>;
}
