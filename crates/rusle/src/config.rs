//! Run configuration
//!
//! Every field has a default, so a JSON file only needs the knobs it
//! changes:
//!
//! ```json
//! { "compute_scale": 250.0, "start_year": 2010, "end_year": 2020 }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::composition::ClassificationConfig;
use crate::factors::{
    CoverCoefficients, ErodibilityCoefficients, ErosivityParams, PracticeCoefficients, TopographyCoefficients,
};
use erosgis_algorithms::imagery::ClassificationScheme;
use erosgis_core::{Error, Result, TimeRange};
use erosgis_parallel::{ExecutionBudget, RetryPolicy};

/// A band of a provider dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRef {
    pub dataset: String,
    pub band: String,
}

impl DatasetRef {
    pub fn new(dataset: impl Into<String>, band: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            band: band.into(),
        }
    }
}

/// Where each model input comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Datasets {
    /// Monthly precipitation series
    pub precipitation: DatasetRef,
    pub sand: DatasetRef,
    pub silt: DatasetRef,
    pub clay: DatasetRef,
    pub organic_carbon: DatasetRef,
    pub elevation: DatasetRef,
    /// Categorical land cover
    pub land_cover: DatasetRef,
}

impl Datasets {
    /// Every input, precipitation first
    pub fn all(&self) -> [&DatasetRef; 7] {
        [
            &self.precipitation,
            &self.sand,
            &self.silt,
            &self.clay,
            &self.organic_carbon,
            &self.elevation,
            &self.land_cover,
        ]
    }
}

impl Default for Datasets {
    fn default() -> Self {
        Self {
            precipitation: DatasetRef::new("precipitation", "precipitation"),
            sand: DatasetRef::new("soil", "sand"),
            silt: DatasetRef::new("soil", "silt"),
            clay: DatasetRef::new("soil", "clay"),
            organic_carbon: DatasetRef::new("soil", "soc"),
            elevation: DatasetRef::new("elevation", "elevation"),
            land_cover: DatasetRef::new("land_cover", "land_cover"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Coefficients {
    pub erosivity: ErosivityParams,
    pub erodibility: ErodibilityCoefficients,
    pub topography: TopographyCoefficients,
    pub cover: CoverCoefficients,
    pub practice: PracticeCoefficients,
}

impl Coefficients {
    pub fn validate(&self) -> Result<()> {
        self.erosivity.validate()?;
        self.erodibility.validate()?;
        self.topography.validate()?;
        self.cover.validate()?;
        self.practice.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Scale (CRS units per pixel) at which factors are combined and reduced
    pub compute_scale: f64,
    /// Scale of exported rasters
    pub export_scale: f64,
    pub start_year: i32,
    pub end_year: i32,
    pub pixel_ceiling: u64,
    pub tile_budget: u64,
    /// Wall-clock limit per attempt, in seconds
    pub time_limit_secs: Option<f64>,
    pub retry: RetryPolicy,
    /// Histogram bin width for medians, in soil-loss units
    pub median_resolution: f64,
    pub datasets: Datasets,
    pub coefficients: Coefficients,
    pub classification: ClassificationConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        let budget = ExecutionBudget::default();
        Self {
            compute_scale: 100.0,
            export_scale: 100.0,
            start_year: 2001,
            end_year: 2020,
            pixel_ceiling: budget.pixel_ceiling,
            tile_budget: budget.tile_budget,
            time_limit_secs: None,
            retry: RetryPolicy::default(),
            median_resolution: 0.01,
            datasets: Datasets::default(),
            coefficients: Coefficients::default(),
            classification: ClassificationConfig::default(),
        }
    }
}

impl RunConfig {
    /// Read and validate a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: RunConfig = serde_json::from_str(&text).map_err(|e| Error::InvalidParameter {
            name: "config",
            value: path.as_ref().display().to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("compute_scale", self.compute_scale),
            ("export_scale", self.export_scale),
            ("median_resolution", self.median_resolution),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::InvalidParameter {
                    name,
                    value: value.to_string(),
                    reason: "must be positive".into(),
                });
            }
        }
        if let Some(secs) = self.time_limit_secs {
            if !(secs.is_finite() && secs >= 0.0) {
                return Err(Error::InvalidParameter {
                    name: "time_limit_secs",
                    value: secs.to_string(),
                    reason: "must be a non-negative number of seconds".into(),
                });
            }
        }
        self.time_range()?;
        self.budget().validate()?;
        self.retry.validate()?;
        self.scheme()?;
        self.coefficients.validate()
    }

    pub fn budget(&self) -> ExecutionBudget {
        ExecutionBudget {
            pixel_ceiling: self.pixel_ceiling,
            tile_budget: self.tile_budget,
            time_limit: self
                .time_limit_secs
                .filter(|s| s.is_finite() && *s >= 0.0)
                .map(Duration::from_secs_f64),
        }
    }

    /// The precipitation window; fails when the years are reversed
    pub fn time_range(&self) -> Result<TimeRange> {
        TimeRange::new(self.start_year, self.end_year)
    }

    pub fn scheme(&self) -> Result<ClassificationScheme> {
        self.classification.scheme()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        let config = RunConfig::default();
        config.validate().unwrap();
        assert_eq!(config.time_range().unwrap().years(), 20);
        assert_eq!(config.budget(), ExecutionBudget::default());
    }

    #[test]
    fn test_rejects_bad_values() {
        let cases = [
            RunConfig {
                compute_scale: 0.0,
                ..RunConfig::default()
            },
            RunConfig {
                export_scale: -10.0,
                ..RunConfig::default()
            },
            RunConfig {
                start_year: 2020,
                end_year: 2010,
                ..RunConfig::default()
            },
            RunConfig {
                tile_budget: 0,
                ..RunConfig::default()
            },
            RunConfig {
                pixel_ceiling: 0,
                ..RunConfig::default()
            },
            RunConfig {
                classification: ClassificationConfig {
                    edges: vec![1.0, 5.0],
                    nodata_class: 0,
                },
                ..RunConfig::default()
            },
        ];
        for config in cases {
            assert!(config.validate().is_err(), "{:?} should be rejected", config);
        }

        let mut config = RunConfig::default();
        config.coefficients.cover.table.default = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "compute_scale": 250.0,
                "start_year": 2010,
                "end_year": 2012,
                "time_limit_secs": 30,
                "retry": {{ "max_attempts": 2, "backoff": 3.0 }},
                "datasets": {{ "elevation": {{ "dataset": "srtm", "band": "dem" }} }},
                "coefficients": {{ "topography": {{ "slope_length": 50.0 }} }}
            }}"#
        )
        .unwrap();

        let config = RunConfig::from_file(file.path()).unwrap();
        assert_eq!(config.compute_scale, 250.0);
        assert_eq!(config.export_scale, 100.0);
        assert_eq!(config.time_range().unwrap().years(), 3);
        assert_eq!(config.budget().time_limit, Some(Duration::from_secs(30)));
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.datasets.elevation, DatasetRef::new("srtm", "dem"));
        assert_eq!(config.datasets.sand, DatasetRef::new("soil", "sand"));
        assert_eq!(config.coefficients.topography.slope_length, 50.0);
        assert_eq!(config.coefficients.topography.reference_length, 22.13);
    }

    #[test]
    fn test_partial_retry_keeps_defaults() {
        let config: RunConfig = serde_json::from_str(r#"{ "retry": { "max_attempts": 2 } }"#).unwrap();
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.backoff, RetryPolicy::default().backoff);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "compute_scale": -1 }}"#).unwrap();
        assert!(RunConfig::from_file(file.path()).is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(RunConfig::from_file(file.path()).is_err());
    }
}
