//! Support practice factor (P)
//!
//! Slope (degrees) falls into contiguous bands, each with a coefficient.
//! Built-up and water land cover override the band value with 0.

use serde::{Deserialize, Serialize};

use erosgis_algebra::RasterHandle;
use erosgis_algorithms::imagery::{ClassificationScheme, LookupTable};
use erosgis_core::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PracticeCoefficients {
    /// Lower bounds of the slope bands in degrees, starting at 0; the last
    /// band is open-ended
    pub slope_edges: Vec<f64>,
    /// One coefficient per band
    pub values: Vec<f64>,
    /// Land-cover codes forced to P = 0
    pub zero_codes: Vec<i64>,
}

impl Default for PracticeCoefficients {
    fn default() -> Self {
        Self {
            slope_edges: vec![0.0, 2.0, 5.0, 8.0, 12.0, 16.0, 20.0],
            values: vec![0.60, 0.50, 0.60, 0.70, 0.80, 0.90, 1.00],
            zero_codes: vec![50, 80],
        }
    }
}

impl PracticeCoefficients {
    pub fn scheme(&self) -> Result<ClassificationScheme> {
        ClassificationScheme::from_edges(&self.slope_edges, ClassificationScheme::DEFAULT_NODATA_CLASS)
    }

    /// Class id of each band to its coefficient
    pub fn band_table(&self) -> Result<LookupTable> {
        let scheme = self.scheme()?;
        if scheme.bins().len() != self.values.len() {
            return Err(Error::InvalidParameter {
                name: "practice",
                value: format!("{} bands, {} values", scheme.bins().len(), self.values.len()),
                reason: "one value per slope band is required".into(),
            });
        }
        let table = LookupTable::new(
            scheme
                .class_ids()
                .into_iter()
                .map(i64::from)
                .zip(self.values.iter().copied()),
            1.0,
        );
        table.validate_range("practice", 0.0, 1.0)?;
        Ok(table)
    }

    pub fn validate(&self) -> Result<()> {
        self.band_table().map(|_| ())
    }
}

/// P from slope in degrees and land-cover codes on the same grid
pub fn practice(slope: &RasterHandle, land_cover: &RasterHandle, c: &PracticeCoefficients) -> Result<RasterHandle> {
    let table = c.band_table()?;
    let banded = slope.classify(c.scheme()?)?.lookup(table)?;

    let overridden = land_cover.lookup(LookupTable::new(c.zero_codes.iter().map(|code| (*code, 1.0)), 0.0))?;
    Ok(RasterHandle::where_(&overridden, 0.0, &banded)?.rename("P"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::testing::{evaluate, static_handle};
    use approx::assert_relative_eq;
    use erosgis_algebra::BandInfo;

    fn slope() -> RasterHandle {
        static_handle(BandInfo::continuous("slope"), |row, _| match row {
            0 => 1.0,
            1 => 2.0,
            2 => 19.99,
            3 => 45.0,
            4 => f64::NAN,
            _ => 6.0,
        })
    }

    fn land_cover() -> RasterHandle {
        static_handle(BandInfo::categorical("land_cover"), |_, col| match col {
            0 => 50.0,
            1 => 80.0,
            2 => f64::NAN,
            _ => 40.0,
        })
    }

    #[test]
    fn test_slope_bands() {
        let p = evaluate(&practice(&slope(), &land_cover(), &PracticeCoefficients::default()).unwrap());
        assert_relative_eq!(p.get(0, 5).unwrap(), 0.60);
        assert_relative_eq!(p.get(1, 5).unwrap(), 0.50);
        assert_relative_eq!(p.get(2, 5).unwrap(), 0.90);
        assert_relative_eq!(p.get(3, 5).unwrap(), 1.00);
        assert_relative_eq!(p.get(5, 5).unwrap(), 0.70);
        assert!(p.get(4, 5).unwrap().is_nan());
    }

    #[test]
    fn test_built_up_and_water_override() {
        let p = evaluate(&practice(&slope(), &land_cover(), &PracticeCoefficients::default()).unwrap());
        for row in [0, 3, 5] {
            assert_eq!(p.get(row, 0).unwrap(), 0.0);
            assert_eq!(p.get(row, 1).unwrap(), 0.0);
        }
        assert!(p.get(0, 2).unwrap().is_nan());
    }

    #[test]
    fn test_mismatched_values_rejected() {
        let c = PracticeCoefficients {
            values: vec![0.5; 3],
            ..PracticeCoefficients::default()
        };
        assert!(c.validate().is_err());

        let c = PracticeCoefficients {
            values: vec![0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 1.5],
            ..PracticeCoefficients::default()
        };
        assert!(practice(&slope(), &land_cover(), &c).is_err());
    }
}
