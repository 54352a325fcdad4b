//! Cover management factor (C)
//!
//! Land-cover codes map to coefficients through a [`LookupTable`]; the
//! defaults follow the ESA WorldCover legend.

use serde::{Deserialize, Serialize};

use erosgis_algebra::RasterHandle;
use erosgis_algorithms::imagery::LookupTable;
use erosgis_core::Result;

/// Largest admissible C coefficient
pub const MAX_COVER: f64 = 0.45;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverCoefficients {
    pub table: LookupTable,
}

impl Default for CoverCoefficients {
    fn default() -> Self {
        Self {
            table: LookupTable::new(
                [
                    (10, 0.001), // tree cover
                    (20, 0.05),  // shrubland
                    (30, 0.04),  // grassland
                    (40, 0.25),  // cropland
                    (50, 0.0),   // built-up
                    (60, 0.45),  // bare / sparse vegetation
                    (70, 0.0),   // snow and ice
                    (80, 0.0),   // permanent water bodies
                    (90, 0.0),   // herbaceous wetland
                    (95, 0.001), // mangroves
                    (100, 0.1),  // moss and lichen
                ],
                MAX_COVER,
            ),
        }
    }
}

impl CoverCoefficients {
    pub fn validate(&self) -> Result<()> {
        self.table.validate_range("cover", 0.0, MAX_COVER)
    }
}

pub fn cover(land_cover: &RasterHandle, c: &CoverCoefficients) -> Result<RasterHandle> {
    c.validate()?;
    Ok(land_cover.lookup(c.table.clone())?.rename("C"))
}
