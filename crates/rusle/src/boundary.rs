//! Administrative boundaries as [`Region`]s

use std::path::Path;

use geo::{LineString, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};
use tracing::debug;

use erosgis_core::{Error, Region, Result};

/// Source of named regions
pub trait BoundaryProvider: Send + Sync {
    /// Regions at `admin_level`, optionally only the one named `filter_name`
    fn regions(&self, admin_level: u8, filter_name: Option<&str>) -> Result<Vec<Region>>;

    /// All regions at `admin_level` merged into one
    fn union(&self, admin_level: u8, name: &str) -> Result<Region> {
        let regions = self.regions(admin_level, None)?;
        Ok(Region::union_of(name, &regions))
    }
}

/// One record of a boundary file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryRecord {
    pub name: String,
    pub admin_level: u8,
    /// Exterior rings as `[x, y]` vertices
    pub polygons: Vec<Vec<[f64; 2]>>,
}

impl BoundaryRecord {
    fn to_region(&self) -> Result<Region> {
        if self.polygons.is_empty() {
            return Err(Error::InvalidParameter {
                name: "boundary",
                value: self.name.clone(),
                reason: "record has no polygons".into(),
            });
        }
        let polygons = self
            .polygons
            .iter()
            .map(|ring| {
                if ring.len() < 3 {
                    return Err(Error::InvalidParameter {
                        name: "boundary",
                        value: self.name.clone(),
                        reason: format!("ring with {} vertices", ring.len()),
                    });
                }
                let exterior: LineString<f64> = ring.iter().map(|[x, y]| (*x, *y)).collect();
                Ok(Polygon::new(exterior, Vec::new()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Region::new(self.name.clone(), MultiPolygon::new(polygons)))
    }
}

/// Boundaries from a JSON array of [`BoundaryRecord`]s
#[derive(Debug, Clone)]
pub struct JsonBoundaryProvider {
    records: Vec<BoundaryRecord>,
    /// Simplification tolerance in CRS units
    tolerance: f64,
}

impl JsonBoundaryProvider {
    pub fn open(path: impl AsRef<Path>, tolerance: f64) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text, tolerance)
    }

    pub fn from_json_str(json: &str, tolerance: f64) -> Result<Self> {
        let records: Vec<BoundaryRecord> = serde_json::from_str(json).map_err(|e| Error::InvalidParameter {
            name: "boundaries",
            value: "json".into(),
            reason: e.to_string(),
        })?;
        Ok(Self::from_records(records, tolerance))
    }

    pub fn from_records(records: Vec<BoundaryRecord>, tolerance: f64) -> Self {
        Self { records, tolerance }
    }

    pub fn records(&self) -> &[BoundaryRecord] {
        &self.records
    }
}

impl BoundaryProvider for JsonBoundaryProvider {
    fn regions(&self, admin_level: u8, filter_name: Option<&str>) -> Result<Vec<Region>> {
        let regions = self
            .records
            .iter()
            .filter(|r| r.admin_level == admin_level)
            .filter(|r| filter_name.map_or(true, |name| r.name.eq_ignore_ascii_case(name)))
            .map(|r| Ok(r.to_region()?.simplified(self.tolerance)))
            .collect::<Result<Vec<_>>>()?;

        if regions.is_empty() {
            let what = match filter_name {
                Some(name) => format!("no region named '{}' at admin level {}", name, admin_level),
                None => format!("no regions at admin level {}", admin_level),
            };
            return Err(Error::data_unavailable("boundaries", what));
        }
        debug!(admin_level, count = regions.len(), "loaded boundaries");
        Ok(regions)
    }
}
