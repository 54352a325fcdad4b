//! Coordinate Reference System handling

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Coordinate Reference System identifier.
///
/// Only identity is tracked; no reprojection is performed anywhere in
/// ErosGIS. Two rasters can be combined only when their CRS are equivalent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    /// EPSG code if known
    epsg: Option<u32>,
    /// WKT representation
    wkt: Option<String>,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            epsg: Some(code),
            wkt: None,
        }
    }

    /// Create a CRS from a WKT string
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        Self {
            epsg: None,
            wkt: Some(wkt.into()),
        }
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Get WKT representation
    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// Whether coordinates are angular (degrees) rather than projected metres.
    ///
    /// Recognizes the common geographic EPSG codes and WKT `GEOGCS` roots.
    pub fn is_geographic(&self) -> bool {
        match self.epsg {
            Some(4326) | Some(4269) | Some(4258) | Some(4674) | Some(4979) => true,
            Some(_) => false,
            None => self
                .wkt
                .as_deref()
                .map(|w| {
                    let w = w.trim_start();
                    w.starts_with("GEOGCS") || w.starts_with("GEOGCRS")
                })
                .unwrap_or(false),
        }
    }

    /// Check if two CRS are equivalent
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        if let (Some(a), Some(b)) = (self.epsg, other.epsg) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (&self.wkt, &other.wkt) {
            return a == b;
        }
        false
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(wkt) = &self.wkt {
            return format!("WKT:{}", &wkt[..wkt.len().min(50)]);
        }
        "Unknown".to_string()
    }
}

impl FromStr for CRS {
    type Err = Error;

    /// Parses `EPSG:<code>` (case-insensitive) or falls back to WKT.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidParameter {
                name: "crs",
                value: s.to_string(),
                reason: "empty CRS identifier".into(),
            });
        }
        let upper = trimmed.to_ascii_uppercase();
        if let Some(code) = upper.strip_prefix("EPSG:") {
            let code = code.parse::<u32>().map_err(|_| Error::InvalidParameter {
                name: "crs",
                value: s.to_string(),
                reason: "EPSG code must be an unsigned integer".into(),
            })?;
            return Ok(CRS::from_epsg(code));
        }
        Ok(CRS::from_wkt(trimmed))
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

impl Default for CRS {
    fn default() -> Self {
        Self::wgs84()
    }
}
