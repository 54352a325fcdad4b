//! Topographic factor (LS)
//!
//! ```text
//! L  = (lambda / 22.13)^m
//! S  = a1 * sin(theta) + b1    theta <  9 degrees
//!      a2 * sin(theta) + b2    otherwise
//! LS = L * max(S, 0)
//! ```
//!
//! with theta the Horn slope of the elevation model.

use serde::{Deserialize, Serialize};

use erosgis_algebra::RasterHandle;
use erosgis_core::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopographyCoefficients {
    /// Slope length lambda in metres
    pub slope_length: f64,
    pub reference_length: f64,
    /// Slope length exponent m
    pub length_exponent: f64,
    /// Degrees separating the gentle and steep branches of S
    pub steep_threshold: f64,
    pub gentle_slope: f64,
    pub gentle_intercept: f64,
    pub steep_slope: f64,
    pub steep_intercept: f64,
    /// Elevation units to horizontal units
    pub z_factor: f64,
}

impl Default for TopographyCoefficients {
    fn default() -> Self {
        Self {
            slope_length: 30.0,
            reference_length: 22.13,
            length_exponent: 0.4,
            steep_threshold: 9.0,
            gentle_slope: 10.8,
            gentle_intercept: 0.0,
            steep_slope: 16.8,
            steep_intercept: -0.5,
            z_factor: 1.0,
        }
    }
}

impl TopographyCoefficients {
    pub fn validate(&self) -> Result<()> {
        if !(self.slope_length > 0.0 && self.reference_length > 0.0 && self.z_factor > 0.0) {
            return Err(Error::InvalidParameter {
                name: "topography",
                value: format!(
                    "slope_length={} reference_length={} z_factor={}",
                    self.slope_length, self.reference_length, self.z_factor
                ),
                reason: "lengths and z_factor must be positive".into(),
            });
        }
        Ok(())
    }

    /// Length sub-factor L, constant over the grid
    pub fn length_factor(&self) -> f64 {
        (self.slope_length / self.reference_length).powf(self.length_exponent)
    }
}

#[derive(Debug, Clone)]
pub struct Topography {
    /// Slope in degrees
    pub slope: RasterHandle,
    pub s: RasterHandle,
    pub ls: RasterHandle,
}

pub fn topography(elevation: &RasterHandle, c: &TopographyCoefficients) -> Result<Topography> {
    c.validate()?;

    let slope = elevation.slope(c.z_factor)?.rename("slope");
    let sin = slope.to_radians()?.sin()?;
    let gentle = sin.mul(c.gentle_slope)?.add(c.gentle_intercept)?;
    let steep = sin.mul(c.steep_slope)?.add(c.steep_intercept)?;
    let s = RasterHandle::where_(&slope.lt(c.steep_threshold)?, &gentle, &steep)?
        .max(0.0)?
        .rename("S");
    let ls = s.mul(c.length_factor())?.rename("LS");

    Ok(Topography { slope, s, ls })
}
