//! Soil erodibility (K)
//!
//! Texture and organic carbon are first rescaled to percent, then
//!
//! ```text
//! f_sand = 0.2 + 0.3 * exp(-0.0256 * SAN * (1 - SIL / 100))
//! f_clsi = (SIL / (CLA + SIL))^0.3
//! f_orgc = (1 + OC)^-0.25
//! K      = 0.1317 * f_sand * f_clsi * f_orgc
//! ```

use serde::{Deserialize, Serialize};

use erosgis_algebra::RasterHandle;
use erosgis_core::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErodibilityCoefficients {
    /// Sand, silt and clay source units to percent (g/kg -> %)
    pub texture_scale: f64,
    /// Organic carbon source units to percent (dg/kg -> %)
    pub carbon_scale: f64,
    pub sand_base: f64,
    pub sand_amplitude: f64,
    pub sand_decay: f64,
    pub silt_clay_exponent: f64,
    pub carbon_exponent: f64,
    pub constant: f64,
}

impl Default for ErodibilityCoefficients {
    fn default() -> Self {
        Self {
            texture_scale: 0.1,
            carbon_scale: 0.01,
            sand_base: 0.2,
            sand_amplitude: 0.3,
            sand_decay: 0.0256,
            silt_clay_exponent: 0.3,
            carbon_exponent: -0.25,
            constant: 0.1317,
        }
    }
}

impl ErodibilityCoefficients {
    pub fn validate(&self) -> Result<()> {
        let values = [
            self.texture_scale,
            self.carbon_scale,
            self.sand_base,
            self.sand_amplitude,
            self.sand_decay,
            self.silt_clay_exponent,
            self.carbon_exponent,
            self.constant,
        ];
        if values.iter().all(|v| v.is_finite()) && self.texture_scale > 0.0 && self.carbon_scale > 0.0 {
            Ok(())
        } else {
            Err(Error::InvalidParameter {
                name: "erodibility",
                value: format!("{:?}", self),
                reason: "coefficients must be finite and unit scales positive".into(),
            })
        }
    }
}

/// Soil property handles in source units
#[derive(Debug, Clone)]
pub struct SoilInputs {
    pub sand: RasterHandle,
    pub silt: RasterHandle,
    pub clay: RasterHandle,
    pub organic_carbon: RasterHandle,
}

pub fn erodibility(soil: &SoilInputs, c: &ErodibilityCoefficients) -> Result<RasterHandle> {
    c.validate()?;

    let san = soil.sand.mul(c.texture_scale)?;
    let sil = soil.silt.mul(c.texture_scale)?;
    let cla = soil.clay.mul(c.texture_scale)?;
    let oc = soil.organic_carbon.mul(c.carbon_scale)?;

    // 1 - SIL / 100
    let silt_complement = sil.mul(-0.01)?.add(1.0)?;
    let f_sand = san
        .mul(&silt_complement)?
        .mul(-c.sand_decay)?
        .exp()?
        .mul(c.sand_amplitude)?
        .add(c.sand_base)?;
    let f_clsi = sil.div(&cla.add(&sil)?)?.pow(c.silt_clay_exponent)?;
    let f_orgc = oc.add(1.0)?.pow(c.carbon_exponent)?;

    Ok(f_sand.mul(&f_clsi)?.mul(&f_orgc)?.mul(c.constant)?.rename("K"))
}
