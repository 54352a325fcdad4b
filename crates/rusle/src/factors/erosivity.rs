//! Rainfall erosivity (R)
//!
//! From a monthly precipitation series over a window of years:
//!
//! ```text
//! P_m = sum of precipitation in month m / years
//! P   = sum over m of P_m
//! MFI = sum over m of P_m^2 / (P + 1)      (modified Fournier index)
//! R   = a * MFI + b * P + c
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use erosgis_algebra::RasterHandle;
use erosgis_core::{Error, Result};

/// Linear model `R = a * MFI + b * P + c`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErosivityCoefficients {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Default for ErosivityCoefficients {
    fn default() -> Self {
        Self {
            a: 0.5,
            b: 0.363,
            c: 79.0,
        }
    }
}

/// A named subset of calendar months summed into a seasonal total
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Season {
    pub name: String,
    pub months: Vec<u8>,
}

impl Season {
    pub fn new(name: impl Into<String>, months: impl IntoIterator<Item = u8>) -> Self {
        Self {
            name: name.into(),
            months: months.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErosivityParams {
    pub coefficients: ErosivityCoefficients,
    pub seasons: Vec<Season>,
}

impl Default for ErosivityParams {
    fn default() -> Self {
        Self {
            coefficients: ErosivityCoefficients::default(),
            seasons: vec![Season::new("wet", 6..=9)],
        }
    }
}

impl ErosivityParams {
    pub fn validate(&self) -> Result<()> {
        let c = &self.coefficients;
        if ![c.a, c.b, c.c].iter().all(|v| v.is_finite()) {
            return Err(Error::InvalidParameter {
                name: "erosivity",
                value: format!("a={} b={} c={}", c.a, c.b, c.c),
                reason: "coefficients must be finite".into(),
            });
        }
        for season in &self.seasons {
            if season.months.is_empty() || season.months.iter().any(|m| !(1..=12).contains(m)) {
                return Err(Error::InvalidParameter {
                    name: "seasons",
                    value: season.name.clone(),
                    reason: "a season needs months in 1..=12".into(),
                });
            }
        }
        Ok(())
    }
}

/// Erosivity products
#[derive(Debug, Clone)]
pub struct Erosivity {
    /// Mean monthly totals `P_1 ..= P_12`
    pub monthly: Vec<RasterHandle>,
    /// Mean annual total `P`
    pub annual: RasterHandle,
    /// Mean seasonal totals by season name
    pub seasonal: BTreeMap<String, RasterHandle>,
    pub mfi: RasterHandle,
    pub r: RasterHandle,
}

/// Build the erosivity handles from a monthly precipitation collection
pub fn erosivity(precipitation: &RasterHandle, params: &ErosivityParams) -> Result<Erosivity> {
    params.validate()?;

    let monthly = (1..=12u8)
        .map(|m| precipitation.temporal_sum(&[m], true))
        .collect::<Result<Vec<_>>>()?;
    let all_months: Vec<u8> = (1..=12).collect();
    let annual = precipitation
        .temporal_sum(&all_months, true)?
        .rename("annual_precipitation");

    let seasonal = params
        .seasons
        .iter()
        .map(|s| {
            let total = precipitation.temporal_sum(&s.months, true)?;
            Ok((s.name.clone(), total.rename(format!("{}_precipitation", s.name))))
        })
        .collect::<Result<BTreeMap<_, _>>>()?;

    let denominator = annual.add(1.0)?;
    let mut mfi: Option<RasterHandle> = None;
    for p_m in &monthly {
        let term = p_m.pow(2.0)?.div(&denominator)?;
        mfi = Some(match mfi {
            Some(acc) => acc.add(&term)?,
            None => term,
        });
    }
    let mfi = mfi
        .ok_or_else(|| Error::Algorithm("no monthly totals".into()))?
        .rename("MFI");

    let c = &params.coefficients;
    let r = mfi.mul(c.a)?.add(&annual.mul(c.b)?)?.add(c.c)?.rename("R");

    Ok(Erosivity {
        monthly,
        annual,
        seasonal,
        mfi,
        r,
    })
}
