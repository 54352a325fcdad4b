//! Raster reclassification
//!
//! Two total mappings from cell values to output values:
//! - [`LookupTable`]: categorical codes to coefficients (exact matches)
//! - [`ClassificationScheme`]: contiguous half-open intervals to class ids

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::maybe_rayon::build_rows;
use erosgis_core::raster::Raster;
use erosgis_core::{Error, Result};

/// Categorical lookup keyed by integer code.
///
/// Because entries are keyed by code, two rules can never overlap. Codes
/// without an entry map to `default`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupTable {
    pub entries: BTreeMap<i64, f64>,
    pub default: f64,
}

impl LookupTable {
    pub fn new(entries: impl IntoIterator<Item = (i64, f64)>, default: f64) -> Self {
        Self {
            entries: entries.into_iter().collect(),
            default,
        }
    }

    /// Value for a cell; `NaN` stays `NaN`. Cells are rounded to the nearest code.
    #[inline]
    pub fn get(&self, value: f64) -> f64 {
        if value.is_nan() {
            return f64::NAN;
        }
        let code = value.round() as i64;
        self.entries.get(&code).copied().unwrap_or(self.default)
    }

    /// Check that every output, default included, lies in `[min, max]`
    pub fn validate_range(&self, name: &'static str, min: f64, max: f64) -> Result<()> {
        let outside = self
            .entries
            .iter()
            .map(|(code, v)| (code.to_string(), *v))
            .chain(std::iter::once(("default".to_string(), self.default)))
            .find(|(_, v)| !(v.is_finite() && *v >= min && *v <= max));
        match outside {
            Some((code, v)) => Err(Error::InvalidParameter {
                name,
                value: format!("{} -> {}", code, v),
                reason: format!("lookup values must lie in [{}, {}]", min, max),
            }),
            None => Ok(()),
        }
    }
}

/// One half-open interval `[lower, upper)` of a classification scheme
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassBin {
    pub lower: f64,
    pub upper: f64,
    pub class_id: u32,
}

/// Ordered, contiguous interval classification.
///
/// The first bin starts at `0`, the last ends at `+inf`, and consecutive
/// bins share their boundary. Values below `0` land in the first class,
/// no-data lands in `nodata_class`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationScheme {
    bins: Vec<ClassBin>,
    nodata_class: u32,
}

impl ClassificationScheme {
    pub const DEFAULT_NODATA_CLASS: u32 = 0;

    pub fn new(bins: Vec<ClassBin>, nodata_class: u32) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidParameter {
            name: "classification",
            value: format!("{:?}", bins),
            reason,
        };

        let (first, last) = match (bins.first(), bins.last()) {
            (Some(f), Some(l)) => (f, l),
            _ => return Err(invalid("at least one class is required".into())),
        };
        if first.lower != 0.0 {
            return Err(invalid("first lower bound must be 0".into()));
        }
        if last.upper != f64::INFINITY {
            return Err(invalid("last upper bound must be +inf".into()));
        }
        for bin in &bins {
            if !(bin.lower < bin.upper) {
                return Err(invalid(format!(
                    "bounds must be strictly increasing, got [{}, {})",
                    bin.lower, bin.upper
                )));
            }
            if bin.class_id == nodata_class {
                return Err(invalid(format!(
                    "class id {} collides with the no-data class",
                    bin.class_id
                )));
            }
        }
        for pair in bins.windows(2) {
            if pair[0].upper != pair[1].lower {
                return Err(invalid(format!(
                    "bins must be contiguous, gap between {} and {}",
                    pair[0].upper, pair[1].lower
                )));
            }
        }
        let mut ids: Vec<u32> = bins.iter().map(|b| b.class_id).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != bins.len() {
            return Err(invalid("class ids must be distinct".into()));
        }

        Ok(Self { bins, nodata_class })
    }

    /// Scheme from interior edges `0 = e0 < e1 < ... < en`, numbering the
    /// resulting `n + 1` classes from 1, the last one open-ended.
    pub fn from_edges(edges: &[f64], nodata_class: u32) -> Result<Self> {
        let mut bounds = edges.to_vec();
        bounds.push(f64::INFINITY);
        let bins = bounds
            .windows(2)
            .enumerate()
            .map(|(i, w)| ClassBin {
                lower: w[0],
                upper: w[1],
                class_id: i as u32 + 1,
            })
            .collect();
        Self::new(bins, nodata_class)
    }

    /// Soil-loss severity classes in t/ha/yr:
    /// `[0,5) [5,10) [10,20) [20,40) [40,80) [80,inf)` as classes 1..=6
    pub fn soil_loss_severity() -> Self {
        Self {
            bins: [0.0, 5.0, 10.0, 20.0, 40.0, 80.0, f64::INFINITY]
                .windows(2)
                .enumerate()
                .map(|(i, w)| ClassBin {
                    lower: w[0],
                    upper: w[1],
                    class_id: i as u32 + 1,
                })
                .collect(),
            nodata_class: Self::DEFAULT_NODATA_CLASS,
        }
    }

    pub fn bins(&self) -> &[ClassBin] {
        &self.bins
    }

    pub fn nodata_class(&self) -> u32 {
        self.nodata_class
    }

    pub fn class_ids(&self) -> Vec<u32> {
        self.bins.iter().map(|b| b.class_id).collect()
    }

    /// Class id of a single value
    pub fn classify_value(&self, value: f64) -> u32 {
        if value.is_nan() {
            return self.nodata_class;
        }
        // first bin whose upper bound exceeds the value
        let idx = self.bins.partition_point(|b| b.upper <= value);
        match self.bins.get(idx).or(self.bins.last()) {
            Some(bin) => bin.class_id,
            None => self.nodata_class,
        }
    }
}

/// Map every cell through a lookup table; no-data stays no-data.
pub fn lookup(raster: &Raster<f64>, table: &LookupTable) -> Result<Raster<f64>> {
    build_rows(raster, |row, out| {
        for (col, cell) in out.iter_mut().enumerate() {
            let val = unsafe { raster.get_unchecked(row, col) };
            if raster.is_nodata(val) {
                continue;
            }
            *cell = table.get(val);
        }
    })
}

/// Classify every cell into class ids.
///
/// No-data cells receive the scheme's no-data class, which is also set as
/// the output's no-data value.
pub fn classify(raster: &Raster<f64>, scheme: &ClassificationScheme) -> Result<Raster<f64>> {
    let sentinel = scheme.nodata_class() as f64;
    let mut output = build_rows(raster, |row, out| {
        for (col, cell) in out.iter_mut().enumerate() {
            let val = unsafe { raster.get_unchecked(row, col) };
            *cell = if raster.is_nodata(val) {
                sentinel
            } else {
                scheme.classify_value(val) as f64
            };
        }
    })?;
    output.set_nodata(Some(sentinel));
    Ok(output)
}
