//! Zonal statistics as mergeable partial states
//!
//! Every partial can be built per tile and folded together afterwards, so a
//! region's statistics never need the whole extent in memory:
//! - [`Moments`]: count, mean, M2, min, max and sum (Welford, merged with
//!   Chan et al.'s parallel formula)
//! - [`Histogram`]: sparse fixed-resolution bins for the median
//! - [`ClassAreas`]: area per class id

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::maybe_rayon::*;
use erosgis_core::raster::Raster;
use erosgis_core::{Error, PixelGrid, Region, Result};

/// Available zonal statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Statistic {
    Mean,
    Median,
    StdDev,
    Min,
    Max,
    Sum,
    Count,
}

impl Statistic {
    pub const ALL: [Statistic; 7] = [
        Statistic::Mean,
        Statistic::Median,
        Statistic::StdDev,
        Statistic::Min,
        Statistic::Max,
        Statistic::Sum,
        Statistic::Count,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Statistic::Mean => "mean",
            Statistic::Median => "median",
            Statistic::StdDev => "stddev",
            Statistic::Min => "min",
            Statistic::Max => "max",
            Statistic::Sum => "sum",
            Statistic::Count => "count",
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Running moments of a set of values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Moments {
    pub count: u64,
    pub mean: f64,
    /// Sum of squared deviations from the mean
    pub m2: f64,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
}

impl Default for Moments {
    fn default() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
        }
    }
}

impl Moments {
    /// Add one value; non-finite values are ignored
    #[inline]
    pub fn push(&mut self, v: f64) {
        if !v.is_finite() {
            return;
        }
        self.count += 1;
        let delta = v - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (v - self.mean);
        self.min = self.min.min(v);
        self.max = self.max.max(v);
        self.sum += v;
    }

    pub fn merge(&mut self, other: &Moments) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        let na = self.count as f64;
        let nb = other.count as f64;
        let n = na + nb;
        let delta = other.mean - self.mean;

        self.mean += delta * nb / n;
        self.m2 += other.m2 + delta * delta * na * nb / n;
        self.count += other.count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.sum += other.sum;
    }

    /// Population variance
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            return f64::NAN;
        }
        self.m2 / self.count as f64
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// Sparse histogram with fixed-width bins `[k·resolution, (k+1)·resolution)`.
///
/// Merging adds bin counts, so any split of the input gives the same
/// histogram. The median is reported at bin centres and is accurate to half
/// a bin width.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    resolution: f64,
    bins: BTreeMap<i64, u64>,
    count: u64,
}

impl Histogram {
    pub fn new(resolution: f64) -> Result<Self> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(Error::InvalidParameter {
                name: "median_resolution",
                value: resolution.to_string(),
                reason: "histogram resolution must be positive".into(),
            });
        }
        Ok(Self {
            resolution,
            bins: BTreeMap::new(),
            count: 0,
        })
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Add one value; non-finite values are ignored
    #[inline]
    pub fn push(&mut self, v: f64) {
        if !v.is_finite() {
            return;
        }
        let bin = (v / self.resolution).floor() as i64;
        *self.bins.entry(bin).or_insert(0) += 1;
        self.count += 1;
    }

    pub fn merge(&mut self, other: &Histogram) -> Result<()> {
        if other.resolution != self.resolution {
            return Err(Error::Algorithm(format!(
                "cannot merge histograms of resolution {} and {}",
                self.resolution, other.resolution
            )));
        }
        for (bin, n) in &other.bins {
            *self.bins.entry(*bin).or_insert(0) += n;
        }
        self.count += other.count;
        Ok(())
    }

    /// Centre of the bin holding the value of 0-based rank `rank`
    fn value_at_rank(&self, rank: u64) -> f64 {
        let mut seen = 0;
        for (bin, n) in &self.bins {
            seen += n;
            if seen > rank {
                return (*bin as f64 + 0.5) * self.resolution;
            }
        }
        f64::NAN
    }

    pub fn median(&self) -> f64 {
        if self.count == 0 {
            return f64::NAN;
        }
        let lo = self.value_at_rank((self.count - 1) / 2);
        let hi = self.value_at_rank(self.count / 2);
        (lo + hi) / 2.0
    }
}

/// Area (hectares) per class id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassAreas {
    areas: BTreeMap<u32, f64>,
    pixels: u64,
}

impl ClassAreas {
    #[inline]
    pub fn add(&mut self, class_id: u32, area_ha: f64) {
        *self.areas.entry(class_id).or_insert(0.0) += area_ha;
        self.pixels += 1;
    }

    pub fn merge(&mut self, other: &ClassAreas) {
        for (id, a) in &other.areas {
            *self.areas.entry(*id).or_insert(0.0) += a;
        }
        self.pixels += other.pixels;
    }

    /// Number of pixels that were counted into some class
    pub fn pixel_count(&self) -> u64 {
        self.pixels
    }

    pub fn areas(&self) -> &BTreeMap<u32, f64> {
        &self.areas
    }

    /// Areas for exactly `class_ids`, zero for classes never seen
    pub fn for_classes(&self, class_ids: &[u32]) -> BTreeMap<u32, f64> {
        class_ids
            .iter()
            .map(|id| (*id, self.areas.get(id).copied().unwrap_or(0.0)))
            .collect()
    }
}

/// Partial statistics of one region over one tile (or a fold of tiles)
#[derive(Debug, Clone, PartialEq)]
pub struct ZonalPartial {
    pub moments: Moments,
    pub histogram: Histogram,
}

impl ZonalPartial {
    pub fn new(median_resolution: f64) -> Result<Self> {
        Ok(Self {
            moments: Moments::default(),
            histogram: Histogram::new(median_resolution)?,
        })
    }

    #[inline]
    pub fn push(&mut self, v: f64) {
        self.moments.push(v);
        self.histogram.push(v);
    }

    pub fn merge(&mut self, other: &ZonalPartial) -> Result<()> {
        self.moments.merge(&other.moments);
        self.histogram.merge(&other.histogram)
    }

    pub fn count(&self) -> u64 {
        self.moments.count
    }

    /// Requested statistics, or `None` when no pixel contributed
    pub fn finish(&self, statistics: &[Statistic]) -> Option<BTreeMap<Statistic, f64>> {
        if self.moments.count == 0 {
            return None;
        }
        let m = &self.moments;
        Some(
            statistics
                .iter()
                .map(|s| {
                    let v = match s {
                        Statistic::Mean => m.mean,
                        Statistic::Median => self.histogram.median(),
                        Statistic::StdDev => m.std_dev(),
                        Statistic::Min => m.min,
                        Statistic::Max => m.max,
                        Statistic::Sum => m.sum,
                        Statistic::Count => m.count as f64,
                    };
                    (*s, v)
                })
                .collect(),
        )
    }
}

/// Row-major membership of every pixel centre of `grid` in `region`
pub fn region_mask(grid: &PixelGrid, region: &Region) -> Vec<bool> {
    let (rows, cols) = grid.shape();
    (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .map(|col| {
                    let (x, y) = grid.pixel_center(row, col);
                    region.contains_point(x, y)
                })
                .collect::<Vec<bool>>()
        })
        .collect()
}

fn check_mask(raster: &Raster<f64>, mask: &[bool]) -> Result<()> {
    if mask.len() != raster.len() {
        return Err(Error::SizeMismatch {
            er: raster.rows(),
            ec: raster.cols(),
            ar: mask.len(),
            ac: 1,
        });
    }
    Ok(())
}

/// Fold the valid, in-mask cells of `values` into `partial`
pub fn accumulate(values: &Raster<f64>, mask: &[bool], partial: &mut ZonalPartial) -> Result<()> {
    check_mask(values, mask)?;
    for (v, inside) in values.data().iter().zip(mask) {
        if *inside && v.is_finite() && !values.is_nodata(*v) {
            partial.push(*v);
        }
    }
    Ok(())
}

/// Add the area of in-mask cells whose class is one of `class_ids`.
///
/// `area` holds each cell's ground area in hectares; cells whose class is
/// no-data or outside `class_ids` are skipped.
pub fn accumulate_classes(
    classes: &Raster<f64>,
    area: &Raster<f64>,
    mask: &[bool],
    class_ids: &[u32],
    out: &mut ClassAreas,
) -> Result<()> {
    check_mask(classes, mask)?;
    if classes.shape() != area.shape() {
        return Err(Error::SizeMismatch {
            er: classes.rows(),
            ec: classes.cols(),
            ar: area.rows(),
            ac: area.cols(),
        });
    }
    for ((c, a), inside) in classes.data().iter().zip(area.data().iter()).zip(mask) {
        if !*inside || classes.is_nodata(*c) || a.is_nan() {
            continue;
        }
        let id = c.round() as u32;
        if class_ids.contains(&id) {
            out.add(id, *a);
        }
    }
    Ok(())
}
