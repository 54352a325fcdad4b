//! Zonal reduction of raster handles over regions
//!
//! Drives the [`TileExecutor`] over the tiles touching a region's bounding
//! box, accumulating mergeable partial states per tile. A pixel belongs to
//! the region when its centre lies inside the polygon; only pixels with data
//! contribute.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::executor::{ExecutionReport, Precision, TileContext, TileExecutor};
use erosgis_algebra::RasterHandle;
use erosgis_algorithms::statistics::{
    accumulate, accumulate_classes, region_mask, ClassAreas, Histogram, Statistic, ZonalPartial,
};
use erosgis_core::{Error, Region, Result};

/// Statistics of one region with data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZonalSummary {
    pub region: String,
    pub stats: BTreeMap<Statistic, f64>,
    /// Area in hectares per class id
    pub class_areas_ha: BTreeMap<u32, f64>,
    /// Contributing (non-no-data) pixels
    pub pixel_count: u64,
    pub precision: Precision,
}

/// Outcome of a zonal reduction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "coverage", rename_all = "snake_case")]
pub enum ZonalResult {
    Covered(ZonalSummary),
    /// No pixel with data falls inside the region
    NoCoverage { region: String },
}

impl ZonalResult {
    pub fn region(&self) -> &str {
        match self {
            ZonalResult::Covered(s) => &s.region,
            ZonalResult::NoCoverage { region } => region,
        }
    }

    pub fn summary(&self) -> Option<&ZonalSummary> {
        match self {
            ZonalResult::Covered(s) => Some(s),
            ZonalResult::NoCoverage { .. } => None,
        }
    }

    pub fn is_covered(&self) -> bool {
        self.summary().is_some()
    }
}

/// Per-tile accumulator
#[derive(Debug, Clone)]
struct RegionPartial {
    values: ZonalPartial,
    classes: ClassAreas,
}

impl RegionPartial {
    fn merge(mut self, other: RegionPartial) -> Result<Self> {
        self.values.merge(&other.values)?;
        self.classes.merge(&other.classes);
        Ok(self)
    }
}

/// Zonal statistics and class areas over regions
#[derive(Debug, Clone)]
pub struct ZonalReducer {
    executor: TileExecutor,
    median_resolution: f64,
}

impl ZonalReducer {
    pub fn new(executor: TileExecutor, median_resolution: f64) -> Result<Self> {
        Histogram::new(median_resolution)?;
        Ok(Self {
            executor,
            median_resolution,
        })
    }

    pub fn executor(&self) -> &TileExecutor {
        &self.executor
    }

    /// `statistics` of `handle` inside `region`, at the handle's scale
    pub fn reduce(&self, handle: &RasterHandle, region: &Region, statistics: &[Statistic]) -> Result<ZonalResult> {
        self.summarize(handle, None, region, statistics, &[])
    }

    /// Area (ha) of each of `class_ids` in `classes` inside `region`
    pub fn class_areas(&self, classes: &RasterHandle, region: &Region, class_ids: &[u32]) -> Result<ZonalResult> {
        self.run(None, Some((classes, class_ids)), region, &[])
    }

    /// Statistics of `values` and, optionally, class areas of `classes` in
    /// one pass; both handles are evaluated with a shared per-tile memo.
    pub fn summarize(
        &self,
        values: &RasterHandle,
        classes: Option<&RasterHandle>,
        region: &Region,
        statistics: &[Statistic],
        class_ids: &[u32],
    ) -> Result<ZonalResult> {
        self.run(Some(values), classes.map(|c| (c, class_ids)), region, statistics)
    }

    fn run(
        &self,
        values: Option<&RasterHandle>,
        classes: Option<(&RasterHandle, &[u32])>,
        region: &Region,
        statistics: &[Statistic],
    ) -> Result<ZonalResult> {
        let reference = match (values, classes) {
            (Some(v), _) => v,
            (None, Some((c, _))) => c,
            (None, None) => return Err(Error::Algorithm("nothing to reduce".into())),
        };
        if let (Some(v), Some((c, _))) = (values, classes) {
            if !v.crs().is_equivalent(c.crs()) || v.scale() != c.scale() {
                return Err(Error::incompatible(format!(
                    "'{}' and '{}' are not on the same grid",
                    v.name(),
                    c.name()
                )));
            }
        }

        let no_coverage = || ZonalResult::NoCoverage {
            region: region.name().to_string(),
        };
        let bbox = region.bbox();
        let extent = match reference.extent().intersection(&bbox) {
            Some(e) => e,
            None => {
                debug!(region = region.name(), "region outside handle extent");
                return Ok(no_coverage());
            }
        };

        let area = classes.map(|(c, _)| c.pixel_area()).transpose()?;
        let mut handles: Vec<&RasterHandle> = values.into_iter().collect();
        if let (Some((c, _)), Some(a)) = (classes, area.as_ref()) {
            handles.push(c);
            handles.push(a);
        }

        let empty = RegionPartial {
            values: ZonalPartial::new(self.median_resolution)?,
            classes: ClassAreas::default(),
        };
        let per_tile = |ctx: &mut TileContext| -> Result<RegionPartial> {
            let mut partial = empty.clone();
            let mask = region_mask(ctx.grid(), region);
            if !mask.iter().any(|inside| *inside) {
                return Ok(partial);
            }
            if let Some(v) = values {
                let raster = ctx.evaluate(v)?;
                accumulate(&raster, &mask, &mut partial.values)?;
            }
            if let (Some((c, ids)), Some(a)) = (classes, area.as_ref()) {
                let class_raster = ctx.evaluate(c)?;
                let area_raster = ctx.evaluate(a)?;
                accumulate_classes(&class_raster, &area_raster, &mask, ids, &mut partial.classes)?;
            }
            Ok(partial)
        };

        let reduced = self.executor.reduce(
            &handles,
            &extent,
            reference.scale(),
            Some(&bbox),
            per_tile,
            RegionPartial::merge,
        )?;
        log_report(region, &reduced.report);

        let partial = match reduced.value {
            Some(p) => p,
            None => return Ok(no_coverage()),
        };
        let pixel_count = match values {
            Some(_) => partial.values.count(),
            None => partial.classes.pixel_count(),
        };
        if pixel_count == 0 {
            return Ok(no_coverage());
        }

        let class_areas_ha = match classes {
            Some((_, ids)) => partial.classes.for_classes(ids),
            None => BTreeMap::new(),
        };
        Ok(ZonalResult::Covered(ZonalSummary {
            region: region.name().to_string(),
            stats: partial.values.finish(statistics).unwrap_or_default(),
            class_areas_ha,
            pixel_count,
            precision: reduced.precision,
        }))
    }
}

fn log_report(region: &Region, report: &ExecutionReport) {
    debug!(
        region = region.name(),
        tiles = report.tiles,
        attempts = report.attempts,
        scale = report.effective_scale,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "zonal reduction finished"
    );
}
