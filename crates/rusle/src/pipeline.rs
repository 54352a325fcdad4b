//! Pipeline driver
//!
//! Loads every input over the study extent, builds the five factors at
//! their native scales, brings them to the compute scale and combines them
//! into soil loss and severity classes. Nothing is evaluated until regions
//! are summarized or bands exported.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::boundary::BoundaryProvider;
use crate::composition::{classify_severity, soil_loss};
use crate::config::{DatasetRef, RunConfig};
use crate::export::{BandStack, ExportedBand, RasterExporter};
use crate::factors::{cover, erodibility, erosivity, practice, topography, SoilInputs};
use crate::report::StatisticsReporter;
use erosgis_algebra::{DataProvider, RasterHandle};
use erosgis_algorithms::resample::ResampleMethod;
use erosgis_algorithms::statistics::Statistic;
use erosgis_core::{Error, Extent, Region, Result, TimeRange};
use erosgis_parallel::{ProcessingMode, TileExecutor, ZonalReducer, ZonalResult};

/// Factor, product and intermediate handles of one run, all at the compute
/// scale except the intermediates
#[derive(Debug, Clone)]
pub struct FactorStack {
    pub r: RasterHandle,
    pub k: RasterHandle,
    pub ls: RasterHandle,
    pub c: RasterHandle,
    pub p: RasterHandle,
    pub soil_loss: RasterHandle,
    pub class: RasterHandle,
    /// Mean annual precipitation
    pub annual: RasterHandle,
    pub mfi: RasterHandle,
    /// Mean seasonal precipitation by season name
    pub seasonal: BTreeMap<String, RasterHandle>,
}

impl FactorStack {
    /// Bands handed to exporters
    pub fn band_stack(&self) -> BandStack {
        BandStack::new()
            .with("soil_loss", self.soil_loss.clone())
            .with("class", self.class.clone())
            .with("R", self.r.clone())
            .with("K", self.k.clone())
            .with("LS", self.ls.clone())
            .with("C", self.c.clone())
            .with("P", self.p.clone())
    }
}

/// What a run produced
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// `None` when no region overlaps the inputs
    pub stack: Option<FactorStack>,
    pub results: Vec<ZonalResult>,
    pub exported: Vec<ExportedBand>,
}

pub struct Pipeline {
    config: RunConfig,
    provider: Arc<dyn DataProvider>,
    executor: TileExecutor,
}

impl Pipeline {
    pub fn new(config: RunConfig, provider: Arc<dyn DataProvider>) -> Result<Self> {
        Self::with_mode(config, provider, ProcessingMode::default())
    }

    pub fn with_mode(config: RunConfig, provider: Arc<dyn DataProvider>, mode: ProcessingMode) -> Result<Self> {
        config.validate()?;
        let executor = TileExecutor::new(config.budget(), config.retry, mode)?;
        Ok(Self {
            config,
            provider,
            executor,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn executor(&self) -> &TileExecutor {
        &self.executor
    }

    /// Union of the regions' bounding boxes
    pub fn study_extent(regions: &[Region]) -> Result<Extent> {
        regions
            .iter()
            .map(Region::bbox)
            .reduce(|a, b| a.union(&b))
            .ok_or_else(|| Error::InvalidParameter {
                name: "regions",
                value: "[]".into(),
                reason: "at least one region is required".into(),
            })
    }

    /// Area covered by every input dataset, `None` when they share none
    pub fn coverage(&self) -> Result<Option<Extent>> {
        let mut coverage: Option<Extent> = None;
        for (i, source) in self.config.datasets.all().into_iter().enumerate() {
            let extent = self.provider.describe(&source.dataset)?.extent;
            coverage = match (i, coverage) {
                (0, _) => Some(extent),
                (_, Some(c)) => c.intersection(&extent),
                (_, None) => return Ok(None),
            };
        }
        Ok(coverage)
    }

    /// Bounding box of the regions overlapping the inputs, clipped to their
    /// coverage
    fn covered_extent(&self, regions: &[Region]) -> Result<Option<Extent>> {
        let coverage = match self.coverage()? {
            Some(c) => c,
            None => return Ok(None),
        };
        Ok(regions
            .iter()
            .map(Region::bbox)
            .filter(|b| b.intersects(&coverage))
            .reduce(|a, b| a.union(&b))
            .and_then(|b| b.intersection(&coverage)))
    }

    fn load(&self, source: &DatasetRef, time_range: Option<TimeRange>, extent: &Extent) -> Result<RasterHandle> {
        RasterHandle::load(&self.provider, &source.dataset, &source.band, time_range, extent)
    }

    /// Build the factor graph over `extent`
    pub fn build(&self, extent: &Extent) -> Result<FactorStack> {
        let config = &self.config;
        let datasets = &config.datasets;
        let coefficients = &config.coefficients;
        let scale = config.compute_scale;
        let time_range = config.time_range()?;

        info!(%time_range, "building erosivity");
        let precipitation = self.load(&datasets.precipitation, Some(time_range), extent)?;
        let e = erosivity(&precipitation, &coefficients.erosivity)?;
        let r = e.r.resample(scale, ResampleMethod::Bilinear)?.rename("R");

        info!("building erodibility");
        let soil = SoilInputs {
            sand: self.load(&datasets.sand, None, extent)?,
            silt: self.load(&datasets.silt, None, extent)?,
            clay: self.load(&datasets.clay, None, extent)?,
            organic_carbon: self.load(&datasets.organic_carbon, None, extent)?,
        };
        let k = erodibility(&soil, &coefficients.erodibility)?
            .resample(scale, ResampleMethod::Bilinear)?
            .rename("K");

        info!("building topography");
        let elevation = self.load(&datasets.elevation, None, extent)?;
        let t = topography(&elevation, &coefficients.topography)?;
        let ls = t.ls.resample(scale, ResampleMethod::Bilinear)?.rename("LS");
        let slope = t.slope.resample(scale, ResampleMethod::Bilinear)?;

        info!("building cover and practice");
        let land_cover = self
            .load(&datasets.land_cover, None, extent)?
            .resample(scale, ResampleMethod::Nearest)?;
        let c = cover(&land_cover, &coefficients.cover)?;
        let p = practice(&slope, &land_cover, &coefficients.practice)?;

        let a = soil_loss(&r, &k, &ls, &c, &p)?;
        let class = classify_severity(&a, &config.scheme()?)?;
        info!(nodes = class.node_count(), scale, "factor graph ready");

        Ok(FactorStack {
            r,
            k,
            ls,
            c,
            p,
            soil_loss: a,
            class,
            annual: e.annual,
            mfi: e.mfi,
            seasonal: e.seasonal,
        })
    }

    /// Soil-loss statistics and class areas for each region, in order
    pub fn summarize(
        &self,
        stack: &FactorStack,
        regions: &[Region],
        reporter: &mut dyn StatisticsReporter,
    ) -> Result<Vec<ZonalResult>> {
        let reducer = ZonalReducer::new(self.executor, self.config.median_resolution)?;
        let class_ids = self.config.scheme()?.class_ids();

        let mut results = Vec::with_capacity(regions.len());
        for region in regions {
            let result = reducer.summarize(
                &stack.soil_loss,
                Some(&stack.class),
                region,
                &Statistic::ALL,
                &class_ids,
            )?;
            info!(
                region = region.name(),
                covered = result.is_covered(),
                exact = result.summary().map_or(true, |s| s.precision.is_exact()),
                "region summarized"
            );
            reporter.report(&result)?;
            results.push(result);
        }
        reporter.finish()?;
        Ok(results)
    }

    /// Build over the covered part of the regions' extent, summarize each
    /// region and optionally export the band stack.
    ///
    /// Regions outside the inputs come back as `NoCoverage`.
    pub fn run(
        &self,
        regions: &[Region],
        reporter: &mut dyn StatisticsReporter,
        exporter: Option<&mut dyn RasterExporter>,
    ) -> Result<RunOutcome> {
        Self::study_extent(regions)?;
        let extent = match self.covered_extent(regions)? {
            Some(extent) => extent,
            None => {
                warn!(regions = regions.len(), "no region overlaps the input datasets");
                let mut results = Vec::with_capacity(regions.len());
                for region in regions {
                    let result = ZonalResult::NoCoverage {
                        region: region.name().to_string(),
                    };
                    reporter.report(&result)?;
                    results.push(result);
                }
                reporter.finish()?;
                return Ok(RunOutcome {
                    stack: None,
                    results,
                    exported: Vec::new(),
                });
            }
        };
        info!(regions = regions.len(), ?extent, "starting run");
        let stack = self.build(&extent)?;
        let results = self.summarize(&stack, regions, reporter)?;

        let exported = match exporter {
            Some(exporter) => {
                info!(scale = self.config.export_scale, "exporting bands");
                let crs = stack.soil_loss.crs().clone();
                exporter.export(&stack.band_stack(), self.config.export_scale, &crs)?
            }
            None => Vec::new(),
        };
        Ok(RunOutcome {
            stack: Some(stack),
            results,
            exported,
        })
    }

    /// Load regions from `boundaries` and run
    pub fn run_boundaries(
        &self,
        boundaries: &dyn BoundaryProvider,
        admin_level: u8,
        filter_name: Option<&str>,
        reporter: &mut dyn StatisticsReporter,
        exporter: Option<&mut dyn RasterExporter>,
    ) -> Result<RunOutcome> {
        let regions = boundaries.regions(admin_level, filter_name)?;
        self.run(&regions, reporter, exporter)
    }
}
