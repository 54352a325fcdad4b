//! Tile executor
//!
//! Evaluates raster handles over an extent tile by tile, under a pixel
//! ceiling, a per-tile pixel budget and an optional wall-clock limit. A
//! request moves through
//!
//! ```text
//! Planned -> Tiling -> Executing -> Merged
//!                           |
//!                           +-> Degraded -> Planned (coarser scale) ...
//!                           +-> Failed
//! ```
//!
//! Budget overruns are retried at a coarser scale per [`RetryPolicy`]; the
//! result then carries [`Precision::Approximate`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::strategy::{ParallelStrategy, ProcessingMode};
use crate::tiled::{Tile, TileIterator};
use erosgis_algebra::{Evaluator, RasterHandle};
use erosgis_core::{Error, Extent, PixelGrid, Raster, Result};

/// Lifecycle states of an execution request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    Planned,
    Tiling,
    Executing,
    Merged,
    Degraded,
    Failed,
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionState::Planned => "planned",
            ExecutionState::Tiling => "tiling",
            ExecutionState::Executing => "executing",
            ExecutionState::Merged => "merged",
            ExecutionState::Degraded => "degraded",
            ExecutionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Resource limits of one request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExecutionBudget {
    /// Maximum pixels of the snapped request grid
    pub pixel_ceiling: u64,
    /// Maximum pixels per tile, shared between the monthly layers a tile
    /// holds at once
    pub tile_budget: u64,
    /// Wall-clock limit per attempt
    pub time_limit: Option<Duration>,
}

impl Default for ExecutionBudget {
    fn default() -> Self {
        Self {
            pixel_ceiling: 100_000_000,
            tile_budget: 512 * 512,
            time_limit: None,
        }
    }
}

impl ExecutionBudget {
    pub fn validate(&self) -> Result<()> {
        if self.pixel_ceiling == 0 {
            return Err(Error::InvalidParameter {
                name: "pixel_ceiling",
                value: "0".into(),
                reason: "must be positive".into(),
            });
        }
        if self.tile_budget == 0 {
            return Err(Error::InvalidParameter {
                name: "tile_budget",
                value: "0".into(),
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}

/// Degrade policy: how often and how much coarser to retry after a budget
/// overrun
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first, exact one
    pub max_attempts: u32,
    /// Scale multiplier applied before each retry
    pub backoff: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::InvalidParameter {
                name: "max_attempts",
                value: "0".into(),
                reason: "at least one attempt is required".into(),
            });
        }
        if !(self.backoff.is_finite() && self.backoff > 1.0) {
            return Err(Error::InvalidParameter {
                name: "backoff",
                value: self.backoff.to_string(),
                reason: "back-off factor must be greater than 1".into(),
            });
        }
        Ok(())
    }
}

/// Whether a result was computed at the requested scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Precision {
    Exact,
    Approximate { effective_scale: f64 },
}

impl Precision {
    pub fn is_exact(&self) -> bool {
        matches!(self, Precision::Exact)
    }
}

/// What happened while serving a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// State transitions in order
    pub states: Vec<ExecutionState>,
    pub attempts: u32,
    pub requested_scale: f64,
    pub effective_scale: f64,
    /// Tiles evaluated in the last attempt
    pub tiles: usize,
    /// Pixel budget of each tile once divided between stacked layers
    pub tile_pixels: u64,
    pub pixels: u64,
    pub elapsed: Duration,
}

impl ExecutionReport {
    fn new(scale: f64) -> Self {
        Self {
            states: Vec::new(),
            attempts: 0,
            requested_scale: scale,
            effective_scale: scale,
            tiles: 0,
            tile_pixels: 0,
            pixels: 0,
            elapsed: Duration::ZERO,
        }
    }

    fn enter(&mut self, state: ExecutionState) {
        debug!(%state, attempt = self.attempts, scale = self.effective_scale, "executor state");
        self.states.push(state);
    }

    pub fn final_state(&self) -> Option<ExecutionState> {
        self.states.last().copied()
    }

    pub fn was_degraded(&self) -> bool {
        self.states.contains(&ExecutionState::Degraded)
    }
}

/// Per-tile evaluation context handed to reducers.
///
/// Handles are evaluated on the tile grid grown by the request halo and
/// cropped back, so neighbourhood kernels see full windows at tile edges.
/// All handles of one tile share a memo.
#[derive(Debug)]
pub struct TileContext {
    tile: Tile,
    grid: PixelGrid,
    halo: usize,
    evaluator: Evaluator,
}

impl TileContext {
    fn new(tile: Tile, grid: PixelGrid, halo: usize, deadline: Option<Instant>) -> Self {
        Self {
            tile,
            grid,
            halo,
            evaluator: Evaluator::with_deadline(deadline),
        }
    }

    pub fn tile(&self) -> &Tile {
        &self.tile
    }

    /// Grid of the tile without halo
    pub fn grid(&self) -> &PixelGrid {
        &self.grid
    }

    /// Pixels of `handle` on this tile
    pub fn evaluate(&mut self, handle: &RasterHandle) -> Result<Raster<f64>> {
        if handle.halo() > self.halo {
            return Err(Error::Algorithm(format!(
                "'{}' needs a halo of {} pixels, request was planned with {}",
                handle.name(),
                handle.halo(),
                self.halo
            )));
        }
        let padded = self.grid.expand(self.halo);
        let raster = self.evaluator.evaluate(handle, &padded)?;
        raster.crop(self.halo, self.halo, self.grid.rows, self.grid.cols)
    }
}

/// Result of [`TileExecutor::reduce`]
#[derive(Debug, Clone)]
pub struct Reduced<S> {
    /// Folded partial state; `None` when no tile was evaluated
    pub value: Option<S>,
    pub precision: Precision,
    pub report: ExecutionReport,
}

/// Result of [`TileExecutor::materialize`]
#[derive(Debug, Clone)]
pub struct Materialized {
    pub raster: Raster<f64>,
    pub precision: Precision,
    pub report: ExecutionReport,
}

/// Tiles of one attempt and their partial results, in tile order
struct Attempt<S> {
    grid: PixelGrid,
    parts: Vec<(Tile, S)>,
}

/// Evaluates handles tile by tile under an [`ExecutionBudget`]
#[derive(Debug, Clone, Copy, Default)]
pub struct TileExecutor {
    budget: ExecutionBudget,
    retry: RetryPolicy,
    mode: ProcessingMode,
}

impl TileExecutor {
    pub fn new(budget: ExecutionBudget, retry: RetryPolicy, mode: ProcessingMode) -> Result<Self> {
        budget.validate()?;
        retry.validate()?;
        Ok(Self {
            budget,
            retry,
            mode,
        })
    }

    pub fn budget(&self) -> &ExecutionBudget {
        &self.budget
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn mode(&self) -> ProcessingMode {
        self.mode
    }

    /// Evaluate `handle` over `extent` into one raster
    pub fn materialize(&self, handle: &RasterHandle, extent: &Extent, scale: f64) -> Result<Materialized> {
        let layers = RasterHandle::stacked_layers(&[handle]);
        let (attempt, precision, report) = self.with_retry(scale, |scale, report| {
            self.run(handle.halo(), layers, extent, scale, None, report, |ctx| ctx.evaluate(handle))
        })?;

        let grid = attempt.grid;
        let mut raster = Raster::on_grid(&grid, f64::NAN);
        raster.set_crs(Some(handle.crs().clone()));
        if let Some((_, first)) = attempt.parts.first() {
            raster.set_nodata(first.nodata());
        }
        for (tile, part) in &attempt.parts {
            raster.paste(part, tile.row_offset, tile.col_offset)?;
        }
        Ok(Materialized {
            raster,
            precision,
            report,
        })
    }

    /// Fold per-tile partial states over `extent` without materializing it.
    ///
    /// `per_tile` runs once per tile (tiles outside `filter` are skipped);
    /// partials are merged in tile order. `handles` are the handles
    /// `per_tile` will evaluate and fix the halo of the request.
    pub fn reduce<S, F, M>(
        &self,
        handles: &[&RasterHandle],
        extent: &Extent,
        scale: f64,
        filter: Option<&Extent>,
        per_tile: F,
        merge: M,
    ) -> Result<Reduced<S>>
    where
        S: Send,
        F: Fn(&mut TileContext) -> Result<S> + Sync + Send,
        M: Fn(S, S) -> Result<S>,
    {
        let halo = handles.iter().map(|h| h.halo()).max().unwrap_or(0);
        let layers = RasterHandle::stacked_layers(handles);
        let (attempt, precision, report) = self.with_retry(scale, |scale, report| {
            self.run(halo, layers, extent, scale, filter, report, &per_tile)
        })?;

        let mut value: Option<S> = None;
        for (_, part) in attempt.parts {
            value = Some(match value {
                None => part,
                Some(acc) => merge(acc, part)?,
            });
        }
        Ok(Reduced {
            value,
            precision,
            report,
        })
    }

    fn with_retry<T, A>(&self, scale: f64, mut attempt: A) -> Result<(T, Precision, ExecutionReport)>
    where
        A: FnMut(f64, &mut ExecutionReport) -> Result<T>,
    {
        let start = Instant::now();
        let mut report = ExecutionReport::new(scale);
        let mut effective = scale;

        for n in 1..=self.retry.max_attempts {
            report.attempts = n;
            report.effective_scale = effective;
            match attempt(effective, &mut report) {
                Ok(value) => {
                    report.enter(ExecutionState::Merged);
                    report.elapsed = start.elapsed();
                    let precision = if n == 1 {
                        Precision::Exact
                    } else {
                        Precision::Approximate {
                            effective_scale: effective,
                        }
                    };
                    return Ok((value, precision, report));
                }
                Err(e) if e.is_recoverable() && n < self.retry.max_attempts => {
                    report.enter(ExecutionState::Degraded);
                    let next = effective * self.retry.backoff;
                    warn!(
                        attempt = n,
                        from = effective,
                        to = next,
                        error = %e,
                        "budget exceeded, degrading to a coarser scale"
                    );
                    effective = next;
                }
                Err(e) => {
                    report.enter(ExecutionState::Failed);
                    warn!(attempts = n, scale = effective, error = %e, "execution failed");
                    return Err(match e {
                        Error::BudgetExceeded { reason } => Error::budget(format!(
                            "{} (gave up after {} attempts, last scale {})",
                            reason, n, effective
                        )),
                        other => other,
                    });
                }
            }
        }
        // max_attempts >= 1 is validated, so the loop always returns
        Err(Error::budget("no execution attempts allowed"))
    }

    #[allow(clippy::too_many_arguments)]
    fn run<S, F>(
        &self,
        halo: usize,
        layers: u64,
        extent: &Extent,
        scale: f64,
        filter: Option<&Extent>,
        report: &mut ExecutionReport,
        per_tile: F,
    ) -> Result<Attempt<S>>
    where
        S: Send,
        F: Fn(&mut TileContext) -> Result<S> + Sync + Send,
    {
        let started = Instant::now();
        report.enter(ExecutionState::Planned);
        let grid = PixelGrid::snapped(extent, scale)?;
        report.pixels = grid.pixel_count();
        if grid.pixel_count() > self.budget.pixel_ceiling {
            return Err(Error::budget(format!(
                "{} pixels at scale {} exceed the ceiling of {}",
                grid.pixel_count(),
                scale,
                self.budget.pixel_ceiling
            )));
        }

        report.enter(ExecutionState::Tiling);
        let tile_pixels = (self.budget.tile_budget / layers).max(1);
        report.tile_pixels = tile_pixels;
        let tiles: Vec<Tile> = TileIterator::for_grid(&grid, tile_pixels)?
            .filter(|t| filter.map_or(true, |f| t.grid(&grid).extent().intersects(f)))
            .collect();
        report.tiles = tiles.len();

        report.enter(ExecutionState::Executing);
        let deadline = self.budget.time_limit.map(|limit| started + limit);
        let failed = AtomicBool::new(false);
        let outcomes = self.mode.par_map(0..tiles.len(), |i| {
            if failed.load(Ordering::Relaxed) {
                return None;
            }
            let tile = tiles[i];
            let outcome = match deadline {
                Some(d) if Instant::now() >= d => Err(Error::budget(format!(
                    "time limit exceeded before tile {}",
                    tile.index
                ))),
                _ => {
                    let mut ctx = TileContext::new(tile, tile.grid(&grid), halo, deadline);
                    per_tile(&mut ctx)
                }
            };
            if outcome.is_err() {
                failed.store(true, Ordering::Relaxed);
            }
            Some(outcome.map(|s| (tile, s)))
        })?;

        let mut parts = Vec::with_capacity(tiles.len());
        let mut first_error = None;
        for outcome in outcomes.into_iter().flatten() {
            match outcome {
                Ok(part) => parts.push(part),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(Attempt { grid, parts }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use erosgis_algebra::{BandInfo, DataProvider, DatasetInfo, FetchRequest, MemoryProvider};
    use erosgis_core::{Layer, Period, CRS};

    fn dem_provider() -> Arc<dyn DataProvider> {
        let grid = PixelGrid::new(0.0, 100.0, 10.0, 10, 10);
        let mut dem = Raster::on_grid(&grid, 0.0);
        for row in 0..10 {
            for col in 0..10 {
                let v = (row * row) as f64 + 3.0 * col as f64;
                dem.set(row, col, v).unwrap();
            }
        }
        dem.set_crs(Some(CRS::from_epsg(32633)));
        let mut p = MemoryProvider::new();
        p.insert_static("dem", BandInfo::continuous("elevation"), dem)
            .unwrap();
        Arc::new(p)
    }

    fn extent() -> Extent {
        Extent::new(0.0, 0.0, 100.0, 100.0)
    }

    fn slope_handle(p: &Arc<dyn DataProvider>) -> RasterHandle {
        RasterHandle::load(p, "dem", "elevation", None, &extent())
            .unwrap()
            .slope(1.0)
            .unwrap()
    }

    fn executor(tile_budget: u64, mode: ProcessingMode) -> TileExecutor {
        let budget = ExecutionBudget {
            tile_budget,
            ..ExecutionBudget::default()
        };
        TileExecutor::new(budget, RetryPolicy::default(), mode).unwrap()
    }

    fn same(a: &Raster<f64>, b: &Raster<f64>) -> bool {
        a.shape() == b.shape()
            && a.data()
                .iter()
                .zip(b.data().iter())
                .all(|(x, y)| (x.is_nan() && y.is_nan()) || (x - y).abs() < 1e-12)
    }

    #[test]
    fn test_materialize_is_tiling_invariant() {
        let p = dem_provider();
        let slope = slope_handle(&p);

        let whole = executor(10_000, ProcessingMode::Sequential)
            .materialize(&slope, &extent(), 10.0)
            .unwrap();
        assert_eq!(whole.report.tiles, 1);

        let tiled = executor(9, ProcessingMode::Parallel)
            .materialize(&slope, &extent(), 10.0)
            .unwrap();
        assert_eq!(tiled.report.tiles, 16);
        assert!(same(&whole.raster, &tiled.raster));
        assert!(tiled.precision.is_exact());
        assert!(tiled.raster.get(5, 5).unwrap().is_finite());
        assert_eq!(
            tiled.report.states,
            vec![
                ExecutionState::Planned,
                ExecutionState::Tiling,
                ExecutionState::Executing,
                ExecutionState::Merged
            ]
        );
    }

    #[test]
    fn test_degrade_to_coarser_scale() {
        let p = dem_provider();
        let dem = RasterHandle::load(&p, "dem", "elevation", None, &extent()).unwrap();
        let budget = ExecutionBudget {
            pixel_ceiling: 50,
            ..ExecutionBudget::default()
        };
        let ex = TileExecutor::new(budget, RetryPolicy::default(), ProcessingMode::Sequential).unwrap();

        let out = ex.materialize(&dem, &extent(), 10.0).unwrap();
        assert_eq!(out.precision, Precision::Approximate { effective_scale: 20.0 });
        assert_eq!(out.raster.shape(), (5, 5));
        assert!(out.report.was_degraded());
        assert_eq!(out.report.attempts, 2);
        assert_eq!(out.report.final_state(), Some(ExecutionState::Merged));
    }

    #[test]
    fn test_retries_exhausted() {
        let p = dem_provider();
        let dem = RasterHandle::load(&p, "dem", "elevation", None, &extent()).unwrap();
        let budget = ExecutionBudget {
            pixel_ceiling: 50,
            ..ExecutionBudget::default()
        };
        let retry = RetryPolicy {
            max_attempts: 1,
            backoff: 2.0,
        };
        let ex = TileExecutor::new(budget, retry, ProcessingMode::Sequential).unwrap();
        assert!(matches!(
            ex.materialize(&dem, &extent(), 10.0),
            Err(Error::BudgetExceeded { .. })
        ));
    }

    #[test]
    fn test_time_limit() {
        let p = dem_provider();
        let dem = RasterHandle::load(&p, "dem", "elevation", None, &extent()).unwrap();
        let budget = ExecutionBudget {
            time_limit: Some(Duration::ZERO),
            ..ExecutionBudget::default()
        };
        let ex = TileExecutor::new(budget, RetryPolicy::default(), ProcessingMode::Parallel).unwrap();
        assert!(matches!(
            ex.materialize(&dem, &extent(), 10.0),
            Err(Error::BudgetExceeded { .. })
        ));
    }

    #[derive(Debug)]
    struct Unreachable;

    impl DataProvider for Unreachable {
        fn datasets(&self) -> Vec<String> {
            vec!["remote".into()]
        }

        fn describe(&self, dataset: &str) -> Result<DatasetInfo> {
            Ok(DatasetInfo {
                name: dataset.to_string(),
                extent: extent(),
                crs: CRS::from_epsg(32633),
                scale: 10.0,
                bands: vec![BandInfo::continuous("v")],
                time_range: None,
            })
        }

        fn fetch(&self, request: &FetchRequest) -> Result<Vec<Layer>> {
            Err(Error::data_unavailable(&request.dataset, "server unreachable"))
        }
    }

    #[test]
    fn test_provider_errors_are_not_retried() {
        let p: Arc<dyn DataProvider> = Arc::new(Unreachable);
        let h = RasterHandle::load(&p, "remote", "v", None, &extent()).unwrap();
        let err = executor(16, ProcessingMode::Parallel)
            .materialize(&h, &extent(), 10.0)
            .unwrap_err();
        assert!(matches!(err, Error::DataUnavailable { .. }));
    }

    #[test]
    fn test_reduce_with_filter() {
        let p = dem_provider();
        let dem = RasterHandle::load(&p, "dem", "elevation", None, &extent()).unwrap();
        let ex = executor(25, ProcessingMode::Parallel);

        let count = |ctx: &mut TileContext| -> Result<usize> {
            let r = ctx.evaluate(&dem)?;
            Ok(r.data().iter().filter(|v| v.is_finite()).count())
        };
        let all = ex
            .reduce(&[&dem], &extent(), 10.0, None, count, |a, b| Ok(a + b))
            .unwrap();
        assert_eq!(all.value, Some(100));
        assert_eq!(all.report.tiles, 4);

        let corner = Extent::new(0.0, 60.0, 30.0, 100.0);
        let some = ex
            .reduce(&[&dem], &extent(), 10.0, Some(&corner), count, |a, b| Ok(a + b))
            .unwrap();
        assert_eq!(some.report.tiles, 1);
        assert_eq!(some.value, Some(25));

        let nowhere = Extent::new(500.0, 500.0, 600.0, 600.0);
        let none = ex
            .reduce(&[&dem], &extent(), 10.0, Some(&nowhere), count, |a, b| Ok(a + b))
            .unwrap();
        assert_eq!(none.value, None);
    }

    #[test]
    fn test_monthly_layers_share_the_tile_budget() {
        let grid = PixelGrid::new(0.0, 100.0, 10.0, 10, 10);
        let series = (2001..=2002)
            .flat_map(|y| (1..=12).map(move |m| (y, m)))
            .map(|(y, m)| {
                let mut r = Raster::on_grid(&grid, 1.0);
                r.set_crs(Some(CRS::from_epsg(32633)));
                (Period::new(y, m).unwrap(), r)
            })
            .collect();
        let mut memory = MemoryProvider::new();
        memory
            .insert_series("rain", BandInfo::continuous("precipitation"), series)
            .unwrap();
        let memory = Arc::new(memory);
        let p: Arc<dyn DataProvider> = memory.clone();

        let rain = RasterHandle::load(&p, "rain", "precipitation", None, &extent()).unwrap();
        let annual = rain.temporal_sum(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12], true).unwrap();
        let january = rain.temporal_sum(&[1], true).unwrap();
        let total = annual.add(&january).unwrap();

        // 24 layers x 25 pixels: 5 x 5 tiles
        let out = executor(24 * 25, ProcessingMode::Sequential)
            .materialize(&total, &extent(), 10.0)
            .unwrap();
        assert_eq!(out.report.tile_pixels, 25);
        assert_eq!(out.report.tiles, 4);
        // both sums read the same stack: one fetch per tile
        assert_eq!(memory.fetch_count(), 4);
        assert_eq!(out.raster.get(7, 2).unwrap(), 13.0);
    }

    #[test]
    fn test_invalid_configuration() {
        let zero = ExecutionBudget {
            tile_budget: 0,
            ..ExecutionBudget::default()
        };
        assert!(TileExecutor::new(zero, RetryPolicy::default(), ProcessingMode::Parallel).is_err());
        let flat = RetryPolicy {
            max_attempts: 3,
            backoff: 1.0,
        };
        assert!(TileExecutor::new(ExecutionBudget::default(), flat, ProcessingMode::Parallel).is_err());
    }
}
