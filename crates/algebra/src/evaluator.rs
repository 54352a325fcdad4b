//! Request-scoped evaluation of raster handles
//!
//! An [`Evaluator`] produces the pixels of a handle on one [`PixelGrid`].
//! Every node result is memoized under `(node id, grid)` for the lifetime of
//! the evaluator, so a node read by several consumers is computed once.
//! Nothing is cached across evaluators.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::trace;

use crate::handle::{Operand, Operation, RasterHandle};
use crate::provider::FetchRequest;
use erosgis_algorithms::imagery::{self, classify, lookup, mask, select, unary};
use erosgis_algorithms::resample::resample;
use erosgis_algorithms::statistics::temporal_sum;
use erosgis_algorithms::terrain::{pixel_area, slope, SlopeParams};
use erosgis_core::{Error, Extent, Layer, PixelGrid, Raster, Result};

/// Value of an evaluated node
#[derive(Debug, Clone)]
pub enum Value {
    Image(Arc<Raster<f64>>),
    /// Monthly layers of a temporal load, ordered by period
    Stack(Arc<Vec<Layer>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct GridKey {
    origin_x: u64,
    origin_y: u64,
    scale: u64,
    rows: usize,
    cols: usize,
}

impl From<&PixelGrid> for GridKey {
    fn from(g: &PixelGrid) -> Self {
        Self {
            origin_x: g.origin_x.to_bits(),
            origin_y: g.origin_y.to_bits(),
            scale: g.scale.to_bits(),
            rows: g.rows,
            cols: g.cols,
        }
    }
}

/// Walks a handle graph for one request, memoizing node results.
#[derive(Debug, Default)]
pub struct Evaluator {
    memo: HashMap<(u64, GridKey), Value>,
    deadline: Option<Instant>,
    computed: usize,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail with `BudgetExceeded` once `deadline` has passed
    pub fn with_deadline(deadline: Option<Instant>) -> Self {
        Self {
            deadline,
            ..Self::default()
        }
    }

    /// Number of nodes computed (memo misses) so far
    pub fn computed_nodes(&self) -> usize {
        self.computed
    }

    /// Pixels of `handle` on `grid`
    pub fn evaluate(&mut self, handle: &RasterHandle, grid: &PixelGrid) -> Result<Arc<Raster<f64>>> {
        self.image(handle, grid)
    }

    fn image(&mut self, handle: &RasterHandle, grid: &PixelGrid) -> Result<Arc<Raster<f64>>> {
        match self.value(handle, grid)? {
            Value::Image(r) => Ok(r),
            Value::Stack(_) => Err(Error::incompatible(format!(
                "'{}' is a temporal collection and has no single image",
                handle.name()
            ))),
        }
    }

    fn stack(&mut self, handle: &RasterHandle, grid: &PixelGrid) -> Result<Arc<Vec<Layer>>> {
        match self.value(handle, grid)? {
            Value::Stack(layers) => Ok(layers),
            Value::Image(r) => Ok(Arc::new(vec![Layer::new(None, (*r).clone())])),
        }
    }

    fn operand(&mut self, operand: &Operand, grid: &PixelGrid) -> Result<Option<Arc<Raster<f64>>>> {
        match operand {
            Operand::Raster(h) => Ok(Some(self.image(h, grid)?)),
            Operand::Scalar(_) => Ok(None),
        }
    }

    fn value(&mut self, handle: &RasterHandle, grid: &PixelGrid) -> Result<Value> {
        let key = (handle.id(), GridKey::from(grid));
        if let Some(hit) = self.memo.get(&key) {
            return Ok(hit.clone());
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() > deadline {
                return Err(Error::budget("time limit exceeded during evaluation"));
            }
        }

        let value = self.compute(handle, grid)?;
        trace!(
            node = handle.id(),
            op = handle.operation().name(),
            rows = grid.rows,
            cols = grid.cols,
            "node computed"
        );
        self.computed += 1;
        self.memo.insert(key, value.clone());
        Ok(value)
    }

    fn compute(&mut self, handle: &RasterHandle, grid: &PixelGrid) -> Result<Value> {
        match handle.operation() {
            Operation::Load {
                provider,
                dataset,
                band,
                time_range,
            } => {
                let request = FetchRequest {
                    dataset: dataset.clone(),
                    band: band.clone(),
                    time_range: *time_range,
                    grid: *grid,
                };
                let mut layers = provider.fetch(&request)?;
                if handle.is_temporal() {
                    Ok(Value::Stack(Arc::new(layers)))
                } else if layers.is_empty() {
                    Err(Error::data_unavailable(dataset.as_str(), "provider returned no layers"))
                } else {
                    image(layers.swap_remove(0).raster)
                }
            }
            Operation::Unary { op, input } => {
                let r = self.image(input, grid)?;
                image(unary(&r, *op)?)
            }
            Operation::Binary { op, lhs, rhs } => {
                let a = self.operand(lhs, grid)?;
                let b = self.operand(rhs, grid)?;
                image(imagery::binary(
                    kernel_operand(lhs, a.as_deref()),
                    kernel_operand(rhs, b.as_deref()),
                    *op,
                )?)
            }
            Operation::Select {
                cond,
                then,
                otherwise,
            } => {
                let c = self.operand(cond, grid)?;
                let t = self.operand(then, grid)?;
                let e = self.operand(otherwise, grid)?;
                image(select(
                    kernel_operand(cond, c.as_deref()),
                    kernel_operand(then, t.as_deref()),
                    kernel_operand(otherwise, e.as_deref()),
                )?)
            }
            Operation::Lookup { input, table } => {
                let r = self.image(input, grid)?;
                image(lookup(&r, table)?)
            }
            Operation::Classify { input, scheme } => {
                let r = self.image(input, grid)?;
                image(classify(&r, scheme)?)
            }
            Operation::TemporalSum {
                input,
                months,
                per_year,
            } => {
                let layers = self.stack(input, grid)?;
                let divisor = match (*per_year, input.time_range()) {
                    (true, Some(range)) => range.years() as f64,
                    _ => 1.0,
                };
                image(temporal_sum(&layers, months, divisor)?)
            }
            Operation::Resample { input, method } => {
                let source_scale = input.scale().max(grid.scale);
                if (source_scale - grid.scale).abs() <= 1e-9 * grid.scale {
                    let halo = input.halo();
                    let padded = self.image(input, &grid.expand(halo))?;
                    if halo == 0 {
                        return Ok(Value::Image(padded));
                    }
                    return image(padded.crop(halo, halo, grid.rows, grid.cols)?);
                }
                let source_grid = covering_grid(&grid.extent(), source_scale)?.expand(input.halo());
                let src = self.image(input, &source_grid)?;
                image(resample(&src, grid, *method)?)
            }
            Operation::Mask { input, mask: m } => {
                let r = self.image(input, grid)?;
                let m = self.image(m, grid)?;
                image(mask(&r, &m)?)
            }
            Operation::Slope { input, z_factor } => {
                let dem = self.image(input, grid)?;
                let params = SlopeParams {
                    z_factor: *z_factor,
                    geographic: handle.crs().is_geographic(),
                };
                image(slope(&dem, params)?)
            }
            Operation::PixelArea { .. } => {
                let mut like = Raster::on_grid(grid, f64::NAN);
                like.set_crs(Some(handle.crs().clone()));
                image(pixel_area(&like, handle.crs().is_geographic())?)
            }
        }
    }
}

fn image(r: Raster<f64>) -> Result<Value> {
    Ok(Value::Image(Arc::new(r)))
}

/// Grid at `scale` covering `extent` plus one source pixel on every side,
/// so interpolation at the border has neighbours
fn covering_grid(extent: &Extent, scale: f64) -> Result<PixelGrid> {
    PixelGrid::snapped(&extent.buffer(scale), scale)
}

fn kernel_operand<'a>(operand: &Operand, raster: Option<&'a Raster<f64>>) -> imagery::Operand<'a> {
    match (operand, raster) {
        (_, Some(r)) => imagery::Operand::Raster(r),
        (Operand::Scalar(v), None) => imagery::Operand::Scalar(*v),
        (Operand::Raster(_), None) => imagery::Operand::Scalar(f64::NAN),
    }
}
