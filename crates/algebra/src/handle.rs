//! Raster handles: lazy nodes of the algebra graph
//!
//! A [`RasterHandle`] describes a raster without computing it. Composing
//! handles validates the operands immediately and yields a new handle; pixels
//! are only produced when an [`Evaluator`](crate::Evaluator) is asked for a
//! grid. Handles are cheap to clone and can be shared between threads.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::provider::DataProvider;
use erosgis_algorithms::imagery::{BinaryOp, ClassificationScheme, LookupTable, UnaryOp};
use erosgis_algorithms::resample::ResampleMethod;
use erosgis_algorithms::terrain::SLOPE_HALO;
use erosgis_core::{Error, Extent, Result, TimeRange, CRS};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Relative tolerance when comparing nominal scales
const SCALE_EPS: f64 = 1e-9;

/// How cell values are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Measurements; interpolated when resampled
    Continuous,
    /// Codes or class ids; only nearest-neighbour resampling is meaningful
    Categorical,
}

/// Static description of the raster a handle produces
#[derive(Debug, Clone, PartialEq)]
pub struct HandleMeta {
    pub name: String,
    pub dtype: DataType,
    /// Nominal ground sample distance in CRS units
    pub scale: f64,
    pub crs: CRS,
    pub extent: Extent,
    /// Pixels of neighbourhood needed around a window to evaluate it exactly
    pub halo: usize,
    /// The handle evaluates to a stack of monthly layers
    pub temporal: bool,
    pub time_range: Option<TimeRange>,
}

/// Operand of an arithmetic node: another handle or a broadcast scalar
#[derive(Debug, Clone)]
pub enum Operand {
    Raster(RasterHandle),
    Scalar(f64),
}

impl Operand {
    pub fn handle(&self) -> Option<&RasterHandle> {
        match self {
            Operand::Raster(h) => Some(h),
            Operand::Scalar(_) => None,
        }
    }
}

impl From<RasterHandle> for Operand {
    fn from(h: RasterHandle) -> Self {
        Operand::Raster(h)
    }
}

impl From<&RasterHandle> for Operand {
    fn from(h: &RasterHandle) -> Self {
        Operand::Raster(h.clone())
    }
}

impl From<f64> for Operand {
    fn from(v: f64) -> Self {
        Operand::Scalar(v)
    }
}

/// Operation stored in a graph node
#[derive(Debug, Clone)]
pub enum Operation {
    Load {
        provider: Arc<dyn DataProvider>,
        dataset: String,
        band: String,
        time_range: Option<TimeRange>,
    },
    Unary {
        op: UnaryOp,
        input: RasterHandle,
    },
    Binary {
        op: BinaryOp,
        lhs: Operand,
        rhs: Operand,
    },
    Select {
        cond: Operand,
        then: Operand,
        otherwise: Operand,
    },
    Lookup {
        input: RasterHandle,
        table: Arc<LookupTable>,
    },
    Classify {
        input: RasterHandle,
        scheme: Arc<ClassificationScheme>,
    },
    /// Mean monthly totals of the selected months, summed
    TemporalSum {
        input: RasterHandle,
        months: Vec<u8>,
        per_year: bool,
    },
    Resample {
        input: RasterHandle,
        method: ResampleMethod,
    },
    Mask {
        input: RasterHandle,
        mask: RasterHandle,
    },
    Slope {
        input: RasterHandle,
        z_factor: f64,
    },
    PixelArea {
        input: RasterHandle,
    },
}

impl Operation {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Load { .. } => "load",
            Operation::Unary { .. } => "unary",
            Operation::Binary { .. } => "binary",
            Operation::Select { .. } => "where",
            Operation::Lookup { .. } => "lookup",
            Operation::Classify { .. } => "classify",
            Operation::TemporalSum { .. } => "temporal_sum",
            Operation::Resample { .. } => "resample",
            Operation::Mask { .. } => "mask",
            Operation::Slope { .. } => "slope",
            Operation::PixelArea { .. } => "pixel_area",
        }
    }

    /// Handles this operation reads
    pub fn inputs(&self) -> Vec<&RasterHandle> {
        match self {
            Operation::Load { .. } => Vec::new(),
            Operation::Unary { input, .. }
            | Operation::Lookup { input, .. }
            | Operation::Classify { input, .. }
            | Operation::TemporalSum { input, .. }
            | Operation::Resample { input, .. }
            | Operation::Slope { input, .. }
            | Operation::PixelArea { input } => vec![input],
            Operation::Binary { lhs, rhs, .. } => [lhs, rhs].into_iter().filter_map(Operand::handle).collect(),
            Operation::Select {
                cond,
                then,
                otherwise,
            } => [cond, then, otherwise]
                .into_iter()
                .filter_map(Operand::handle)
                .collect(),
            Operation::Mask { input, mask } => vec![input, mask],
        }
    }
}

#[derive(Debug)]
struct Node {
    id: u64,
    op: Operation,
    meta: HandleMeta,
}

/// Immutable, shareable reference to a lazy raster.
///
/// A handle can only reference handles that existed before it, so the graph
/// is acyclic by construction.
#[derive(Clone)]
pub struct RasterHandle(Arc<Node>);

impl fmt::Debug for RasterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterHandle")
            .field("id", &self.0.id)
            .field("op", &self.0.op.name())
            .field("name", &self.0.meta.name)
            .field("scale", &self.0.meta.scale)
            .finish()
    }
}

fn same_scale(a: f64, b: f64) -> bool {
    (a - b).abs() <= SCALE_EPS * a.abs().max(b.abs())
}

/// Shared metadata of a set of operands, or `IncompatibleOperands`
fn combine_meta(handles: &[&RasterHandle]) -> Result<HandleMeta> {
    let (first, rest) = handles
        .split_first()
        .ok_or_else(|| Error::incompatible("operation needs at least one raster operand"))?;
    let mut meta = first.meta().clone();
    for h in handles {
        if h.is_temporal() {
            return Err(Error::incompatible(format!(
                "'{}' is a temporal collection; aggregate it with temporal_sum first",
                h.name()
            )));
        }
    }
    for other in rest {
        let m = other.meta();
        if !meta.crs.is_equivalent(&m.crs) {
            return Err(Error::incompatible(format!(
                "CRS {} of '{}' differs from {} of '{}'",
                m.crs, m.name, meta.crs, meta.name
            )));
        }
        if !same_scale(meta.scale, m.scale) {
            return Err(Error::incompatible(format!(
                "scale {} of '{}' differs from {} of '{}'; resample one of them",
                m.scale, m.name, meta.scale, meta.name
            )));
        }
        meta.extent = meta.extent.intersection(&m.extent).ok_or_else(|| {
            Error::incompatible(format!("extents of '{}' and '{}' do not overlap", meta.name, m.name))
        })?;
        meta.halo = meta.halo.max(m.halo);
    }
    meta.dtype = DataType::Continuous;
    Ok(meta)
}

impl RasterHandle {
    fn from_parts(op: Operation, meta: HandleMeta) -> Self {
        let id = NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed);
        RasterHandle(Arc::new(Node { id, op, meta }))
    }

    /// Reference one band of a provider's dataset over `extent`.
    ///
    /// For temporal datasets `time_range` selects the years to read (all
    /// covered years when `None`); it is ignored for static datasets.
    pub fn load(
        provider: &Arc<dyn DataProvider>,
        dataset: &str,
        band: &str,
        time_range: Option<TimeRange>,
        extent: &Extent,
    ) -> Result<Self> {
        let info = provider.describe(dataset)?;
        let band_info = info.require_band(band)?;

        let time_range = match (info.time_range, time_range) {
            (None, _) => None,
            (Some(coverage), None) => Some(coverage),
            (Some(coverage), Some(requested)) => Some(coverage.intersection(&requested).ok_or_else(|| {
                Error::data_unavailable(
                    dataset,
                    format!("requested years {} outside coverage {}", requested, coverage),
                )
            })?),
        };

        let extent = info.extent.intersection(extent).ok_or_else(|| {
            Error::data_unavailable(dataset, "requested extent does not intersect coverage")
        })?;

        let meta = HandleMeta {
            name: band.to_string(),
            dtype: if band_info.categorical {
                DataType::Categorical
            } else {
                DataType::Continuous
            },
            scale: info.scale,
            crs: info.crs.clone(),
            extent,
            halo: 0,
            temporal: info.is_temporal(),
            time_range,
        };
        let op = Operation::Load {
            provider: Arc::clone(provider),
            dataset: dataset.to_string(),
            band: band.to_string(),
            time_range,
        };
        Ok(Self::from_parts(op, meta))
    }

    /// Validate operands and build an elementwise binary node
    pub fn binary(op: BinaryOp, lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> Result<Self> {
        let (lhs, rhs) = (lhs.into(), rhs.into());
        let handles: Vec<&RasterHandle> = [&lhs, &rhs].into_iter().filter_map(Operand::handle).collect();
        let mut meta = combine_meta(&handles)?;
        meta.name = op_name(op).to_string();
        Ok(Self::from_parts(Operation::Binary { op, lhs, rhs }, meta))
    }

    /// Piecewise select: `then` where `cond` is non-zero, `otherwise` elsewhere
    pub fn where_(
        cond: impl Into<Operand>,
        then: impl Into<Operand>,
        otherwise: impl Into<Operand>,
    ) -> Result<Self> {
        let (cond, then, otherwise) = (cond.into(), then.into(), otherwise.into());
        let handles: Vec<&RasterHandle> = [&cond, &then, &otherwise]
            .into_iter()
            .filter_map(Operand::handle)
            .collect();
        let mut meta = combine_meta(&handles)?;
        meta.name = "where".to_string();
        Ok(Self::from_parts(
            Operation::Select {
                cond,
                then,
                otherwise,
            },
            meta,
        ))
    }

    fn unary(&self, op: UnaryOp) -> Result<Self> {
        let meta = combine_meta(&[self])?;
        Ok(Self::from_parts(
            Operation::Unary {
                op,
                input: self.clone(),
            },
            meta,
        ))
    }

    pub fn add(&self, rhs: impl Into<Operand>) -> Result<Self> {
        Self::binary(BinaryOp::Add, self, rhs)
    }

    pub fn sub(&self, rhs: impl Into<Operand>) -> Result<Self> {
        Self::binary(BinaryOp::Subtract, self, rhs)
    }

    pub fn mul(&self, rhs: impl Into<Operand>) -> Result<Self> {
        Self::binary(BinaryOp::Multiply, self, rhs)
    }

    /// Division; a zero divisor gives no-data
    pub fn div(&self, rhs: impl Into<Operand>) -> Result<Self> {
        Self::binary(BinaryOp::Divide, self, rhs)
    }

    pub fn pow(&self, rhs: impl Into<Operand>) -> Result<Self> {
        Self::binary(BinaryOp::Power, self, rhs)
    }

    pub fn min(&self, rhs: impl Into<Operand>) -> Result<Self> {
        Self::binary(BinaryOp::Min, self, rhs)
    }

    pub fn max(&self, rhs: impl Into<Operand>) -> Result<Self> {
        Self::binary(BinaryOp::Max, self, rhs)
    }

    pub fn lt(&self, rhs: impl Into<Operand>) -> Result<Self> {
        Self::binary(BinaryOp::Lt, self, rhs)
    }

    pub fn le(&self, rhs: impl Into<Operand>) -> Result<Self> {
        Self::binary(BinaryOp::Le, self, rhs)
    }

    pub fn gt(&self, rhs: impl Into<Operand>) -> Result<Self> {
        Self::binary(BinaryOp::Gt, self, rhs)
    }

    pub fn ge(&self, rhs: impl Into<Operand>) -> Result<Self> {
        Self::binary(BinaryOp::Ge, self, rhs)
    }

    pub fn eq(&self, rhs: impl Into<Operand>) -> Result<Self> {
        Self::binary(BinaryOp::Eq, self, rhs)
    }

    pub fn ne(&self, rhs: impl Into<Operand>) -> Result<Self> {
        Self::binary(BinaryOp::Ne, self, rhs)
    }

    pub fn sin(&self) -> Result<Self> {
        self.unary(UnaryOp::Sin)
    }

    pub fn cos(&self) -> Result<Self> {
        self.unary(UnaryOp::Cos)
    }

    pub fn sqrt(&self) -> Result<Self> {
        self.unary(UnaryOp::Sqrt)
    }

    pub fn exp(&self) -> Result<Self> {
        self.unary(UnaryOp::Exp)
    }

    pub fn ln(&self) -> Result<Self> {
        self.unary(UnaryOp::Ln)
    }

    pub fn abs(&self) -> Result<Self> {
        self.unary(UnaryOp::Abs)
    }

    pub fn to_radians(&self) -> Result<Self> {
        self.unary(UnaryOp::ToRadians)
    }

    /// Map codes through `table`
    pub fn lookup(&self, table: LookupTable) -> Result<Self> {
        let meta = combine_meta(&[self])?;
        Ok(Self::from_parts(
            Operation::Lookup {
                input: self.clone(),
                table: Arc::new(table),
            },
            meta,
        ))
    }

    /// Assign each value its class id; no-data becomes the scheme's sentinel
    pub fn classify(&self, scheme: ClassificationScheme) -> Result<Self> {
        let mut meta = combine_meta(&[self])?;
        meta.dtype = DataType::Categorical;
        Ok(Self::from_parts(
            Operation::Classify {
                input: self.clone(),
                scheme: Arc::new(scheme),
            },
            meta,
        ))
    }

    /// Sum of the selected months of a temporal collection.
    ///
    /// With `per_year`, each month's total is divided by the number of years
    /// in the handle's time range, giving mean monthly totals.
    pub fn temporal_sum(&self, months: &[u8], per_year: bool) -> Result<Self> {
        if !self.is_temporal() {
            return Err(Error::incompatible(format!(
                "temporal_sum needs a temporal collection, '{}' is a single image",
                self.name()
            )));
        }
        if months.is_empty() || months.iter().any(|m| !(1..=12).contains(m)) {
            return Err(Error::InvalidParameter {
                name: "months",
                value: format!("{:?}", months),
                reason: "expected a non-empty list of months 1..=12".into(),
            });
        }
        let mut meta = self.meta().clone();
        meta.temporal = false;
        meta.dtype = DataType::Continuous;
        Ok(Self::from_parts(
            Operation::TemporalSum {
                input: self.clone(),
                months: months.to_vec(),
                per_year,
            },
            meta,
        ))
    }

    /// Change the nominal scale.
    ///
    /// The input is evaluated on its own grid (or the request's, when that is
    /// coarser) and sampled at the request's pixel centres.
    pub fn resample(&self, scale: f64, method: ResampleMethod) -> Result<Self> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(Error::InvalidParameter {
                name: "scale",
                value: scale.to_string(),
                reason: "scale must be a positive finite number".into(),
            });
        }
        let mut meta = combine_meta(&[self])?;
        meta.dtype = self.dtype();
        if meta.dtype == DataType::Categorical && method == ResampleMethod::Bilinear {
            return Err(Error::incompatible(format!(
                "'{}' is categorical and cannot be interpolated",
                self.name()
            )));
        }
        meta.scale = scale;
        meta.halo = 0;
        Ok(Self::from_parts(
            Operation::Resample {
                input: self.clone(),
                method,
            },
            meta,
        ))
    }

    /// Keep values where `mask` is valid and non-zero
    pub fn mask(&self, mask: &RasterHandle) -> Result<Self> {
        let mut meta = combine_meta(&[self, mask])?;
        meta.name = self.name().to_string();
        meta.dtype = self.dtype();
        Ok(Self::from_parts(
            Operation::Mask {
                input: self.clone(),
                mask: mask.clone(),
            },
            meta,
        ))
    }

    /// Slope in degrees (Horn). `z_factor` converts elevation units to
    /// horizontal units.
    pub fn slope(&self, z_factor: f64) -> Result<Self> {
        if !(z_factor.is_finite() && z_factor > 0.0) {
            return Err(Error::InvalidParameter {
                name: "z_factor",
                value: z_factor.to_string(),
                reason: "must be a positive finite number".into(),
            });
        }
        let mut meta = combine_meta(&[self])?;
        meta.name = "slope".to_string();
        meta.halo += SLOPE_HALO;
        Ok(Self::from_parts(
            Operation::Slope {
                input: self.clone(),
                z_factor,
            },
            meta,
        ))
    }

    /// Area of each pixel in hectares, on this handle's grid
    pub fn pixel_area(&self) -> Result<Self> {
        let mut meta = combine_meta(&[self])?;
        meta.name = "pixel_area".to_string();
        meta.halo = 0;
        Ok(Self::from_parts(
            Operation::PixelArea {
                input: self.clone(),
            },
            meta,
        ))
    }

    /// Same computation under another band name
    pub fn rename(&self, name: impl Into<String>) -> Self {
        let mut meta = self.0.meta.clone();
        meta.name = name.into();
        RasterHandle(Arc::new(Node {
            id: self.0.id,
            op: self.0.op.clone(),
            meta,
        }))
    }

    /// Process-unique node id; renamed handles share it
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn operation(&self) -> &Operation {
        &self.0.op
    }

    pub fn meta(&self) -> &HandleMeta {
        &self.0.meta
    }

    pub fn name(&self) -> &str {
        &self.0.meta.name
    }

    pub fn dtype(&self) -> DataType {
        self.0.meta.dtype
    }

    pub fn scale(&self) -> f64 {
        self.0.meta.scale
    }

    pub fn crs(&self) -> &CRS {
        &self.0.meta.crs
    }

    pub fn extent(&self) -> Extent {
        self.0.meta.extent
    }

    pub fn halo(&self) -> usize {
        self.0.meta.halo
    }

    pub fn is_temporal(&self) -> bool {
        self.0.meta.temporal
    }

    pub fn time_range(&self) -> Option<TimeRange> {
        self.0.meta.time_range
    }

    /// Number of distinct nodes reachable from this handle
    pub fn node_count(&self) -> usize {
        let mut seen = std::collections::HashSet::new();
        let mut stack = vec![self];
        while let Some(h) = stack.pop() {
            if seen.insert(h.id()) {
                stack.extend(h.operation().inputs());
            }
        }
        seen.len()
    }

    /// Monthly layers the temporal loads under `handles` hold at once when
    /// evaluated on one grid, at least 1
    pub fn stacked_layers(handles: &[&RasterHandle]) -> u64 {
        let mut seen = std::collections::HashSet::new();
        let mut stack = handles.to_vec();
        let mut layers = 0;
        while let Some(h) = stack.pop() {
            if !seen.insert(h.id()) {
                continue;
            }
            if matches!(h.operation(), Operation::Load { .. }) && h.is_temporal() {
                layers += h.time_range().map_or(12, |r| u64::from(r.years()) * 12);
            }
            stack.extend(h.operation().inputs());
        }
        layers.max(1)
    }
}

fn op_name(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "add",
        BinaryOp::Subtract => "sub",
        BinaryOp::Multiply => "mul",
        BinaryOp::Divide => "div",
        BinaryOp::Power => "pow",
        BinaryOp::Min => "min",
        BinaryOp::Max => "max",
        BinaryOp::Lt => "lt",
        BinaryOp::Le => "le",
        BinaryOp::Gt => "gt",
        BinaryOp::Ge => "ge",
        BinaryOp::Eq => "eq",
        BinaryOp::Ne => "ne",
    }
}
