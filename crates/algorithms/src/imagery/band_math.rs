//! Band math operations
//!
//! Raster algebra kernels: element-wise functions of one, two or three
//! operands, where any operand may be a raster or a broadcast scalar.
//! No-data (`NaN`) in any operand yields no-data in the output.

use serde::{Deserialize, Serialize};

use crate::maybe_rayon::build_rows;
use erosgis_core::raster::Raster;
use erosgis_core::{Error, Result};

/// Element-wise unary functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Abs,
    Sqrt,
    Exp,
    Ln,
    Sin,
    Cos,
    ToRadians,
}

impl UnaryOp {
    pub fn apply(self, v: f64) -> f64 {
        match self {
            UnaryOp::Abs => v.abs(),
            UnaryOp::Sqrt => v.sqrt(),
            UnaryOp::Exp => v.exp(),
            UnaryOp::Ln => v.ln(),
            UnaryOp::Sin => v.sin(),
            UnaryOp::Cos => v.cos(),
            UnaryOp::ToRadians => v.to_radians(),
        }
    }
}

/// Binary operations for band math.
///
/// Comparisons produce `1.0` (true) or `0.0` (false).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Min,
    Max,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl BinaryOp {
    /// Apply to two valid values. Division by zero is no-data.
    pub fn apply(self, a: f64, b: f64) -> f64 {
        let truth = |c: bool| if c { 1.0 } else { 0.0 };
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Subtract => a - b,
            BinaryOp::Multiply => a * b,
            BinaryOp::Divide => {
                if b == 0.0 {
                    f64::NAN
                } else {
                    a / b
                }
            }
            BinaryOp::Power => a.powf(b),
            BinaryOp::Min => a.min(b),
            BinaryOp::Max => a.max(b),
            BinaryOp::Lt => truth(a < b),
            BinaryOp::Le => truth(a <= b),
            BinaryOp::Gt => truth(a > b),
            BinaryOp::Ge => truth(a >= b),
            BinaryOp::Eq => truth(a == b),
            BinaryOp::Ne => truth(a != b),
        }
    }
}

/// An operand of a band math kernel
#[derive(Debug, Clone, Copy)]
pub enum Operand<'a> {
    Raster(&'a Raster<f64>),
    Scalar(f64),
}

impl<'a> Operand<'a> {
    /// Value at (row, col), `NaN` for no-data.
    ///
    /// # Safety
    /// For raster operands, (row, col) must be in bounds.
    #[inline]
    unsafe fn at(&self, row: usize, col: usize) -> f64 {
        match self {
            Operand::Scalar(v) => *v,
            Operand::Raster(r) => {
                let v = unsafe { r.get_unchecked(row, col) };
                if r.is_nodata(v) {
                    f64::NAN
                } else {
                    v
                }
            }
        }
    }

    fn raster(&self) -> Option<&'a Raster<f64>> {
        match self {
            Operand::Raster(r) => Some(r),
            Operand::Scalar(_) => None,
        }
    }
}

impl<'a> From<&'a Raster<f64>> for Operand<'a> {
    fn from(r: &'a Raster<f64>) -> Self {
        Operand::Raster(r)
    }
}

impl From<f64> for Operand<'_> {
    fn from(v: f64) -> Self {
        Operand::Scalar(v)
    }
}

/// First raster among the operands; every other raster must match its shape.
fn reference<'a>(operands: &[Operand<'a>]) -> Result<&'a Raster<f64>> {
    let mut rasters = operands.iter().filter_map(|o| o.raster());
    let first = rasters.next().ok_or_else(|| Error::InvalidParameter {
        name: "operands",
        value: format!("{} scalars", operands.len()),
        reason: "at least one operand must be a raster".into(),
    })?;
    for other in rasters {
        if other.shape() != first.shape() {
            return Err(Error::SizeMismatch {
                er: first.rows(),
                ec: first.cols(),
                ar: other.rows(),
                ac: other.cols(),
            });
        }
    }
    Ok(first)
}

/// Apply a unary function to every cell in a raster.
///
/// Nodata cells (NaN) are preserved.
///
/// # Example
/// ```ignore
/// let scaled = band_math(&input, |v| v * 0.1)?;
/// ```
pub fn band_math<F>(raster: &Raster<f64>, f: F) -> Result<Raster<f64>>
where
    F: Fn(f64) -> f64 + Sync + Send,
{
    build_rows(raster, |row, out| {
        for (col, cell) in out.iter_mut().enumerate() {
            let val = unsafe { raster.get_unchecked(row, col) };
            if raster.is_nodata(val) {
                continue;
            }
            *cell = f(val);
        }
    })
}

pub fn unary(raster: &Raster<f64>, op: UnaryOp) -> Result<Raster<f64>> {
    band_math(raster, |v| op.apply(v))
}

/// Apply a binary operation element-wise; scalars broadcast.
pub fn binary(a: Operand<'_>, b: Operand<'_>, op: BinaryOp) -> Result<Raster<f64>> {
    let like = reference(&[a, b])?;
    build_rows(like, |row, out| {
        for (col, cell) in out.iter_mut().enumerate() {
            let (va, vb) = unsafe { (a.at(row, col), b.at(row, col)) };
            if va.is_nan() || vb.is_nan() {
                continue;
            }
            *cell = op.apply(va, vb);
        }
    })
}

/// Piecewise select: `then` where `cond` is non-zero, `otherwise` elsewhere.
///
/// No-data in any of the three operands is no-data in the output, even in
/// the branch that is not taken.
pub fn select(cond: Operand<'_>, then: Operand<'_>, otherwise: Operand<'_>) -> Result<Raster<f64>> {
    let like = reference(&[cond, then, otherwise])?;
    build_rows(like, |row, out| {
        for (col, cell) in out.iter_mut().enumerate() {
            let (c, t, e) = unsafe { (cond.at(row, col), then.at(row, col), otherwise.at(row, col)) };
            if c.is_nan() || t.is_nan() || e.is_nan() {
                continue;
            }
            *cell = if c != 0.0 { t } else { e };
        }
    })
}

/// Keep `raster` where `mask` is valid and non-zero, no-data elsewhere
pub fn mask(raster: &Raster<f64>, mask: &Raster<f64>) -> Result<Raster<f64>> {
    reference(&[Operand::Raster(raster), Operand::Raster(mask)])?;
    build_rows(raster, |row, out| {
        for (col, cell) in out.iter_mut().enumerate() {
            let (v, m) = unsafe { (raster.get_unchecked(row, col), mask.get_unchecked(row, col)) };
            if raster.is_nodata(v) || mask.is_nodata(m) || m == 0.0 {
                continue;
            }
            *cell = v;
        }
    })
}
