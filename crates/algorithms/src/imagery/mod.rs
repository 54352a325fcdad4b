//! Per-pixel value transforms
//!
//! - Band math: element-wise arithmetic, comparisons and selection
//! - Reclassify: categorical lookup tables and interval classification

mod band_math;
mod reclassify;

pub use band_math::{band_math, binary, mask, select, unary, BinaryOp, Operand, UnaryOp};
pub use reclassify::{classify, lookup, ClassBin, ClassificationScheme, LookupTable};
