//! # ErosGIS Parallel
//!
//! Tiled execution of raster algebra graphs.
//!
//! This crate provides:
//! - Processing modes (sequential, rayon, fixed-size pools)
//! - Exact partitioning of pixel grids into tiles
//! - The tile executor: pixel and time budgets, degrade-and-retry policy
//! - Zonal reduction of handles over regions

pub mod executor;
pub mod strategy;
pub mod tiled;
pub mod zonal;

pub use executor::{
    ExecutionBudget, ExecutionReport, ExecutionState, Materialized, Precision, Reduced, RetryPolicy,
    TileContext, TileExecutor,
};
pub use strategy::{num_cpus, ParallelStrategy, ProcessingMode};
pub use tiled::{tile_side, Tile, TileIterator};
pub use zonal::{ZonalReducer, ZonalResult, ZonalSummary};
