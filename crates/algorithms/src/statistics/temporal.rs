//! Aggregation of monthly layers into a single raster

use crate::maybe_rayon::build_rows;
use erosgis_core::raster::Raster;
use erosgis_core::{Error, Layer, Result};

/// Sum the layers whose month is in `months`, divided by `divisor`.
///
/// With `divisor` set to the number of years in the window this gives the
/// mean total over those months per year. Layers without a period always
/// take part. No-data in any selected layer makes the cell no-data, and a
/// selection with no layers is no-data everywhere.
pub fn temporal_sum(layers: &[Layer], months: &[u8], divisor: f64) -> Result<Raster<f64>> {
    let first = layers.first().ok_or_else(|| {
        Error::Algorithm("temporal aggregate needs at least one layer".into())
    })?;
    if !(divisor.is_finite() && divisor > 0.0) {
        return Err(Error::InvalidParameter {
            name: "divisor",
            value: divisor.to_string(),
            reason: "divisor must be positive".into(),
        });
    }

    let selected: Vec<&Raster<f64>> = layers
        .iter()
        .filter(|l| l.period.map_or(true, |p| months.contains(&p.month)))
        .map(|l| &l.raster)
        .collect();
    for r in &selected {
        if r.shape() != first.raster.shape() {
            return Err(Error::SizeMismatch {
                er: first.raster.rows(),
                ec: first.raster.cols(),
                ar: r.rows(),
                ac: r.cols(),
            });
        }
    }

    build_rows(&first.raster, |row, out| {
        if selected.is_empty() {
            return;
        }
        for (col, cell) in out.iter_mut().enumerate() {
            let mut sum = 0.0;
            let mut valid = true;
            for r in &selected {
                let v = unsafe { r.get_unchecked(row, col) };
                if r.is_nodata(v) {
                    valid = false;
                    break;
                }
                sum += v;
            }
            if valid {
                *cell = sum / divisor;
            }
        }
    })
}
