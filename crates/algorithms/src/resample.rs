//! Resampling a raster onto another pixel grid of the same CRS

use serde::{Deserialize, Serialize};

use crate::maybe_rayon::build_rows;
use erosgis_core::raster::Raster;
use erosgis_core::{PixelGrid, Result};

/// Interpolation used when sampling a source raster at target pixel centres
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResampleMethod {
    #[default]
    Nearest,
    Bilinear,
}

/// Sample `src` at the pixel centres of `target`.
///
/// Target cells whose centre falls outside `src` are no-data. Bilinear
/// weights use the four surrounding source centres, clamped at the border;
/// no-data in any of them gives no-data.
pub fn resample(src: &Raster<f64>, target: &PixelGrid, method: ResampleMethod) -> Result<Raster<f64>> {
    let mut like = Raster::on_grid(target, f64::NAN);
    like.set_crs(src.crs().cloned());

    let (src_rows, src_cols) = src.shape();
    let tf = *src.transform();

    build_rows(&like, |row, out| {
        if src_rows == 0 || src_cols == 0 {
            return;
        }
        for (col, cell) in out.iter_mut().enumerate() {
            let (x, y) = target.pixel_center(row, col);
            let (px, py) = tf.geo_to_pixel(x, y);
            let inside = px >= 0.0 && py >= 0.0 && px < src_cols as f64 && py < src_rows as f64;
            if !inside {
                continue;
            }
            *cell = match method {
                ResampleMethod::Nearest => {
                    let v = unsafe { src.get_unchecked(py as usize, px as usize) };
                    if src.is_nodata(v) {
                        f64::NAN
                    } else {
                        v
                    }
                }
                ResampleMethod::Bilinear => bilinear(src, px - 0.5, py - 0.5),
            };
        }
    })
}

/// Bilinear interpolation at fractional centre coordinates, clamped boundaries
#[inline]
fn bilinear(src: &Raster<f64>, fx: f64, fy: f64) -> f64 {
    let (rows, cols) = src.shape();
    let x0 = fx.floor();
    let y0 = fy.floor();
    let tx = fx - x0;
    let ty = fy - y0;

    let clamp = |v: f64, n: usize| (v.max(0.0) as usize).min(n - 1);
    let c0 = clamp(x0, cols);
    let c1 = clamp(x0 + 1.0, cols);
    let r0 = clamp(y0, rows);
    let r1 = clamp(y0 + 1.0, rows);

    let (v00, v01, v10, v11) = unsafe {
        (
            src.get_unchecked(r0, c0),
            src.get_unchecked(r0, c1),
            src.get_unchecked(r1, c0),
            src.get_unchecked(r1, c1),
        )
    };
    if [v00, v01, v10, v11].iter().any(|&v| src.is_nodata(v)) {
        return f64::NAN;
    }
    (1.0 - ty) * ((1.0 - tx) * v00 + tx * v01) + ty * ((1.0 - tx) * v10 + tx * v11)
}
