//! Slope calculation from DEMs
//!
//! Calculates the rate of change of elevation using the Horn (1981) method,
//! which uses a 3x3 neighborhood to compute partial derivatives.

use crate::maybe_rayon::build_rows;
use crate::terrain::spheroid::Spheroid;
use erosgis_core::raster::Raster;
use erosgis_core::Result;

/// Pixels of neighbourhood the slope kernel reads around each cell
pub const SLOPE_HALO: usize = 1;

/// Parameters for slope calculation
#[derive(Debug, Clone, Copy)]
pub struct SlopeParams {
    /// Multiplier converting elevation units to horizontal units
    pub z_factor: f64,
    /// Cell sizes are degrees of lon/lat; ground distances are taken from the
    /// WGS84 spheroid at each row's latitude
    pub geographic: bool,
}

impl Default for SlopeParams {
    fn default() -> Self {
        Self {
            z_factor: 1.0,
            geographic: false,
        }
    }
}

/// Calculate slope in degrees from a DEM
///
/// Uses Horn's (1981) method with a 3x3 neighborhood:
/// ```text
/// a b c
/// d e f
/// g h i
/// ```
///
/// dz/dx = ((c + 2f + i) - (a + 2d + g)) / (8 * dx)
/// dz/dy = ((g + 2h + i) - (a + 2b + c)) / (8 * dy)
/// slope = atan(sqrt(dz/dx² + dz/dy²))
///
/// Edge cells and cells with no-data anywhere in their window are no-data;
/// callers that need them evaluate the DEM with a [`SLOPE_HALO`] margin.
pub fn slope(dem: &Raster<f64>, params: SlopeParams) -> Result<Raster<f64>> {
    let (rows, cols) = dem.shape();
    let tf = *dem.transform();
    let spheroid = Spheroid::default();

    build_rows(dem, |row, out| {
        if rows < 3 || cols < 3 || row == 0 || row == rows - 1 {
            return;
        }

        let (dx, dy) = if params.geographic {
            let lat = tf.origin_y + (row as f64 + 0.5) * tf.pixel_height;
            let dims = spheroid.cell_dimensions(lat, tf.pixel_width, tf.pixel_height);
            (dims.dx, dims.dy)
        } else {
            (tf.pixel_width.abs(), tf.pixel_height.abs())
        };
        let eight_dx = 8.0 * dx / params.z_factor;
        let eight_dy = 8.0 * dy / params.z_factor;

        for col in 1..cols - 1 {
            // Get 3x3 neighborhood
            let a = unsafe { dem.get_unchecked(row - 1, col - 1) };
            let b = unsafe { dem.get_unchecked(row - 1, col) };
            let c = unsafe { dem.get_unchecked(row - 1, col + 1) };
            let d = unsafe { dem.get_unchecked(row, col - 1) };
            let e = unsafe { dem.get_unchecked(row, col) };
            let f = unsafe { dem.get_unchecked(row, col + 1) };
            let g = unsafe { dem.get_unchecked(row + 1, col - 1) };
            let h = unsafe { dem.get_unchecked(row + 1, col) };
            let i = unsafe { dem.get_unchecked(row + 1, col + 1) };

            if [a, b, c, d, e, f, g, h, i].iter().any(|&v| dem.is_nodata(v)) {
                continue;
            }

            let dz_dx = ((c + 2.0 * f + i) - (a + 2.0 * d + g)) / eight_dx;
            let dz_dy = ((g + 2.0 * h + i) - (a + 2.0 * b + c)) / eight_dy;

            out[col] = (dz_dx * dz_dx + dz_dy * dz_dy).sqrt().atan().to_degrees();
        }
    })
}
