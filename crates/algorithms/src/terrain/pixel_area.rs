//! Per-pixel ground area

use crate::maybe_rayon::build_rows;
use crate::terrain::spheroid::Spheroid;
use erosgis_core::raster::Raster;
use erosgis_core::Result;

const M2_PER_HECTARE: f64 = 10_000.0;

/// Ground area of every cell of `like`, in hectares.
///
/// Projected grids have a constant area (`scale² / 10 000`); geographic grids
/// vary by row latitude. Cell values of `like` are ignored, so no-data input
/// cells still get their area.
pub fn pixel_area(like: &Raster<f64>, geographic: bool) -> Result<Raster<f64>> {
    let tf = *like.transform();
    let spheroid = Spheroid::default();
    let projected = (tf.pixel_width * tf.pixel_height).abs() / M2_PER_HECTARE;

    build_rows(like, |row, out| {
        let area = if geographic {
            let lat = tf.origin_y + (row as f64 + 0.5) * tf.pixel_height;
            spheroid.cell_dimensions(lat, tf.pixel_width, tf.pixel_height).area / M2_PER_HECTARE
        } else {
            projected
        };
        out.fill(area);
    })
}
