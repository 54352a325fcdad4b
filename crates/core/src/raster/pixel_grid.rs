//! Pixel grids snapped to an extent at a given scale

use serde::{Deserialize, Serialize};

use super::{Extent, GeoTransform};
use crate::error::{Error, Result};

/// Tolerance (in pixels) absorbed when snapping coordinates to the grid
const SNAP_EPS: f64 = 1e-6;

/// A north-up grid of square pixels.
///
/// Every evaluation in ErosGIS happens on a `PixelGrid`: requests snap their
/// extent outward to multiples of the scale, and tiles are windows of that
/// grid at integer pixel offsets, so all tiles of a request share one lattice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelGrid {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Ground sample distance (pixel side) in CRS units
    pub scale: f64,
    pub rows: usize,
    pub cols: usize,
}

impl PixelGrid {
    pub fn new(origin_x: f64, origin_y: f64, scale: f64, rows: usize, cols: usize) -> Self {
        Self {
            origin_x,
            origin_y,
            scale,
            rows,
            cols,
        }
    }

    /// Grid covering `extent`, snapped outward to multiples of `scale`.
    pub fn snapped(extent: &Extent, scale: f64) -> Result<Self> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(Error::InvalidParameter {
                name: "scale",
                value: scale.to_string(),
                reason: "scale must be a positive finite number".into(),
            });
        }
        if extent.is_empty() {
            return Err(Error::InvalidParameter {
                name: "extent",
                value: format!("{:?}", extent),
                reason: "extent is empty".into(),
            });
        }

        let min_x = ((extent.min_x / scale) + SNAP_EPS).floor() * scale;
        let max_x = ((extent.max_x / scale) - SNAP_EPS).ceil() * scale;
        let min_y = ((extent.min_y / scale) + SNAP_EPS).floor() * scale;
        let max_y = ((extent.max_y / scale) - SNAP_EPS).ceil() * scale;

        let cols = ((max_x - min_x) / scale).round().max(1.0) as usize;
        let rows = ((max_y - min_y) / scale).round().max(1.0) as usize;

        Ok(Self::new(min_x, max_y, scale, rows, cols))
    }

    pub fn transform(&self) -> GeoTransform {
        GeoTransform::new(self.origin_x, self.origin_y, self.scale, -self.scale)
    }

    pub fn extent(&self) -> Extent {
        Extent::new(
            self.origin_x,
            self.origin_y - self.rows as f64 * self.scale,
            self.origin_x + self.cols as f64 * self.scale,
            self.origin_y,
        )
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn pixel_count(&self) -> u64 {
        self.rows as u64 * self.cols as u64
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    /// Centre of pixel (row, col) in CRS coordinates
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.scale,
            self.origin_y - (row as f64 + 0.5) * self.scale,
        )
    }

    /// Sub-grid starting at pixel offset (row_off, col_off)
    pub fn window(&self, row_off: usize, col_off: usize, rows: usize, cols: usize) -> PixelGrid {
        PixelGrid::new(
            self.origin_x + col_off as f64 * self.scale,
            self.origin_y - row_off as f64 * self.scale,
            self.scale,
            rows,
            cols,
        )
    }

    /// Grid grown by `halo` pixels on every side
    pub fn expand(&self, halo: usize) -> PixelGrid {
        let pad = halo as f64 * self.scale;
        PixelGrid::new(
            self.origin_x - pad,
            self.origin_y + pad,
            self.scale,
            self.rows + 2 * halo,
            self.cols + 2 * halo,
        )
    }

    /// Pixel window `(row_off, col_off, rows, cols)` of the cells whose area
    /// intersects `extent`, or `None` if the extent misses the grid.
    pub fn window_of(&self, extent: &Extent) -> Option<(usize, usize, usize, usize)> {
        let own = self.extent();
        let clipped = own.intersection(extent)?;

        let col_start = ((clipped.min_x - self.origin_x) / self.scale + SNAP_EPS).floor();
        let col_end = ((clipped.max_x - self.origin_x) / self.scale - SNAP_EPS).ceil();
        let row_start = ((self.origin_y - clipped.max_y) / self.scale + SNAP_EPS).floor();
        let row_end = ((self.origin_y - clipped.min_y) / self.scale - SNAP_EPS).ceil();

        let col_start = (col_start.max(0.0) as usize).min(self.cols);
        let col_end = (col_end.max(0.0) as usize).min(self.cols);
        let row_start = (row_start.max(0.0) as usize).min(self.rows);
        let row_end = (row_end.max(0.0) as usize).min(self.rows);

        if col_start >= col_end || row_start >= row_end {
            return None;
        }
        Some((row_start, col_start, row_end - row_start, col_end - col_start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_snapped_outward() {
        let grid = PixelGrid::snapped(&Extent::new(3.0, 4.0, 27.0, 19.0), 10.0).unwrap();
        assert_eq!(grid.shape(), (2, 3));
        assert_relative_eq!(grid.origin_x, 0.0);
        assert_relative_eq!(grid.origin_y, 20.0);
        assert_eq!(grid.extent(), Extent::new(0.0, 0.0, 30.0, 20.0));
    }

    #[test]
    fn test_snapped_exact_multiple_adds_no_pixel() {
        let grid = PixelGrid::snapped(&Extent::new(0.0, 0.0, 0.3, 0.3), 0.1).unwrap();
        assert_eq!(grid.shape(), (3, 3));
    }

    #[test]
    fn test_snapped_rejects_bad_scale() {
        let e = Extent::new(0.0, 0.0, 10.0, 10.0);
        assert!(PixelGrid::snapped(&e, 0.0).is_err());
        assert!(PixelGrid::snapped(&e, f64::NAN).is_err());
    }

    #[test]
    fn test_window_and_expand() {
        let grid = PixelGrid::new(0.0, 100.0, 1.0, 100, 100);
        let w = grid.window(10, 20, 5, 5);
        assert_relative_eq!(w.origin_x, 20.0);
        assert_relative_eq!(w.origin_y, 90.0);

        let e = w.expand(1);
        assert_eq!(e.shape(), (7, 7));
        assert_relative_eq!(e.origin_x, 19.0);
        assert_relative_eq!(e.origin_y, 91.0);
    }

    #[test]
    fn test_window_of() {
        let grid = PixelGrid::new(0.0, 10.0, 1.0, 10, 10);
        let w = grid.window_of(&Extent::new(2.5, 2.5, 4.5, 7.0)).unwrap();
        assert_eq!(w, (3, 2, 5, 3));
        assert!(grid.window_of(&Extent::new(20.0, 20.0, 30.0, 30.0)).is_none());
    }
}
