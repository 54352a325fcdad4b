//! Ground cell dimensions on the WGS84 spheroid
//!
//! For geographic (lon/lat) grids the ground size of a cell varies with
//! latitude: `dx = N·cos(φ)·Δλ`, `dy = M·Δφ`, with `N` and `M` the prime
//! vertical and meridional radii of curvature.

/// WGS84 ellipsoid parameters
const WGS84_A: f64 = 6_378_137.0; // semi-major axis (m)
const WGS84_F: f64 = 1.0 / 298.257_223_563; // flattening

/// Spheroid used to convert angular cell sizes to metres
#[derive(Debug, Clone, Copy)]
pub struct Spheroid {
    pub semi_major: f64,
    pub flattening: f64,
}

impl Default for Spheroid {
    fn default() -> Self {
        Self {
            semi_major: WGS84_A,
            flattening: WGS84_F,
        }
    }
}

/// Ground dimensions of one cell, in metres
#[derive(Debug, Clone, Copy)]
pub struct CellDimensions {
    /// East-West cell size
    pub dx: f64,
    /// North-South cell size
    pub dy: f64,
    /// Cell area in m²
    pub area: f64,
}

impl Spheroid {
    /// Dimensions of a `d_lon x d_lat` degree cell centred at `latitude_deg`
    pub fn cell_dimensions(&self, latitude_deg: f64, d_lon: f64, d_lat: f64) -> CellDimensions {
        let lat = latitude_deg.to_radians();
        let a = self.semi_major;
        let f = self.flattening;
        let e2 = 2.0 * f - f * f;

        let sin_lat = lat.sin();
        let w = 1.0 - e2 * sin_lat * sin_lat;

        let n = a / w.sqrt();
        let m = a * (1.0 - e2) / w.powf(1.5);

        let dx = (n * lat.cos() * d_lon.to_radians()).abs();
        let dy = (m * d_lat.to_radians()).abs();

        CellDimensions { dx, dy, area: dx * dy }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_dimensions_equator() {
        let dims = Spheroid::default().cell_dimensions(0.0, 1.0 / 3600.0, 1.0 / 3600.0);
        // 1 arcsecond at equator ≈ 30.9 m (E-W) and ≈ 30.7 m (N-S)
        assert!(dims.dx > 30.5 && dims.dx < 31.2, "dx = {}", dims.dx);
        assert!(dims.dy > 30.4 && dims.dy < 31.0, "dy = {}", dims.dy);
    }

    #[test]
    fn test_cell_dimensions_latitude_60() {
        let s = Spheroid::default();
        let eq = s.cell_dimensions(0.0, 0.01, 0.01);
        let at60 = s.cell_dimensions(60.0, 0.01, 0.01);
        let ratio = at60.dx / eq.dx;
        assert!((ratio - 0.5).abs() < 0.02, "dx ratio at 60° = {:.4}", ratio);
        assert!((at60.area - at60.dx * at60.dy).abs() < 1e-6);
    }
}
