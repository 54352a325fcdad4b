//! Small fixtures shared by the factor tests

use std::sync::Arc;

use erosgis_algebra::{BandInfo, DataProvider, Evaluator, MemoryProvider, RasterHandle};
use erosgis_core::{Extent, Period, PixelGrid, Raster, CRS};

pub const SCALE: f64 = 10.0;
pub const SIZE: usize = 8;

pub fn grid() -> PixelGrid {
    PixelGrid::new(0.0, SIZE as f64 * SCALE, SCALE, SIZE, SIZE)
}

pub fn extent() -> Extent {
    grid().extent()
}

pub fn raster(f: impl Fn(usize, usize) -> f64) -> Raster<f64> {
    let g = grid();
    let mut r = Raster::on_grid(&g, 0.0);
    for row in 0..SIZE {
        for col in 0..SIZE {
            r.set(row, col, f(row, col)).unwrap();
        }
    }
    r.set_crs(Some(CRS::from_epsg(32633)));
    r
}

/// Handle over a single static band
pub fn static_handle(band: BandInfo, f: impl Fn(usize, usize) -> f64) -> RasterHandle {
    let name = band.name.clone();
    let mut p = MemoryProvider::new();
    p.insert_static("fixture", band, raster(f)).unwrap();
    let p: Arc<dyn DataProvider> = Arc::new(p);
    RasterHandle::load(&p, "fixture", &name, None, &extent()).unwrap()
}

/// Monthly precipitation of `value` everywhere for every month of `years`
pub fn monthly_provider(value: f64, years: std::ops::RangeInclusive<i32>) -> RasterHandle {
    let series = years
        .flat_map(|y| (1..=12).map(move |m| (y, m)))
        .map(|(y, m)| (Period::new(y, m).unwrap(), raster(|_, _| value)))
        .collect();
    let mut p = MemoryProvider::new();
    p.insert_series("rain", BandInfo::continuous("precipitation"), series)
        .unwrap();
    let p: Arc<dyn DataProvider> = Arc::new(p);
    RasterHandle::load(&p, "rain", "precipitation", None, &extent()).unwrap()
}

pub fn evaluate(handle: &RasterHandle) -> Raster<f64> {
    let r = Evaluator::new().evaluate(handle, &grid()).unwrap();
    (*r).clone()
}

pub fn evaluate_center(handle: &RasterHandle) -> f64 {
    evaluate(handle).get(SIZE / 2, SIZE / 2).unwrap()
}
