//! Full pipeline runs over an in-memory scenario
//!
//! The scenario covers 400 m x 400 m in EPSG:32633:
//! - monthly precipitation at 40 m, 1000 mm a year spread evenly over the
//!   months of 2001 and 2002
//! - a loam soil at 40 m
//! - a plane rising along x at 20 m
//! - cropland at 20 m with a built-up strip for 200 <= x < 240

use std::sync::Arc;

use geo::polygon;

use approx::assert_relative_eq;
use erosgis_algebra::{BandInfo, DataProvider, MemoryProvider};
use erosgis_algorithms::imagery::ClassificationScheme;
use erosgis_algorithms::statistics::Statistic;
use erosgis_core::{Extent, Period, PixelGrid, Raster, Region, CRS};
use erosgis_parallel::{Precision, ZonalResult};
use erosgis_rusle::factors::{ErodibilityCoefficients, ErosivityCoefficients, TopographyCoefficients};
use erosgis_rusle::{
    soil_loss, BoundaryProvider, CollectingReporter, GeoTiffExporter, JsonBoundaryProvider, JsonLinesReporter,
    Pipeline, RunConfig,
};

const SIDE: f64 = 400.0;
const PIXEL_HA: f64 = 20.0 * 20.0 / 10_000.0;

struct Scenario {
    /// Elevation gain per metre along x
    rise: f64,
    /// Blank out one soil cell at 40 m (row 3, col 3)
    soil_hole: bool,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            rise: 0.3,
            soil_hole: false,
        }
    }
}

fn raster(scale: f64, f: impl Fn(usize, usize, f64) -> f64) -> Raster<f64> {
    let size = (SIDE / scale) as usize;
    let grid = PixelGrid::new(0.0, SIDE, scale, size, size);
    let mut r = Raster::on_grid(&grid, f64::NAN);
    for row in 0..size {
        for col in 0..size {
            let x = (col as f64 + 0.5) * scale;
            r.set(row, col, f(row, col, x)).unwrap();
        }
    }
    r.set_crs(Some(CRS::from_epsg(32633)));
    r
}

fn provider(s: &Scenario) -> Arc<dyn DataProvider> {
    let mut p = MemoryProvider::new();

    let monthly = 1000.0 / 12.0;
    let series = (2001..=2002)
        .flat_map(|y| (1..=12).map(move |m| (y, m)))
        .map(|(y, m)| (Period::new(y, m).unwrap(), raster(40.0, |_, _, _| monthly)))
        .collect();
    p.insert_series("precipitation", BandInfo::continuous("precipitation"), series)
        .unwrap();

    let hole = s.soil_hole;
    for (band, value) in [("sand", 400.0), ("silt", 400.0), ("clay", 200.0), ("soc", 200.0)] {
        let r = raster(40.0, |row, col, _| {
            if hole && band == "soc" && row == 3 && col == 3 {
                f64::NAN
            } else {
                value
            }
        });
        p.insert_static("soil", BandInfo::continuous(band), r).unwrap();
    }

    let rise = s.rise;
    p.insert_static("elevation", BandInfo::continuous("elevation"), raster(20.0, |_, _, x| 100.0 + rise * x))
        .unwrap();
    p.insert_static(
        "land_cover",
        BandInfo::categorical("land_cover"),
        raster(20.0, |_, _, x| if (200.0..240.0).contains(&x) { 50.0 } else { 40.0 }),
    )
    .unwrap();

    Arc::new(p)
}

fn config() -> RunConfig {
    RunConfig {
        compute_scale: 20.0,
        export_scale: 20.0,
        start_year: 2001,
        end_year: 2002,
        ..RunConfig::default()
    }
}

fn inner() -> Region {
    Region::from_extent("inner", &Extent::new(100.0, 100.0, 300.0, 300.0))
}

fn full_extent() -> Extent {
    Extent::new(0.0, 0.0, SIDE, SIDE)
}

fn expected_r() -> f64 {
    let c = ErosivityCoefficients::default();
    let monthly = 1000.0 / 12.0;
    let mfi = 12.0 * monthly * monthly / 1001.0;
    c.a * mfi + c.b * 1000.0 + c.c
}

fn expected_k() -> f64 {
    let c = ErodibilityCoefficients::default();
    let (san, sil, cla, oc) = (40.0, 40.0, 20.0, 2.0);
    let f_sand = c.sand_base + c.sand_amplitude * (-c.sand_decay * san * (1.0 - sil / 100.0)).exp();
    let f_clsi = (sil / (cla + sil)).powf(c.silt_clay_exponent);
    let f_orgc = (1.0f64 + oc).powf(c.carbon_exponent);
    c.constant * f_sand * f_clsi * f_orgc
}

fn expected_ls(rise: f64) -> f64 {
    let c = TopographyCoefficients::default();
    let theta = rise.atan();
    let s = if theta.to_degrees() < c.steep_threshold {
        c.gentle_slope * theta.sin() + c.gentle_intercept
    } else {
        c.steep_slope * theta.sin() + c.steep_intercept
    };
    c.length_factor() * s.max(0.0)
}

/// Soil loss on cropland for a 0.3 rise: slope ~16.7 degrees, P = 0.9
fn expected_cropland_loss() -> f64 {
    expected_r() * expected_k() * expected_ls(0.3) * 0.25 * 0.9
}

fn summary(result: &ZonalResult) -> &erosgis_parallel::ZonalSummary {
    result.summary().expect("region should be covered")
}

#[test]
fn uniform_rainfall_gives_affine_erosivity() {
    let pipeline = Pipeline::new(config(), provider(&Scenario::default())).unwrap();
    let stack = pipeline.build(&full_extent()).unwrap();

    let r = pipeline
        .executor()
        .materialize(&stack.r, &inner().bbox(), 20.0)
        .unwrap();
    assert!(r.precision.is_exact());
    assert_relative_eq!(r.raster.get(5, 5).unwrap(), expected_r(), max_relative = 1e-9);

    let annual = pipeline
        .executor()
        .materialize(&stack.annual, &inner().bbox(), 40.0)
        .unwrap();
    assert_relative_eq!(annual.raster.get(2, 2).unwrap(), 1000.0, max_relative = 1e-9);
}

#[test]
fn region_statistics_match_factor_product() {
    let pipeline = Pipeline::new(config(), provider(&Scenario::default())).unwrap();
    let mut reporter = CollectingReporter::default();
    let outcome = pipeline.run(&[inner()], &mut reporter, None).unwrap();

    assert_eq!(outcome.results.len(), 1);
    assert_eq!(reporter.results, outcome.results);
    let s = summary(&outcome.results[0]);

    // 10 x 10 pixels, two columns of them built-up
    let a = expected_cropland_loss();
    assert_eq!(s.pixel_count, 100);
    assert_eq!(s.precision, Precision::Exact);
    assert_relative_eq!(s.stats[&Statistic::Count], 100.0);
    assert_relative_eq!(s.stats[&Statistic::Mean], 0.8 * a, max_relative = 1e-9);
    assert_relative_eq!(s.stats[&Statistic::Sum], 80.0 * a, max_relative = 1e-9);
    assert_relative_eq!(s.stats[&Statistic::Min], 0.0);
    assert_relative_eq!(s.stats[&Statistic::Max], a, max_relative = 1e-9);
    assert_relative_eq!(s.stats[&Statistic::StdDev], 0.4 * a, max_relative = 1e-9);
    assert_relative_eq!(s.stats[&Statistic::Median], a, epsilon = 0.02);

    let scheme = ClassificationScheme::soil_loss_severity();
    let cropland_class = scheme.classify_value(a);
    assert_eq!(cropland_class, 3);
    assert_relative_eq!(s.class_areas_ha[&cropland_class], 80.0 * PIXEL_HA, epsilon = 1e-9);
    assert_relative_eq!(s.class_areas_ha[&1], 20.0 * PIXEL_HA, epsilon = 1e-9);
}

#[test]
fn class_areas_cover_every_pixel() {
    let pipeline = Pipeline::new(config(), provider(&Scenario::default())).unwrap();
    let stack = pipeline.build(&full_extent()).unwrap();
    let mut reporter = CollectingReporter::default();
    let results = pipeline.summarize(&stack, &[inner()], &mut reporter).unwrap();
    let s = summary(&results[0]);

    assert_eq!(s.class_areas_ha.len(), 6);
    let total: f64 = s.class_areas_ha.values().sum();
    assert_relative_eq!(total, s.pixel_count as f64 * PIXEL_HA, epsilon = 1e-9);
    assert_eq!(s.class_areas_ha[&6], 0.0);
}

#[test]
fn tiling_does_not_change_statistics() {
    let single = Pipeline::new(config(), provider(&Scenario::default())).unwrap();
    let tiled = Pipeline::new(
        RunConfig {
            // 4 x 4 tiles once shared between the 24 monthly layers
            tile_budget: 16 * 24,
            ..config()
        },
        provider(&Scenario::default()),
    )
    .unwrap();

    let region = Region::from_polygon(
        "triangle",
        geo::polygon![(x: 90.0, y: 90.0), (x: 310.0, y: 90.0), (x: 90.0, y: 310.0), (x: 90.0, y: 90.0)],
    );
    let mut reporter = CollectingReporter::default();
    let a = single.run(&[region.clone()], &mut reporter, None).unwrap();
    let b = tiled.run(&[region], &mut reporter, None).unwrap();
    let (a, b) = (summary(&a.results[0]), summary(&b.results[0]));

    assert_eq!(a.pixel_count, b.pixel_count);
    for stat in Statistic::ALL {
        assert_relative_eq!(a.stats[&stat], b.stats[&stat], max_relative = 1e-9, epsilon = 1e-12);
    }
    for (class, area) in &a.class_areas_ha {
        assert_relative_eq!(*area, b.class_areas_ha[class], epsilon = 1e-9);
    }
}

#[test]
fn factor_order_does_not_matter() {
    let pipeline = Pipeline::new(config(), provider(&Scenario::default())).unwrap();
    let s = pipeline.build(&full_extent()).unwrap();
    let reversed = soil_loss(&s.p, &s.c, &s.ls, &s.k, &s.r).unwrap();

    let bbox = inner().bbox();
    let forward = pipeline.executor().materialize(&s.soil_loss, &bbox, 20.0).unwrap().raster;
    let backward = pipeline.executor().materialize(&reversed, &bbox, 20.0).unwrap().raster;
    for (x, y) in forward.data().iter().zip(backward.data().iter()) {
        assert_relative_eq!(*x, *y, max_relative = 1e-12);
    }
}

#[test]
fn missing_soil_data_propagates_to_classes() {
    let scenario = Scenario {
        soil_hole: true,
        ..Scenario::default()
    };
    let pipeline = Pipeline::new(config(), provider(&scenario)).unwrap();
    let stack = pipeline.build(&full_extent()).unwrap();

    // pixel centre (130, 250) lies in the blank soil cell
    let loss = pipeline
        .executor()
        .materialize(&stack.soil_loss, &full_extent(), 20.0)
        .unwrap()
        .raster;
    assert!(loss.get(7, 6).unwrap().is_nan());
    assert!(loss.get(2, 16).unwrap().is_finite());

    let class = pipeline
        .executor()
        .materialize(&stack.class, &full_extent(), 20.0)
        .unwrap()
        .raster;
    assert_eq!(class.get(7, 6).unwrap(), 0.0);
    assert_eq!(class.get(2, 16).unwrap(), 3.0);

    // no-data pixels are left out of the statistics
    let mut reporter = CollectingReporter::default();
    let results = pipeline.summarize(&stack, &[inner()], &mut reporter).unwrap();
    let s = summary(&results[0]);
    assert!(s.pixel_count < 100);
    assert_relative_eq!(s.stats[&Statistic::Count], s.pixel_count as f64);
}

#[test]
fn pixel_ceiling_degrades_to_coarser_scale() {
    let pipeline = Pipeline::new(
        RunConfig {
            pixel_ceiling: 50,
            ..config()
        },
        provider(&Scenario::default()),
    )
    .unwrap();
    let mut reporter = CollectingReporter::default();
    let outcome = pipeline.run(&[inner()], &mut reporter, None).unwrap();
    let s = summary(&outcome.results[0]);

    match s.precision {
        Precision::Approximate { effective_scale } => assert_relative_eq!(effective_scale, 40.0),
        Precision::Exact => panic!("expected a degraded result"),
    }
    assert!(s.pixel_count > 0);
    assert!(s.stats[&Statistic::Max] <= expected_cropland_loss() * (1.0 + 1e-9));
}

#[test]
fn flat_ground_has_no_soil_loss() {
    let pipeline = Pipeline::new(config(), provider(&Scenario { rise: 0.0, ..Scenario::default() })).unwrap();
    let stack = pipeline.build(&full_extent()).unwrap();

    let ls = pipeline.executor().materialize(&stack.ls, &inner().bbox(), 20.0).unwrap();
    assert!(ls.raster.data().iter().all(|v| *v == 0.0));

    let mut reporter = CollectingReporter::default();
    let results = pipeline.summarize(&stack, &[inner()], &mut reporter).unwrap();
    let s = summary(&results[0]);
    assert_relative_eq!(s.stats[&Statistic::Max], 0.0);
    assert_relative_eq!(s.class_areas_ha[&1], 100.0 * PIXEL_HA, epsilon = 1e-9);
}

#[test]
fn built_up_land_has_zero_cover_and_practice() {
    let pipeline = Pipeline::new(config(), provider(&Scenario::default())).unwrap();
    let stack = pipeline.build(&full_extent()).unwrap();

    // column 10 of the full grid is built-up, column 4 cropland
    let c = pipeline.executor().materialize(&stack.c, &full_extent(), 20.0).unwrap().raster;
    let p = pipeline.executor().materialize(&stack.p, &full_extent(), 20.0).unwrap().raster;
    assert_eq!(c.get(10, 10).unwrap(), 0.0);
    assert_eq!(p.get(10, 10).unwrap(), 0.0);
    assert_relative_eq!(c.get(10, 4).unwrap(), 0.25);
    assert_relative_eq!(p.get(10, 4).unwrap(), 0.90);
}

#[test]
fn disjoint_region_has_no_coverage() {
    let pipeline = Pipeline::new(config(), provider(&Scenario::default())).unwrap();
    let stack = pipeline.build(&full_extent()).unwrap();
    let far = Region::from_extent("far", &Extent::new(10_000.0, 10_000.0, 10_100.0, 10_100.0));

    let mut reporter = CollectingReporter::default();
    let results = pipeline.summarize(&stack, &[far, inner()], &mut reporter).unwrap();
    assert_eq!(results[0], ZonalResult::NoCoverage { region: "far".into() });
    assert!(results[1].is_covered());
}

#[test]
fn region_outside_every_dataset_has_no_coverage() {
    let pipeline = Pipeline::new(config(), provider(&Scenario::default())).unwrap();
    assert_eq!(pipeline.coverage().unwrap(), Some(full_extent()));

    let far = Region::from_extent("far", &Extent::new(10_000.0, 10_000.0, 10_100.0, 10_100.0));
    let mut reporter = CollectingReporter::default();
    let outcome = pipeline.run(&[far], &mut reporter, None).unwrap();
    assert!(outcome.stack.is_none());
    assert_eq!(outcome.results, vec![ZonalResult::NoCoverage { region: "far".into() }]);
    assert_eq!(reporter.results, outcome.results);
}

#[test]
fn batch_mixing_covered_and_disjoint_regions() {
    let boundaries = JsonBoundaryProvider::from_json_str(
        r#"[
            { "name": "offshore", "admin_level": 1,
              "polygons": [[[5000, 5000], [5100, 5000], [5100, 5100], [5000, 5100], [5000, 5000]]] },
            { "name": "inland", "admin_level": 1,
              "polygons": [[[100, 100], [300, 100], [300, 300], [100, 300], [100, 100]]] }
        ]"#,
        0.0,
    )
    .unwrap();
    let pipeline = Pipeline::new(config(), provider(&Scenario::default())).unwrap();
    let mut reporter = CollectingReporter::default();
    let outcome = pipeline
        .run_boundaries(&boundaries, 1, None, &mut reporter, None)
        .unwrap();

    assert!(outcome.stack.is_some());
    assert_eq!(outcome.results[0], ZonalResult::NoCoverage { region: "offshore".into() });
    let inland = summary(&outcome.results[1]);
    assert_eq!(inland.pixel_count, 100);
    assert_relative_eq!(inland.stats[&Statistic::Mean], 0.8 * expected_cropland_loss(), max_relative = 1e-9);
}

#[test]
fn missing_dataset_is_still_unavailable() {
    let mut config = config();
    config.datasets.elevation.dataset = "lidar".into();
    let pipeline = Pipeline::new(config, provider(&Scenario::default())).unwrap();
    let mut reporter = CollectingReporter::default();
    let err = pipeline.run(&[inner()], &mut reporter, None).unwrap_err();
    assert!(matches!(err, erosgis_core::Error::DataUnavailable { .. }));
}

#[test]
fn run_from_boundaries_with_reports_and_export() {
    let dir = tempfile::tempdir().unwrap();
    let boundaries = JsonBoundaryProvider::from_json_str(
        r#"[
            { "name": "west", "admin_level": 1,
              "polygons": [[[60, 60], [200, 60], [200, 340], [60, 340], [60, 60]]] },
            { "name": "east", "admin_level": 1,
              "polygons": [[[200, 60], [340, 60], [340, 340], [200, 340], [200, 60]]] }
        ]"#,
        0.0,
    )
    .unwrap();
    let regions = boundaries.regions(1, None).unwrap();
    let extent = Pipeline::study_extent(&regions).unwrap();

    let pipeline = Pipeline::new(config(), provider(&Scenario::default())).unwrap();
    let report_path = dir.path().join("regions.jsonl");
    let mut reporter = JsonLinesReporter::create(&report_path).unwrap();
    let mut exporter = GeoTiffExporter::new(dir.path().join("bands"), *pipeline.executor(), extent);
    let outcome = pipeline
        .run_boundaries(&boundaries, 1, None, &mut reporter, Some(&mut exporter))
        .unwrap();

    assert_eq!(outcome.results.len(), 2);
    assert!(outcome.results.iter().all(ZonalResult::is_covered));
    let lines = std::fs::read_to_string(&report_path).unwrap();
    assert_eq!(lines.lines().count(), 2);

    let names: Vec<&str> = outcome.exported.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["soil_loss", "class", "R", "K", "LS", "C", "P"]);
    assert!(outcome.exported.iter().all(|b| b.path.exists()));

    // the built-up strip lies in the east region
    let west = summary(&outcome.results[0]);
    let east = summary(&outcome.results[1]);
    assert!(west.stats[&Statistic::Min] > 0.0);
    assert_relative_eq!(east.stats[&Statistic::Min], 0.0);
}
