//! ErosGIS CLI - RUSLE soil loss per administrative region

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use erosgis_algebra::{DataProvider, GeoTiffProvider};
use erosgis_algorithms::statistics::Statistic;
use erosgis_parallel::{Precision, ProcessingMode, ZonalResult};
use erosgis_rusle::{
    BoundaryProvider, CollectingReporter, GeoTiffExporter, JsonBoundaryProvider, JsonLinesReporter, Pipeline,
    RasterExporter, RunConfig, StatisticsReporter,
};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "erosgis")]
#[command(author, version, about = "RUSLE soil-loss estimation over administrative regions", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute soil loss and per-region statistics
    Run {
        /// Catalog directory (GeoTIFFs plus catalog.json)
        #[arg(long)]
        catalog: PathBuf,
        /// Boundary file (JSON list of named polygons)
        #[arg(long)]
        boundaries: PathBuf,
        /// Run configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Administrative level of the regions
        #[arg(long, default_value = "1")]
        admin_level: u8,
        /// Only the region with this name
        #[arg(long)]
        filter: Option<String>,
        /// Boundary simplification tolerance in CRS units
        #[arg(long, default_value = "0")]
        tolerance: f64,
        /// Compute scale in CRS units per pixel
        #[arg(long)]
        scale: Option<f64>,
        /// First year of the precipitation window
        #[arg(long)]
        start_year: Option<i32>,
        /// Last year of the precipitation window
        #[arg(long)]
        end_year: Option<i32>,
        /// Write per-region results as JSON lines
        #[arg(long)]
        report: Option<PathBuf>,
        /// Write soil_loss, class, R, K, LS, C and P GeoTIFFs here
        #[arg(long)]
        export_dir: Option<PathBuf>,
        /// Evaluate tiles on the calling thread
        #[arg(long)]
        sequential: bool,
    },
    /// List the datasets a catalog exposes
    Info {
        /// Catalog directory
        #[arg(long)]
        catalog: PathBuf,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn open_catalog(dir: &PathBuf) -> Result<Arc<dyn DataProvider>> {
    let provider = GeoTiffProvider::open(dir)
        .with_context(|| format!("Failed to open catalog {}", dir.display()))?;
    Ok(Arc::new(provider))
}

fn load_config(
    path: Option<&PathBuf>,
    scale: Option<f64>,
    start_year: Option<i32>,
    end_year: Option<i32>,
) -> Result<RunConfig> {
    let mut config = match path {
        Some(p) => RunConfig::from_file(p).with_context(|| format!("Failed to read config {}", p.display()))?,
        None => RunConfig::default(),
    };
    if let Some(s) = scale {
        config.compute_scale = s;
    }
    if let Some(y) = start_year {
        config.start_year = y;
    }
    if let Some(y) = end_year {
        config.end_year = y;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn print_table(results: &[ZonalResult], class_ids: &[u32]) {
    let stats = [
        Statistic::Mean,
        Statistic::Median,
        Statistic::StdDev,
        Statistic::Min,
        Statistic::Max,
    ];
    let mut header = format!("{:<24}", "region");
    for s in stats {
        header.push_str(&format!(" {:>10}", s.name()));
    }
    for id in class_ids {
        header.push_str(&format!(" {:>10}", format!("class{} ha", id)));
    }
    println!("{}", header);

    for result in results {
        let summary = match result {
            ZonalResult::Covered(s) => s,
            ZonalResult::NoCoverage { region } => {
                println!("{:<24} no coverage", region);
                continue;
            }
        };
        let mark = match summary.precision {
            Precision::Exact => "",
            Precision::Approximate { .. } => "~",
        };
        let mut line = format!("{:<24}", summary.region);
        for s in stats {
            let value = summary.stats.get(&s).copied().unwrap_or(f64::NAN);
            line.push_str(&format!(" {:>10}", format!("{}{:.3}", mark, value)));
        }
        for id in class_ids {
            let area = summary.class_areas_ha.get(id).copied().unwrap_or(0.0);
            line.push_str(&format!(" {:>10}", format!("{}{:.2}", mark, area)));
        }
        println!("{}", line);
    }

    let degraded: Vec<String> = results
        .iter()
        .filter_map(ZonalResult::summary)
        .filter_map(|s| match s.precision {
            Precision::Approximate { effective_scale } => Some(format!("{} @ {}", s.region, effective_scale)),
            Precision::Exact => None,
        })
        .collect();
    if !degraded.is_empty() {
        println!("\n~ approximate, computed at a coarser scale: {}", degraded.join(", "));
    }
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Info { catalog } => {
            let provider = open_catalog(&catalog)?;
            println!("Catalog: {}", catalog.display());
            for name in provider.datasets() {
                let info = provider
                    .describe(&name)
                    .with_context(|| format!("Failed to describe {}", name))?;
                println!("\n{}", info.name);
                println!("  CRS: {}", info.crs);
                println!("  Scale: {}", info.scale);
                println!(
                    "  Extent: ({:.3}, {:.3}) - ({:.3}, {:.3})",
                    info.extent.min_x, info.extent.min_y, info.extent.max_x, info.extent.max_y
                );
                if let Some(range) = info.time_range {
                    println!("  Years: {}", range);
                }
                for band in &info.bands {
                    let kind = if band.categorical { "categorical" } else { "continuous" };
                    println!("  Band: {} ({})", band.name, kind);
                }
            }
        }

        Commands::Run {
            catalog,
            boundaries,
            config,
            admin_level,
            filter,
            tolerance,
            scale,
            start_year,
            end_year,
            report,
            export_dir,
            sequential,
        } => {
            let config = load_config(config.as_ref(), scale, start_year, end_year)?;
            let provider = open_catalog(&catalog)?;
            let boundaries = JsonBoundaryProvider::open(&boundaries, tolerance)
                .with_context(|| format!("Failed to read boundaries {}", boundaries.display()))?;
            let regions = boundaries
                .regions(admin_level, filter.as_deref())
                .context("Failed to select regions")?;
            info!(regions = regions.len(), admin_level, "regions loaded");

            let mode = if sequential {
                ProcessingMode::Sequential
            } else {
                ProcessingMode::Parallel
            };
            let class_ids = config.scheme()?.class_ids();
            let pipeline = Pipeline::with_mode(config, provider, mode).context("Failed to set up pipeline")?;

            let mut reporter: Box<dyn StatisticsReporter> = match &report {
                Some(path) => Box::new(
                    JsonLinesReporter::create(path)
                        .with_context(|| format!("Failed to create report {}", path.display()))?,
                ),
                None => Box::new(CollectingReporter::default()),
            };
            let mut exporter = match &export_dir {
                Some(dir) => Some(GeoTiffExporter::new(
                    dir,
                    *pipeline.executor(),
                    Pipeline::study_extent(&regions)?,
                )),
                None => None,
            };

            let pb = spinner("Computing soil loss...");
            let start = Instant::now();
            let outcome = pipeline
                .run(
                    &regions,
                    reporter.as_mut(),
                    exporter.as_mut().map(|e| e as &mut dyn RasterExporter),
                )
                .context("Pipeline run failed")?;
            let elapsed = start.elapsed();
            pb.finish_and_clear();

            print_table(&outcome.results, &class_ids);
            if let Some(path) = &report {
                println!("\nReport saved to: {}", path.display());
            }
            for band in &outcome.exported {
                println!("{} saved to: {}", band.name, band.path.display());
            }
            println!("  Processing time: {:.2?}", elapsed);
        }
    }

    Ok(())
}
