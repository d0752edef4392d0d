//! HeatRisk CLI - Urban heat risk analysis from satellite bands

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use heatrisk_algorithms::alignment::{align, AlignParams, ReferenceRule, ResamplingMethod};
use heatrisk_algorithms::classification::classify_hotspots;
use heatrisk_algorithms::imagery::IndexEngine;
use heatrisk_algorithms::pipeline::{join_demographics, run, write_zones, PipelineConfig};
use heatrisk_core::io::{load_band_directory, read_geotiff, write_geotiff, GeoTiffOptions};
use heatrisk_core::raster::Raster;
use heatrisk_core::vector::{read_boundary, CensusQuery, DemographicSource, GeoJsonDemographics};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "heatrisk")]
#[command(author, version, about = "Urban heat risk analysis from satellite bands", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Align a directory of band rasters onto one common grid
    Align {
        /// Directory of single-band GeoTIFFs
        dir: PathBuf,
        /// Output directory (one file per band)
        out_dir: PathBuf,
        /// Resampling method: bilinear, average, nearest
        #[arg(short, long, default_value = "bilinear")]
        resampling: String,
        /// Input position of the reference grid (default: first file)
        #[arg(long)]
        reference: Option<usize>,
    },
    /// Derive NDVI, NDBI, radiance, brightness temperature, LST and UHRI
    Indices {
        /// Directory of single-band GeoTIFFs
        dir: PathBuf,
        /// Output directory (one file per index)
        out_dir: PathBuf,
        /// JSON run configuration (band mapping, calibration, resampling)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Classify cells at or above a percentile as hotspots
    Hotspots {
        /// Input raster (e.g. UHRI)
        input: PathBuf,
        /// Output file (1 = hotspot, 0 = not, 255 = nodata)
        output: PathBuf,
        /// Percentile, exclusive of 0 and 100
        #[arg(short, long, default_value = "90")]
        percentile: f64,
    },
    /// Full run: align, clip, indices, hotspots, correlation and zonal join
    Run {
        /// Directory of single-band GeoTIFFs
        dir: PathBuf,
        /// County boundary (GeoJSON)
        #[arg(short, long)]
        boundary: PathBuf,
        /// Output directory
        out_dir: PathBuf,
        /// JSON run configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Demographic units with attributes (GeoJSON)
        #[arg(long)]
        demographics: Option<PathBuf>,
        /// Census year of the demographic units
        #[arg(long, default_value = "2020", requires = "demographics")]
        year: u16,
        /// State FIPS code
        #[arg(long, requires = "demographics")]
        state: Option<String>,
        /// County FIPS code
        #[arg(long, requires = "demographics")]
        county: Option<String>,
        /// Census API key
        #[arg(long, env = "CENSUS_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
        /// Attribute identifying each demographic unit
        #[arg(long, default_value = "GEOID")]
        id_field: String,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn read_raster(path: &Path) -> Result<Raster<f64>> {
    let pb = spinner("Reading raster...");
    let raster: Raster<f64> = read_geotiff(path, None)
        .with_context(|| format!("Failed to read raster {}", path.display()))?;
    pb.finish_and_clear();
    info!("Input: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

fn read_bands(dir: &Path) -> Result<Vec<(String, Raster<f64>)>> {
    let pb = spinner("Reading bands...");
    let grids = load_band_directory(dir)
        .with_context(|| format!("Failed to load bands from {}", dir.display()))?;
    pb.finish_and_clear();
    info!(
        "Bands: {}",
        grids.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>().join(", ")
    );
    Ok(grids)
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn write_result(raster: &Raster<f64>, path: &Path) -> Result<()> {
    write_geotiff(raster, path, Some(GeoTiffOptions::default()))
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn write_result_u8(raster: &Raster<u8>, path: &Path) -> Result<()> {
    write_geotiff(raster, path, Some(GeoTiffOptions::default()))
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn create_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        // ── Info ─────────────────────────────────────────────────────
        Commands::Info { input } => {
            let raster = read_raster(&input)?;
            let (rows, cols) = raster.shape();
            let bounds = raster.bounds();
            let (res_x, res_y) = raster.resolution();
            let stats = raster.statistics();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Resolution: {} x {}", res_x, res_y);
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            if let Some(crs) = raster.crs() {
                println!("CRS: {}", crs);
            }
            if let Some(nodata) = raster.nodata() {
                println!("NoData: {}", nodata);
            }
            println!("\nStatistics:");
            if let Some(min) = stats.min {
                println!("  Min: {:.4}", min);
            }
            if let Some(max) = stats.max {
                println!("  Max: {:.4}", max);
            }
            if let Some(mean) = stats.mean {
                println!("  Mean: {:.4}", mean);
            }
            println!(
                "  Valid cells: {} ({:.1}%)",
                stats.valid_count,
                100.0 * stats.valid_count as f64 / raster.len() as f64
            );
        }

        // ── Align ────────────────────────────────────────────────────
        Commands::Align {
            dir,
            out_dir,
            resampling,
            reference,
        } => {
            let method: ResamplingMethod = resampling.parse()?;
            let params = AlignParams {
                method,
                reference: reference.map_or(ReferenceRule::FirstInput, ReferenceRule::Input),
            };
            let grids = read_bands(&dir)?;
            let start = Instant::now();
            let stack = align(grids, params).context("Failed to align bands")?;
            let elapsed = start.elapsed();

            create_dir(&out_dir)?;
            let pb = spinner("Writing output...");
            for (name, layer) in stack.iter() {
                write_result(layer, &out_dir.join(format!("{}.tif", name)))?;
            }
            pb.finish_and_clear();
            let (rows, cols) = stack.shape();
            println!("Common grid: {} x {} cells", cols, rows);
            done("Aligned bands", &out_dir, elapsed);
        }

        // ── Indices ──────────────────────────────────────────────────
        Commands::Indices {
            dir,
            out_dir,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            let grids = read_bands(&dir)?;
            let start = Instant::now();
            let stack = align(grids, config.align_params()).context("Failed to align bands")?;
            let indices = IndexEngine::new(config.bands, config.calibration)
                .compute(&stack)
                .context("Failed to compute indices")?;
            let elapsed = start.elapsed();

            create_dir(&out_dir)?;
            let pb = spinner("Writing output...");
            for field in indices.iter() {
                write_result(field.raster(), &out_dir.join(format!("{}.tif", field.kind())))?;
            }
            pb.finish_and_clear();
            done("Indices", &out_dir, elapsed);
        }

        // ── Hotspots ─────────────────────────────────────────────────
        Commands::Hotspots {
            input,
            output,
            percentile,
        } => {
            let raster = read_raster(&input)?;
            let start = Instant::now();
            let map = classify_hotspots(&raster, percentile).context("Failed to classify hotspots")?;
            let elapsed = start.elapsed();
            write_result_u8(&map.grid, &output)?;
            println!(
                "Threshold (p{}): {:.4} over {} cells, {} hotspots",
                map.threshold.percentile,
                map.threshold.value,
                map.threshold.valid_count,
                map.hotspot_count()
            );
            done("Hotspots", &output, elapsed);
        }

        // ── Run ──────────────────────────────────────────────────────
        Commands::Run {
            dir,
            boundary,
            out_dir,
            config,
            demographics,
            year,
            state,
            county,
            api_key,
            id_field,
        } => {
            let config = load_config(config.as_deref())?;
            let boundary = read_boundary(&boundary)
                .with_context(|| format!("Failed to read boundary {}", boundary.display()))?;

            // Demographic query is resolved before any raster work
            let demographics = match demographics {
                Some(path) => {
                    let state = state.context("--state is required with --demographics")?;
                    let county = county.context("--county is required with --demographics")?;
                    let mut query = CensusQuery::new(year, state, county);
                    if let Some(key) = api_key {
                        query = query.with_api_key(key);
                    }
                    Some((GeoJsonDemographics::new(path), query))
                }
                None => None,
            };

            let grids = read_bands(&dir)?;
            let start = Instant::now();
            let pb = spinner("Running pipeline...");
            let output = run(grids, &boundary, &config);
            pb.finish_and_clear();
            let output = output.context("Pipeline failed")?;

            let zones = match &demographics {
                Some((source, query)) => {
                    let units = source.fetch(query).with_context(|| {
                        format!(
                            "Failed to load demographic units for {}-{} ({})",
                            query.state, query.county, query.year
                        )
                    })?;
                    let zones = join_demographics(&output, &boundary, &units, Some(&id_field))
                        .context("Failed to join demographics")?;
                    Some(zones)
                }
                None => None,
            };
            let elapsed = start.elapsed();

            let pb = spinner("Writing output...");
            output
                .write_to(&out_dir)
                .with_context(|| format!("Failed to write outputs to {}", out_dir.display()))?;
            if let Some(zones) = &zones {
                write_zones(&out_dir, zones).context("Failed to write zonal summaries")?;
            }
            pb.finish_and_clear();

            let (rows, cols) = output.stack.shape();
            println!("Grid: {} x {} cells", cols, rows);
            println!(
                "Hotspot threshold (p{}): {:.4}, {} hotspots",
                output.hotspots.threshold.percentile,
                output.hotspots.threshold.value,
                output.hotspots.hotspot_count()
            );
            let names = &output.correlation.names;
            println!("Correlation ({} cells):", output.correlation.sample_count);
            for (name, row) in names.iter().zip(&output.correlation.values) {
                let cells: Vec<String> = row.iter().map(|v| format!("{:>7.3}", v)).collect();
                println!("  {:<5} {}", name, cells.join(" "));
            }
            if let Some(zones) = &zones {
                println!("Demographic units joined: {}", zones.len());
            }
            done("Outputs", &out_dir, elapsed);
        }
    }

    Ok(())
}
