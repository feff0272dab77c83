//! Command-line interface for the cone detection pipeline.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::{ConfidenceThreshold, NeighborStrategy};
use crate::core::{loaders, writers};
use crate::pipeline::{Pipeline, PipelineOutput};
use crate::visualization::{self, Projection};
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "cone-detect")]
#[command(about = "Detect cones in LiDAR point clouds", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the detection pipeline on a LiDAR CSV file
    Detect {
        /// Input CSV with x, y, z and confidence columns
        input: PathBuf,
        /// Confidence threshold: strict, moderate, allowing (or 1/2/3) or a value in [0, 1]
        #[arg(long)]
        confidence: Option<String>,
        /// Ground height; points at or below it are removed
        #[arg(long)]
        ground_z: Option<f32>,
        /// DBSCAN neighbourhood radius
        #[arg(long)]
        eps: Option<f32>,
        /// DBSCAN minimum neighbourhood size
        #[arg(long)]
        min_points: Option<usize>,
        /// Maximum x extent of a cone
        #[arg(long)]
        x_max: Option<f32>,
        /// Maximum y extent of a cone
        #[arg(long)]
        y_max: Option<f32>,
        /// Minimum z extent of a cone
        #[arg(long)]
        z_min: Option<f32>,
        /// Use exhaustive neighbourhood search instead of the KD-tree
        #[arg(long)]
        brute_force: bool,
        /// Run neighbourhood queries on a single thread
        #[arg(long)]
        serial: bool,
        /// Write the classified points to this CSV
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write the run report to this YAML file
        #[arg(long)]
        report: Option<PathBuf>,
        /// Render the classified cloud to this PNG
        #[arg(long)]
        plot: Option<PathBuf>,
        /// Plot x against z instead of x against y
        #[arg(long)]
        side_view: bool,
        /// Title for the plot (defaults to the input file name)
        #[arg(long)]
        title: Option<String>,
        /// Maximum number of points to plot (subsamples if exceeded)
        #[arg(long, default_value_t = 1_000_000)]
        max_points: usize,
    },

    /// Write the default configuration as YAML
    InitConfig {
        /// Destination file
        path: PathBuf,
    },
}

/// Command-line overrides applied on top of the loaded config.
struct Overrides {
    confidence: Option<String>,
    ground_z: Option<f32>,
    eps: Option<f32>,
    min_points: Option<usize>,
    x_max: Option<f32>,
    y_max: Option<f32>,
    z_min: Option<f32>,
    brute_force: bool,
    serial: bool,
}

impl Overrides {
    fn apply(self, mut config: PipelineConfig) -> PipelineConfig {
        if let Some(c) = self.confidence {
            config.filtering.confidence = ConfidenceThreshold::parse_lenient(&c);
        }
        if let Some(v) = self.ground_z {
            config.filtering.ground_z = v;
        }
        if let Some(v) = self.eps {
            config.clustering.eps = v;
        }
        if let Some(v) = self.min_points {
            config.clustering.min_points = v;
        }
        if let Some(v) = self.x_max {
            config.classification.x_max = v;
        }
        if let Some(v) = self.y_max {
            config.classification.y_max = v;
        }
        if let Some(v) = self.z_min {
            config.classification.z_min = v;
        }
        if self.brute_force {
            config.clustering.strategy = NeighborStrategy::BruteForce;
        }
        if self.serial {
            config.clustering.parallel = false;
        }
        config
    }
}

/// Output destinations for a detect run.
struct Outputs {
    csv: Option<PathBuf>,
    report: Option<PathBuf>,
    plot: Option<PathBuf>,
    projection: Projection,
    title: String,
    max_points: usize,
}

/// Load the YAML config at `path`, or the defaults when no path is given.
fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    let config = PipelineConfig::from_yaml(path)
        .map_err(|e| anyhow!("{}", e))
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    info!("Loaded config from: {}", path.display());
    Ok(config)
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config; a given path must load, defaults only without one
    let config = match load_config(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    };

    // Dispatch to subcommands
    match cli.command {
        Commands::Detect {
            input,
            confidence,
            ground_z,
            eps,
            min_points,
            x_max,
            y_max,
            z_min,
            brute_force,
            serial,
            output,
            report,
            plot,
            side_view,
            title,
            max_points,
        } => {
            let overrides = Overrides {
                confidence,
                ground_z,
                eps,
                min_points,
                x_max,
                y_max,
                z_min,
                brute_force,
                serial,
            };
            let outputs = Outputs {
                csv: output,
                report,
                plot,
                projection: if side_view {
                    Projection::Side
                } else {
                    Projection::TopDown
                },
                title: title.unwrap_or_else(|| {
                    input
                        .file_stem()
                        .map(|s| s.to_string_lossy().to_string())
                        .unwrap_or_else(|| "Point Cloud".to_string())
                }),
                max_points,
            };
            cmd_detect(&input, overrides.apply(config), &outputs);
        }
        Commands::InitConfig { path } => {
            cmd_init_config(&path, &config);
        }
    }
}

fn cmd_detect(input: &Path, config: PipelineConfig, outputs: &Outputs) {
    let start = Instant::now();

    println!("Running cone detection...");
    println!("Input: {}", input.display());
    println!("Parameters:");
    println!("  confidence: {:?}", config.filtering.confidence);
    println!("  ground_z: {}", config.filtering.ground_z);
    println!("  eps: {}", config.clustering.eps);
    println!("  min_points: {}", config.clustering.min_points);
    println!("  strategy: {:?}", config.clustering.strategy);

    let spinner = create_spinner("Loading and clustering point cloud...");

    match detect(input, config, outputs) {
        Ok(output) => {
            spinner.finish_and_clear();

            let report = &output.report;
            let mut items = vec![
                ("Input file", input.display().to_string()),
                ("Input records", report.input_records.to_string()),
                ("Dropped incomplete", report.dropped_incomplete.to_string()),
                ("Threshold", report.confidence_threshold.to_string()),
                ("After confidence", report.after_confidence.to_string()),
                ("After ground", report.after_ground.to_string()),
                ("Clusters formed", report.clusters_formed.to_string()),
                ("Noise points", report.noise_points.to_string()),
                ("Cones identified", report.cones_identified.to_string()),
                ("Cone points", report.cone_points.to_string()),
                ("Warnings", report.warnings.len().to_string()),
            ];
            if let Some(path) = &outputs.csv {
                items.push(("Output CSV", path.display().to_string()));
            }
            if let Some(path) = &outputs.report {
                items.push(("Report", path.display().to_string()));
            }
            if let Some(path) = &outputs.plot {
                items.push(("Plot", path.display().to_string()));
            }
            items.push(("Duration", format!("{:.2?}", start.elapsed())));

            print_summary("Cone Detection Complete", &items);
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Detection failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn detect(input: &Path, config: PipelineConfig, outputs: &Outputs) -> Result<PipelineOutput> {
    let pipeline = Pipeline::new(config).context("invalid pipeline configuration")?;

    let records = loaders::load_lidar_csv(input)
        .with_context(|| format!("failed to load {}", input.display()))?;
    info!("Loaded {} records from {}", records.len(), input.display());

    let output = pipeline.run(&records);

    if let Some(path) = &outputs.csv {
        writers::write_classified_csv(path, &output)?;
        info!("Wrote classified points to {}", path.display());
    }
    if let Some(path) = &outputs.report {
        writers::write_report_yaml(path, &output.report)?;
        info!("Wrote report to {}", path.display());
    }
    if let Some(path) = &outputs.plot {
        if output.cloud.is_empty() {
            warn!("No points survived filtering, skipping plot");
        } else {
            visualization::plot_classified_cloud(
                path,
                &output,
                outputs.projection,
                &outputs.title,
                outputs.max_points,
            )
            .with_context(|| format!("failed to render {}", path.display()))?;
            info!("Wrote plot to {}", path.display());
        }
    }

    Ok(output)
}

fn cmd_init_config(path: &Path, config: &PipelineConfig) {
    match config.to_yaml(path) {
        Ok(()) => {
            print_summary(
                "Config Written",
                &[
                    ("Path", path.display().to_string()),
                    ("ground_z", config.filtering.ground_z.to_string()),
                    ("eps", config.clustering.eps.to_string()),
                    ("min_points", config.clustering.min_points.to_string()),
                ],
            );
        }
        Err(e) => {
            error!("Failed to write config to {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}
