//! biobar: analyse time-lapse microscopy videos from the command line.
//!
//! `analyze` runs the selected engines over one or more frame-sequence
//! videos and writes a summary table, settings, diagnostics and
//! optionally barcodes and per-frame intermediates. `aggregate` merges
//! summary tables from earlier runs.
//!
//! # Usage
//!
//! ```text
//! biobar analyze --binarization --optical-flow --output out/ videos/well_a videos/well_b
//! biobar aggregate --output all.csv --sort "Mean Speed" --barcode out/*summary.csv
//! ```
//!
//! Log verbosity follows `RUST_LOG`, falling back to `warn` (or `debug`
//! with `--verbose`).

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod output;
mod reader;

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use biobar_export::{aggregate, write_results};
use biobar_pipeline::config::{
    BinarizationConfig, ChannelSelection, IntensityConfig, ModuleSelection, OpticalFlowConfig,
    OutputConfig, QualityConfig,
};
use biobar_pipeline::{AnalysisConfig, Clock, Grouping, NullRecorder, run_batch};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::output::{IntermediateFiles, OutputPaths, write_barcodes, write_or_warn};
use crate::reader::read_video;

/// Quantify structural and dynamic change in time-lapse microscopy.
#[derive(Parser)]
#[command(name = "biobar", version)]
struct Cli {
    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyse frame-sequence videos.
    Analyze(AnalyzeArgs),
    /// Merge summary tables into one.
    Aggregate(AggregateArgs),
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Video directories, each holding PNG or TIFF frames.
    #[arg(required = true)]
    videos: Vec<PathBuf>,

    /// Directory receiving all output files.
    #[arg(long, short, default_value = ".")]
    output: PathBuf,

    /// Run name prefixed to output files (default: output directory name).
    #[arg(long)]
    name: Option<String>,

    /// Full analysis config as a JSON file.
    ///
    /// When provided, all other analysis flags are ignored.
    #[arg(long, conflicts_with = "config_json")]
    config: Option<PathBuf>,

    /// Full analysis config as a JSON string.
    ///
    /// When provided, all other analysis flags are ignored. The JSON
    /// must be a valid `AnalysisConfig` serialization; missing fields
    /// take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Analyse every channel.
    #[arg(long)]
    all_channels: bool,

    /// Channel to analyse when not analysing all; negative counts from
    /// the end.
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    channel: i64,

    /// Analyse files whose first frame is dim.
    #[arg(long)]
    accept_dim_images: bool,

    /// Analyse dim channels (flagged in the summary).
    #[arg(long)]
    accept_dim_channels: bool,

    /// Run the binarization engine.
    #[arg(long)]
    binarization: bool,

    /// Run the optical flow engine.
    #[arg(long)]
    optical_flow: bool,

    /// Run the intensity distribution engine.
    #[arg(long)]
    intensity_distribution: bool,

    /// Run every engine.
    #[arg(long)]
    all_modules: bool,

    /// Binarization threshold offset from the frame mean, as a fraction.
    #[arg(long, default_value_t = BinarizationConfig::DEFAULT_THRESHOLD_OFFSET, allow_hyphen_values = true)]
    threshold_offset: f64,

    /// Frames between binarization samples.
    #[arg(long, default_value_t = BinarizationConfig::DEFAULT_FRAME_STEP)]
    binarization_frame_step: usize,

    /// Start of the late-phase window, as a fraction of the video.
    #[arg(long, default_value_t = BinarizationConfig::DEFAULT_FRAME_START_PERCENT)]
    frame_start_percent: f64,

    /// End of the late-phase window, as a fraction of the video.
    #[arg(long, default_value_t = BinarizationConfig::DEFAULT_FRAME_STOP_PERCENT)]
    frame_stop_percent: f64,

    /// Fraction of sampled frames forming the binarization baseline.
    #[arg(long, default_value_t = BinarizationConfig::DEFAULT_FRAME_INITIAL_PERCENT)]
    frame_initial_percent: f64,

    /// Frames between the two frames of a flow pair.
    #[arg(long, default_value_t = OpticalFlowConfig::DEFAULT_FRAME_STEP)]
    flow_frame_step: usize,

    /// Flow estimator window size in pixels.
    #[arg(long, default_value_t = OpticalFlowConfig::DEFAULT_WINDOW_SIZE)]
    window_size: usize,

    /// Block pooling factor applied to flow fields.
    #[arg(long, default_value_t = OpticalFlowConfig::DEFAULT_DOWNSAMPLE_FACTOR)]
    downsample_factor: usize,

    /// Spatial calibration in nanometres per pixel.
    #[arg(long, default_value_t = OpticalFlowConfig::DEFAULT_NM_PIXEL_RATIO)]
    nm_pixel_ratio: f64,

    /// Seconds between frames.
    #[arg(long, default_value_t = OpticalFlowConfig::DEFAULT_FRAME_INTERVAL_S)]
    frame_interval: f64,

    /// First frame of the early intensity window.
    #[arg(long, default_value_t = IntensityConfig::DEFAULT_FIRST_FRAME)]
    first_frame: usize,

    /// End of the late intensity window (0: end of video).
    #[arg(long, default_value_t = IntensityConfig::DEFAULT_LAST_FRAME)]
    last_frame: usize,

    /// Intensity window length, as a fraction of the video.
    #[arg(long, default_value_t = IntensityConfig::DEFAULT_FRAMES_EVALUATION_PERCENT)]
    frames_evaluation_percent: f64,

    /// Write per-frame intermediate CSVs.
    #[arg(long)]
    save_intermediates: bool,

    /// Render barcode PNGs of the batch.
    #[arg(long)]
    barcode: bool,

    /// One barcode per channel instead of a combined one.
    #[arg(long)]
    separate_channels: bool,

    /// Print diagnostics as JSON instead of a human-readable report.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct AggregateArgs {
    /// Summary CSVs to merge.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Combined summary CSV to write.
    #[arg(long, short)]
    output: PathBuf,

    /// Sort rows ascending by this column header.
    #[arg(long)]
    sort: Option<String>,

    /// Render a barcode of the combined table.
    #[arg(long)]
    barcode: bool,

    /// One barcode per channel instead of a combined one.
    #[arg(long)]
    separate_channels: bool,
}

/// Build an [`AnalysisConfig`] from CLI arguments.
///
/// A config given by `--config` or `--config-json` is parsed directly
/// and all individual analysis flags are ignored. Otherwise the config
/// is assembled from the flags.
fn config_from_args(args: &AnalyzeArgs) -> Result<AnalysisConfig, String> {
    if let Some(ref path) = args.config {
        let json = fs::read_to_string(path)
            .map_err(|e| format!("Error reading {}: {e}", path.display()))?;
        return serde_json::from_str(&json)
            .map_err(|e| format!("Error parsing {}: {e}", path.display()));
    }
    if let Some(ref json) = args.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    let modules = if args.all_modules {
        ModuleSelection::ALL
    } else {
        ModuleSelection {
            binarization: args.binarization,
            optical_flow: args.optical_flow,
            intensity_distribution: args.intensity_distribution,
        }
    };
    Ok(AnalysisConfig {
        channels: ChannelSelection {
            parse_all_channels: args.all_channels,
            selected_channel: args.channel,
        },
        quality: QualityConfig {
            accept_dim_images: args.accept_dim_images,
            accept_dim_channels: args.accept_dim_channels,
        },
        modules,
        binarization: BinarizationConfig {
            threshold_offset: args.threshold_offset,
            frame_step: args.binarization_frame_step,
            frame_start_percent: args.frame_start_percent,
            frame_stop_percent: args.frame_stop_percent,
            frame_initial_percent: args.frame_initial_percent,
        },
        optical_flow: OpticalFlowConfig {
            frame_step: args.flow_frame_step,
            window_size: args.window_size,
            downsample_factor: args.downsample_factor,
            nm_pixel_ratio: args.nm_pixel_ratio,
            frame_interval_s: args.frame_interval,
            ..OpticalFlowConfig::default()
        },
        intensity: IntensityConfig {
            first_frame: args.first_frame,
            last_frame: args.last_frame,
            frames_evaluation_percent: args.frames_evaluation_percent,
        },
        output: OutputConfig {
            save_intermediates: args.save_intermediates,
            generate_dataset_barcode: args.barcode,
            separate_channels: args.separate_channels,
        },
        ..AnalysisConfig::default()
    })
}

const fn grouping(separate_channels: bool) -> Grouping {
    if separate_channels {
        Grouping::PerChannel
    } else {
        Grouping::Combined
    }
}

/// Run name: `--name`, else the output directory's name.
fn run_name(args: &AnalyzeArgs) -> String {
    args.name.clone().unwrap_or_else(|| {
        fs::canonicalize(&args.output)
            .ok()
            .and_then(|dir| dir.file_name().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "biobar".to_string())
    })
}

fn analyze(args: &AnalyzeArgs) -> Result<(), String> {
    let config = config_from_args(args)?;
    if config.modules.enabled().next().is_none() {
        warn!("no analysis module enabled; only quality gates will run");
    }
    fs::create_dir_all(&args.output)
        .map_err(|e| format!("Error creating {}: {e}", args.output.display()))?;
    let paths = OutputPaths::new(&args.output, &run_name(args));
    let files: Vec<String> = args.videos.iter().map(|p| p.display().to_string()).collect();

    let batch = if config.output.save_intermediates {
        let mut recorders = IntermediateFiles::new(args.output.clone(), config.modules);
        run_batch(&files, &read_video, &config, &mut recorders, &StdClock)
    } else {
        run_batch(&files, &read_video, &config, &mut NullRecorder, &StdClock)
    }
    .map_err(|e| format!("Pipeline error: {e}"))?;

    let results = batch.results();
    let summary = File::create(&paths.summary)
        .map_err(|e| format!("Error creating {}: {e}", paths.summary.display()))?;
    write_results(BufWriter::new(summary), &results)
        .map_err(|e| format!("Error writing {}: {e}", paths.summary.display()))?;
    info!(path = %paths.summary.display(), rows = results.len(), "summary written");

    match serde_json::to_string_pretty(&config) {
        Ok(json) => write_or_warn(&paths.settings, &json),
        Err(e) => warn!(error = %e, "could not serialize settings"),
    }
    let diagnostics = serde_json::to_string_pretty(&batch.diagnostics)
        .map_err(|e| format!("Error serializing diagnostics: {e}"))?;
    write_or_warn(&paths.diagnostics, &diagnostics);
    if !batch.failures.is_empty() {
        warn!(count = batch.failures.len(), "some files or channels failed");
        fs::write(&paths.failures, format!("{}\n", batch.failures))
            .map_err(|e| format!("Error writing {}: {e}", paths.failures.display()))?;
        info!(path = %paths.failures.display(), "failure log written");
    }

    if config.output.generate_dataset_barcode {
        write_barcodes(
            &results,
            grouping(config.output.separate_channels),
            &paths.barcode_stem,
        )?;
    }

    if args.json {
        println!("{diagnostics}");
    } else {
        println!("{}", batch.diagnostics.report());
    }
    Ok(())
}

fn aggregate_summaries(args: &AggregateArgs) -> Result<(), String> {
    let mut sources = Vec::with_capacity(args.inputs.len());
    for input in &args.inputs {
        match File::open(input) {
            Ok(file) => sources.push((input.display().to_string(), BufReader::new(file))),
            Err(e) => warn!(path = %input.display(), error = %e, "skipping unreadable summary"),
        }
    }
    let opened = sources.len();
    let merged = aggregate(sources, args.sort.as_deref());
    if merged.results.is_empty() {
        return Err("No rows to aggregate".to_string());
    }

    let file = File::create(&args.output)
        .map_err(|e| format!("Error creating {}: {e}", args.output.display()))?;
    write_results(BufWriter::new(file), &merged.results)
        .map_err(|e| format!("Error writing {}: {e}", args.output.display()))?;
    eprintln!(
        "Aggregated {} rows from {} files into {} ({} skipped)",
        merged.results.len(),
        opened - merged.skipped.len(),
        args.output.display(),
        args.inputs.len() + merged.skipped.len() - opened,
    );

    if args.barcode {
        let written = write_barcodes(
            &merged.results,
            grouping(args.separate_channels),
            &barcode_stem(&args.output),
        )?;
        for path in written {
            eprintln!("Barcode written to {}", path.display());
        }
    }
    Ok(())
}

/// `dir/all.csv` becomes `dir/all Barcode`.
fn barcode_stem(csv: &Path) -> PathBuf {
    let stem = csv
        .file_stem()
        .map_or_else(|| "summary".into(), |s| s.to_string_lossy());
    csv.with_file_name(format!("{stem} Barcode"))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<(), String> {
    match &cli.command {
        Command::Analyze(args) => analyze(args),
        Command::Aggregate(args) => aggregate_summaries(args),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}
